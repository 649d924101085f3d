#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-threaded push-based event streams.
//!
//! A stream delivers zero or more values followed by at most one terminal event to every observer
//! attached to it. Two kinds of streams are provided:
//!
//! - [`Stream<V, E>`] - a hot stream whose producer runs once, as soon as the stream is created.
//!   Observers see the events emitted after they were attached.
//! - [`DeferredStream<V, E>`] - a cold stream whose producer runs on every
//!   [`start()`][DeferredStream::start] and can be stopped and restarted.
//!
//! Both can be transformed with `map`, `map_error`, `filter`, `flat_map`, `reduce` and
//! `partition`. Every derived stream is fed by a single observer attached to its source, so a
//! source's side effects happen once no matter how many observers the derived stream has.
//!
//! Attaching an observer returns a [`Disposable`] that detaches it again. Producers return a
//! disposable of their own, which is disposed once the stream terminates or the deferred run
//! ends.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use event_streams::{Event, Stream};
//!
//! let (readings, sensor) = Stream::<i32, String>::pipe();
//! let (valid, invalid) = readings.partition(|reading| *reading >= 0);
//! let total = valid.reduce(0, |sum, reading| sum + reading);
//!
//! let totals = Rc::new(RefCell::new(Vec::new()));
//! total.observe({
//!     let totals = Rc::clone(&totals);
//!     move |event| totals.borrow_mut().push(event)
//! });
//!
//! let rejected = Rc::new(RefCell::new(0));
//! invalid.observe_next({
//!     let rejected = Rc::clone(&rejected);
//!     move |_| *rejected.borrow_mut() += 1
//! });
//!
//! for reading in [4, -1, 6] {
//!     sensor.send_next(reading);
//! }
//! sensor.send_completed();
//!
//! assert_eq!(
//!     *totals.borrow(),
//!     vec![Event::Next(4), Event::Next(10), Event::Completed]
//! );
//! assert_eq!(*rejected.borrow(), 1);
//! ```
//!
//! # Reentrancy
//!
//! Observers may attach or detach observers (including themselves), send further events into a
//! stream or stop a deferred stream from within their callbacks. An observer detached while an
//! event is being delivered does not receive that event if it has not received it yet, and an
//! observer attached during delivery only receives later events.
//!
//! Events sent from within a callback, including the events of a deferred run started from a
//! terminal callback, are queued per stream and delivered once the current event has reached
//! every observer. Every observer of a stream therefore sees the same sequence of events. When a
//! callback terminates a stream or stops a run while a value is being delivered, the remaining
//! observers still receive that value before the terminal event.
//!
//! # Threading
//!
//! All types in this crate are single-threaded (`!Send` and `!Sync`). Events must be emitted
//! from the thread that owns the stream.
//!
//! # Futures
//!
//! [`Stream::from_future()`] turns a future into a stream driven by a future the caller polls and
//! [`Stream::collect()`] turns a stream into a future of its values. The streams themselves never
//! poll or schedule anything.
//!
//! # Logging
//!
//! Stream termination, deferred run lifecycle and dropped events are reported via `tracing` at
//! `debug` and `trace` levels.

mod bag;
mod deferred;
mod delivery;
mod disposable;
mod error;
mod event;
mod interop;
mod observer;
mod operators;
mod producers;
mod stream;

pub use bag::*;
pub use deferred::*;
pub use disposable::*;
pub use error::*;
pub use event::*;
pub use observer::Observer;
pub use stream::*;
