use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::delivery::DeliveryQueue;
use crate::observer::Sink;
use crate::{
    ActionDisposable, Bag, BoxedDisposable, Disposable, Event, Observer, SerialDisposable,
    producers,
};

/// A hot push stream of `Next` values of type `V`, terminated by `Completed`, `Failed(E)` or
/// `Interrupted`.
///
/// The producer passed to [`Stream::new()`] runs synchronously inside the constructor and emits
/// events into an observer that fans each event out to every observer attached at that moment,
/// in the order the producer emitted them. Observers attached later only see later events.
///
/// A stream terminates at most once. On the first terminal event, every attached observer
/// receives it, all observers are detached and the disposable returned by the producer is
/// disposed. Events sent after that are ignored. Observers attached after termination
/// immediately receive `Interrupted` and nothing else.
///
/// An observer callback may send further events into the stream. These are queued and delivered
/// once the current event has reached every observer, so all observers see the same sequence.
///
/// `Stream` is a cheap handle; clones refer to the same stream. While the producer holds on to
/// its observer, the stream stays alive even if every handle is dropped, so events keep reaching
/// attached observers until the producer terminates the stream.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use event_streams::Stream;
///
/// let (stream, input) = Stream::<i32, String>::pipe();
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// stream.observe_next({
///     let seen = Rc::clone(&seen);
///     move |value| seen.borrow_mut().push(value)
/// });
///
/// input.send_next(1);
/// input.send_next(2);
/// input.send_completed();
/// input.send_next(3); // Ignored, the stream has terminated.
///
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// assert!(stream.is_terminated());
/// ```
pub struct Stream<V, E> {
    core: Rc<StreamCore<V, E>>,
}

struct StreamCore<V, E> {
    observers: RefCell<Bag<Observer<V, E>>>,

    terminated: Cell<bool>,

    pending: DeliveryQueue<Event<V, E>>,

    /// Whatever the producer allocated. Disposed on the first terminal event; if the producer
    /// returns its disposable only after that, it is disposed on assignment.
    producer_resources: SerialDisposable,
}

impl<V, E> StreamCore<V, E>
where
    V: Clone,
    E: Clone,
{
    /// Accepts an event from the producer. Events sent while another event is being delivered
    /// are delivered after it, so every observer sees the same sequence.
    fn deliver(&self, event: Event<V, E>) {
        if self.terminated.get() {
            trace!(
                kind = event.kind_name(),
                "dropped event sent after stream terminated"
            );
            return;
        }

        if event.is_terminal() {
            // Set on acceptance, so that observers attached from within a callback are
            // interrupted instead of being left waiting.
            self.terminated.set(true);

            trace!(
                kind = event.kind_name(),
                observers = self.observers.borrow().len(),
                "stream terminated"
            );
        }

        self.pending.push(event, |event| self.dispatch(&event));
    }

    fn dispatch(&self, event: &Event<V, E>) {
        Observer::broadcast(&self.observers, event);

        if event.is_terminal() {
            let detached = mem::take(&mut *self.observers.borrow_mut());
            drop(detached);

            self.producer_resources.dispose();
        }
    }
}

/// The observer a producer emits into. Holds the only strong reference the producer side has to
/// the stream, released on the first terminal event so that the stream and any producer
/// resources capturing this observer do not keep each other alive afterwards.
struct FanOut<V, E> {
    core: RefCell<Option<Rc<StreamCore<V, E>>>>,
}

impl<V, E> Sink<V, E> for FanOut<V, E>
where
    V: Clone,
    E: Clone,
{
    fn receive(&self, event: Event<V, E>) {
        let core = if event.is_terminal() {
            self.core.borrow_mut().take()
        } else {
            self.core.borrow().clone()
        };

        match core {
            Some(core) => core.deliver(event),
            None => trace!(
                kind = event.kind_name(),
                "dropped event sent after stream terminated"
            ),
        }
    }

    fn is_closed(&self) -> bool {
        self.core.borrow().is_none()
    }
}

impl<V, E> Stream<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a stream and immediately runs `producer` with the observer that feeds it.
    ///
    /// The producer may emit events synchronously, keep the observer to emit more later, or
    /// both. Whatever it returns is disposed when the stream terminates.
    pub fn new(producer: impl FnOnce(Observer<V, E>) -> Option<BoxedDisposable>) -> Self {
        let (stream, input) = Self::pipe();

        let resources = producer(input);
        stream.core.producer_resources.set(resources);

        stream
    }

    /// Creates a stream together with the observer that feeds it, for driving the stream by hand.
    ///
    /// The stream terminates when a terminal event is sent into the returned observer.
    #[must_use]
    pub fn pipe() -> (Self, Observer<V, E>) {
        let core = Rc::new(StreamCore {
            observers: RefCell::new(Bag::new()),
            terminated: Cell::new(false),
            pending: DeliveryQueue::new(),
            producer_resources: SerialDisposable::new(),
        });

        let input = Observer::from_sink(Rc::new(FanOut {
            core: RefCell::new(Some(Rc::clone(&core))),
        }));

        (Self { core }, input)
    }

    /// A stream that emits `value` and completes.
    ///
    /// As with every hot stream, the events are emitted during construction, before any observer
    /// can be attached, so observers attached afterwards only receive `Interrupted`. See
    /// [`DeferredStream::value()`][crate::DeferredStream::value] for a stream that emits on
    /// demand.
    #[must_use]
    pub fn value(value: V) -> Self {
        Self::new(producers::value(value))
    }

    /// A stream that fails with `error`.
    #[must_use]
    pub fn error(error: E) -> Self {
        Self::new(producers::error(error))
    }

    /// A stream that emits every item of `values` and completes, stopping early if the stream
    /// terminates in the meantime.
    #[must_use]
    pub fn values(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(|observer| {
            producers::emit_all(&observer, values);
            None
        })
    }

    /// A stream that completes without emitting anything.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(producers::empty())
    }

    /// A stream that never emits anything and never terminates.
    #[must_use]
    pub fn never() -> Self {
        Self::new(producers::never())
    }

    /// Attaches an observer, returning a disposable that detaches it again.
    ///
    /// Disposing the returned disposable affects only this one attachment, never the stream or
    /// any other observer. If the stream has already terminated, the observer immediately
    /// receives `Interrupted` and the returned disposable is already disposed.
    pub fn add(&self, observer: Observer<V, E>) -> ActionDisposable {
        if self.core.terminated.get() {
            observer.send_interrupted();
            return ActionDisposable::disposed();
        }

        let token = self.core.observers.borrow_mut().insert(observer);
        let core = Rc::downgrade(&self.core);

        ActionDisposable::new(move || {
            if let Some(core) = core.upgrade() {
                let detached = core.observers.borrow_mut().remove(token);
                drop(detached);
            }
        })
    }

    /// Attaches a callback for every event.
    pub fn observe(&self, action: impl Fn(Event<V, E>) + 'static) -> ActionDisposable {
        self.add(Observer::new(action))
    }

    /// Attaches a callback for `Next` values only.
    pub fn observe_next(&self, action: impl Fn(V) + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if let Event::Next(value) = event {
                action(value);
            }
        })
    }

    /// Attaches a callback for `Failed` only.
    pub fn observe_failed(&self, action: impl Fn(E) + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if let Event::Failed(error) = event {
                action(error);
            }
        })
    }

    /// Attaches a callback for `Completed` only.
    pub fn observe_completed(&self, action: impl Fn() + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if matches!(event, Event::Completed) {
                action();
            }
        })
    }

    /// Attaches a callback for `Interrupted` only.
    pub fn observe_interrupted(&self, action: impl Fn() + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if matches!(event, Event::Interrupted) {
                action();
            }
        })
    }
}

impl<V, E> Stream<V, E> {
    /// Whether the stream has delivered its terminal event.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.core.terminated.get()
    }

    /// The number of observers currently attached.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.core.observers.borrow().len()
    }
}

impl<V, E> Clone for Stream<V, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<V, E> fmt::Debug for Stream<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("terminated", &self.is_terminated())
            .field("observer_count", &self.observer_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(Stream<u32, ()>: Send, Sync);

    type Events = Rc<RefCell<Vec<Event<i32, &'static str>>>>;

    fn record(stream: &Stream<i32, &'static str>) -> (Events, ActionDisposable) {
        let events: Events = Rc::new(RefCell::new(Vec::new()));
        let detach = stream.observe({
            let events = Rc::clone(&events);
            move |event| events.borrow_mut().push(event)
        });

        (events, detach)
    }

    #[test]
    fn producer_runs_synchronously_in_constructor() {
        let ran = Cell::new(false);

        let _stream = Stream::<i32, ()>::new(|_| {
            ran.set(true);
            None
        });

        assert!(ran.get());
    }

    #[test]
    fn fan_out_to_every_observer_in_order() {
        let (stream, input) = Stream::pipe();
        let (first, _first_detach) = record(&stream);
        let (second, _second_detach) = record(&stream);

        input.send_next(1);
        input.send_next(2);
        input.send_completed();

        let expected = vec![Event::Next(1), Event::Next(2), Event::Completed];
        assert_eq!(*first.borrow(), expected);
        assert_eq!(*second.borrow(), expected);
    }

    #[test]
    fn nothing_after_terminal_event() {
        let (stream, input) = Stream::pipe();
        let (events, _detach) = record(&stream);

        input.send_failed("boom");
        input.send_next(1);
        input.send_completed();
        input.send_interrupted();

        assert_eq!(*events.borrow(), vec![Event::Failed("boom")]);
        assert!(input.is_closed());
    }

    #[test]
    fn terminal_event_detaches_everyone() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();
        let (_events, _detach) = record(&stream);
        assert_eq!(stream.observer_count(), 1);

        input.send_completed();

        assert!(stream.is_terminated());
        assert_eq!(stream.observer_count(), 0);
    }

    #[test]
    fn late_observer_is_interrupted() {
        let (stream, input) = Stream::pipe();
        input.send_completed();

        let (events, detach) = record(&stream);

        assert_eq!(*events.borrow(), vec![Event::Interrupted]);
        assert!(detach.is_disposed());
        assert_eq!(stream.observer_count(), 0);
    }

    #[test]
    fn detach_affects_only_one_observer() {
        let (stream, input) = Stream::pipe();
        let (first, first_detach) = record(&stream);
        let (second, _second_detach) = record(&stream);

        input.send_next(1);
        first_detach.dispose();
        first_detach.dispose();
        input.send_next(2);

        assert_eq!(*first.borrow(), vec![Event::Next(1)]);
        assert_eq!(*second.borrow(), vec![Event::Next(1), Event::Next(2)]);
        assert!(!stream.is_terminated());
    }

    #[test]
    fn producer_resources_disposed_on_termination() {
        let disposed = Rc::new(Cell::new(0));
        let input_slot = RefCell::new(None);

        let stream = Stream::<i32, ()>::new(|observer| {
            *input_slot.borrow_mut() = Some(observer);
            let disposed = Rc::clone(&disposed);
            Some(Box::new(ActionDisposable::new(move || {
                disposed.set(disposed.get() + 1);
            })))
        });

        let input = input_slot.take().unwrap();
        input.send_next(1);
        assert_eq!(disposed.get(), 0);

        input.send_completed();
        input.send_completed();
        assert_eq!(disposed.get(), 1);
        assert!(stream.is_terminated());
    }

    #[test]
    fn synchronous_completion_disposes_returned_resources() {
        let disposed = Rc::new(Cell::new(false));

        let stream = Stream::<i32, ()>::new(|observer| {
            observer.send_completed();
            let disposed = Rc::clone(&disposed);
            Some(Box::new(ActionDisposable::new(move || disposed.set(true))))
        });

        assert!(stream.is_terminated());
        assert!(disposed.get());
    }

    #[test]
    fn stream_outlives_handles_while_producer_holds_observer() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();
        let (events, _detach) = record(&stream);
        drop(stream);

        input.send_next(7);
        input.send_completed();

        assert_eq!(*events.borrow(), vec![Event::Next(7), Event::Completed]);
    }

    #[test]
    fn terminal_event_releases_stream_from_producer() {
        let (stream, input) = Stream::<i32, ()>::pipe();
        assert_eq!(Rc::strong_count(&stream.core), 2);

        input.send_completed();

        assert_eq!(Rc::strong_count(&stream.core), 1);
    }

    #[test]
    fn observer_detaching_itself_mid_delivery() {
        let (stream, input) = Stream::<i32, ()>::pipe();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let own_detach: Rc<RefCell<Option<ActionDisposable>>> = Rc::new(RefCell::new(None));

        let detach = stream.observe_next({
            let seen = Rc::clone(&seen);
            let own_detach = Rc::clone(&own_detach);
            move |value| {
                seen.borrow_mut().push(value);
                if let Some(detach) = own_detach.borrow().as_ref() {
                    detach.dispose();
                }
            }
        });
        *own_detach.borrow_mut() = Some(detach);

        let others = Rc::new(Cell::new(0));
        stream.observe_next({
            let others = Rc::clone(&others);
            move |_| others.set(others.get() + 1)
        });

        input.send_next(1);
        input.send_next(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(others.get(), 2);
    }

    #[test]
    fn reentrant_send_from_observer() {
        let (stream, input) = Stream::<i32, ()>::pipe();
        let seen = Rc::new(RefCell::new(Vec::new()));

        stream.observe_next({
            let input = input.clone();
            let seen = Rc::clone(&seen);
            move |value| {
                seen.borrow_mut().push(value);
                if value == 1 {
                    input.send_completed();
                }
            }
        });

        input.send_next(1);
        input.send_next(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(stream.is_terminated());
    }

    #[test]
    fn reentrant_send_reaches_every_observer_in_the_same_order() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();

        let (first, _first_detach) = record(&stream);
        stream.observe_next({
            let input = input.clone();
            move |value| {
                if value == 1 {
                    input.send_next(2);
                }
            }
        });
        let (last, _last_detach) = record(&stream);

        input.send_next(1);

        assert_eq!(*first.borrow(), vec![Event::Next(1), Event::Next(2)]);
        assert_eq!(*last.borrow(), vec![Event::Next(1), Event::Next(2)]);
    }

    #[test]
    fn termination_from_callback_follows_current_value() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();

        stream.observe_next({
            let input = input.clone();
            move |_| input.send_failed("stop")
        });
        let (later, _detach) = record(&stream);

        input.send_next(1);
        input.send_next(2);

        // The value being delivered still reaches everyone, then the terminal event does.
        assert_eq!(*later.borrow(), vec![Event::Next(1), Event::Failed("stop")]);
        assert!(stream.is_terminated());
        assert_eq!(stream.observer_count(), 0);
    }

    #[test]
    fn observer_attached_after_queued_termination_is_interrupted() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();
        let late: Events = Rc::new(RefCell::new(Vec::new()));

        stream.observe_next({
            let stream = stream.clone();
            let input = input.clone();
            let late = Rc::clone(&late);
            move |_| {
                input.send_completed();

                stream.observe({
                    let late = Rc::clone(&late);
                    move |event| late.borrow_mut().push(event)
                });
            }
        });

        input.send_next(1);

        assert_eq!(*late.borrow(), vec![Event::Interrupted]);
    }

    #[test]
    fn observe_helpers_filter_by_kind() {
        let (stream, input) = Stream::<i32, &'static str>::pipe();

        let log = Rc::new(RefCell::new(Vec::new()));
        stream.observe_next({
            let log = Rc::clone(&log);
            move |value| log.borrow_mut().push(format!("next {value}"))
        });
        stream.observe_failed({
            let log = Rc::clone(&log);
            move |error| log.borrow_mut().push(format!("failed {error}"))
        });
        stream.observe_completed({
            let log = Rc::clone(&log);
            move || log.borrow_mut().push("completed".to_string())
        });
        stream.observe_interrupted({
            let log = Rc::clone(&log);
            move || log.borrow_mut().push("interrupted".to_string())
        });

        input.send_next(1);
        input.send_failed("boom");

        assert_eq!(*log.borrow(), vec!["next 1", "failed boom"]);
    }

    #[test]
    fn factories_terminate_during_construction() {
        assert!(Stream::<i32, ()>::value(1).is_terminated());
        assert!(Stream::<i32, ()>::error(()).is_terminated());
        assert!(Stream::<i32, ()>::values(vec![1, 2, 3]).is_terminated());
        assert!(Stream::<i32, ()>::empty().is_terminated());
        assert!(!Stream::<i32, ()>::never().is_terminated());
    }
}
