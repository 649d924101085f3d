use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{Bag, Event};

/// Receiving end of an observer. Streams provide their own implementations for the observers
/// they hand to producers, user-supplied callbacks are wrapped in [`Callback`].
pub(crate) trait Sink<V, E> {
    fn receive(&self, event: Event<V, E>);

    /// Whether the sink has stopped accepting events for good.
    fn is_closed(&self) -> bool;
}

struct Callback<F>(F);

impl<V, E, F> Sink<V, E> for Callback<F>
where
    F: Fn(Event<V, E>),
{
    fn receive(&self, event: Event<V, E>) {
        (self.0)(event);
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// A typed sink for the events of a stream.
///
/// An observer wraps a single callback that is invoked with every [`Event`] delivered to it. The
/// `send_*` methods are shorthand for constructing and delivering each kind of event.
///
/// Observers are cheap to clone; clones share the same callback. The identity used to detach an
/// observer from a stream is the token returned when it was attached, not the observer value, so
/// the same observer may be attached multiple times and detached one attachment at a time.
///
/// Observers are single-threaded. If events need to come from multiple threads, the caller must
/// serialize them onto one thread first.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use event_streams::{Event, Observer};
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let observer = Observer::<i32, ()>::new({
///     let seen = Rc::clone(&seen);
///     move |event| seen.borrow_mut().push(event)
/// });
///
/// observer.send_next(1);
/// observer.send_completed();
///
/// assert_eq!(*seen.borrow(), vec![Event::Next(1), Event::Completed]);
/// ```
pub struct Observer<V, E> {
    sink: Rc<dyn Sink<V, E>>,
}

impl<V, E> Observer<V, E> {
    /// Creates an observer that invokes `action` for every event delivered to it.
    #[must_use]
    pub fn new(action: impl Fn(Event<V, E>) + 'static) -> Self {
        Self {
            sink: Rc::new(Callback(action)),
        }
    }

    pub(crate) fn from_sink(sink: Rc<dyn Sink<V, E>>) -> Self {
        Self { sink }
    }

    /// Delivers an event to the observer.
    #[inline]
    pub fn send(&self, event: Event<V, E>) {
        self.sink.receive(event);
    }

    /// Delivers a [`Event::Next`] carrying `value`.
    #[inline]
    pub fn send_next(&self, value: V) {
        self.send(Event::Next(value));
    }

    /// Delivers a [`Event::Failed`] carrying `error`.
    #[inline]
    pub fn send_failed(&self, error: E) {
        self.send(Event::Failed(error));
    }

    /// Delivers a [`Event::Completed`].
    #[inline]
    pub fn send_completed(&self) {
        self.send(Event::Completed);
    }

    /// Delivers a [`Event::Interrupted`].
    #[inline]
    pub fn send_interrupted(&self) {
        self.send(Event::Interrupted);
    }

    /// Whether whatever is behind this observer has stopped accepting events.
    ///
    /// Observers handed to producers by a stream become closed once the stream has terminated
    /// or, for a deferred stream, once the run they belong to has ended or was stopped. Producers
    /// emitting a long sequence can check this to stop early. Observers created from a callback
    /// via [`Observer::new()`] are never closed.
    #[must_use]
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    /// Delivers `event` to every observer in `observers`, tolerating observers that attach or
    /// detach (themselves or others) while the event is being delivered.
    pub(crate) fn broadcast(observers: &RefCell<Bag<Self>>, event: &Event<V, E>)
    where
        V: Clone,
        E: Clone,
    {
        Bag::traverse(observers, |_, observer| observer.send(event.clone()));
    }

    /// An observer that forwards to this one only until `closed` returns `true`, and reports
    /// itself closed from then on.
    pub(crate) fn until(self, closed: impl Fn() -> bool + 'static) -> Self
    where
        V: 'static,
        E: 'static,
    {
        Self::from_sink(Rc::new(Gated {
            inner: self,
            closed,
        }))
    }
}

struct Gated<V, E, C> {
    inner: Observer<V, E>,

    closed: C,
}

impl<V, E, C> Sink<V, E> for Gated<V, E, C>
where
    C: Fn() -> bool,
{
    fn receive(&self, event: Event<V, E>) {
        if !(self.closed)() {
            self.inner.send(event);
        }
    }

    fn is_closed(&self) -> bool {
        (self.closed)() || self.inner.is_closed()
    }
}

impl<V, E> Clone for Observer<V, E> {
    fn clone(&self) -> Self {
        Self {
            sink: Rc::clone(&self.sink),
        }
    }
}

impl<V, E> fmt::Debug for Observer<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(Observer<u32, ()>: Send, Sync);

    fn recording() -> (Rc<RefCell<Vec<Event<i32, &'static str>>>>, Observer<i32, &'static str>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let observer = Observer::new({
            let events = Rc::clone(&events);
            move |event| events.borrow_mut().push(event)
        });

        (events, observer)
    }

    #[test]
    fn senders_construct_matching_events() {
        let (events, observer) = recording();

        observer.send_next(1);
        observer.send_failed("boom");
        observer.send_completed();
        observer.send_interrupted();
        observer.send(Event::Next(2));

        assert_eq!(
            *events.borrow(),
            vec![
                Event::Next(1),
                Event::Failed("boom"),
                Event::Completed,
                Event::Interrupted,
                Event::Next(2),
            ]
        );
    }

    #[test]
    fn clones_share_callback() {
        let (events, observer) = recording();
        let clone = observer.clone();

        observer.send_next(1);
        clone.send_next(2);

        assert_eq!(*events.borrow(), vec![Event::Next(1), Event::Next(2)]);
    }

    #[test]
    fn callback_observer_is_never_closed() {
        let (_, observer) = recording();

        observer.send_completed();

        assert!(!observer.is_closed());
    }

    #[test]
    fn broadcast_reaches_every_observer() {
        let (first_events, first) = recording();
        let (second_events, second) = recording();

        let observers = RefCell::new(Bag::new());
        observers.borrow_mut().insert(first);
        observers.borrow_mut().insert(second);

        Observer::broadcast(&observers, &Event::Next(5));

        assert_eq!(*first_events.borrow(), vec![Event::Next(5)]);
        assert_eq!(*second_events.borrow(), vec![Event::Next(5)]);
    }

    #[test]
    fn broadcast_tolerates_detach_during_delivery() {
        let observers: Rc<RefCell<Bag<Observer<i32, ()>>>> = Rc::new(RefCell::new(Bag::new()));
        let calls = Rc::new(Cell::new(0));
        let tokens = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..3 {
            let observer = Observer::new({
                let observers = Rc::clone(&observers);
                let calls = Rc::clone(&calls);
                let tokens = Rc::clone(&tokens);
                move |_| {
                    calls.set(calls.get() + 1);

                    // Whoever runs first detaches everyone.
                    for token in tokens.borrow().iter() {
                        observers.borrow_mut().remove(*token);
                    }
                }
            });

            let token = observers.borrow_mut().insert(observer);
            tokens.borrow_mut().push(token);
        }

        Observer::broadcast(&observers, &Event::Next(1));

        assert_eq!(calls.get(), 1);
        assert!(observers.borrow().is_empty());
    }

    #[test]
    fn until_forwards_while_open() {
        let (events, observer) = recording();
        let closed = Rc::new(Cell::new(false));

        let gated = observer.until({
            let closed = Rc::clone(&closed);
            move || closed.get()
        });

        gated.send_next(1);
        assert!(!gated.is_closed());

        closed.set(true);
        gated.send_next(2);
        gated.send_completed();

        assert!(gated.is_closed());
        assert_eq!(*events.borrow(), vec![Event::Next(1)]);
    }

    #[test]
    fn until_reports_inner_closed() {
        let (stream, input) = crate::Stream::<i32, ()>::pipe();
        let gated = input.clone().until(|| false);

        input.send_completed();

        assert!(stream.is_terminated());
        assert!(gated.is_closed());
    }
}
