/// One unit of information delivered by a stream to its observers.
///
/// A stream emits zero or more [`Next`][Event::Next] events followed by at most one terminal
/// event. [`Completed`][Event::Completed], [`Failed`][Event::Failed] and
/// [`Interrupted`][Event::Interrupted] are the terminal kinds and are mutually exclusive: once one
/// of them has been delivered on a subscription, nothing else is delivered on it.
///
/// `Failed` signals that the producer could not finish its work. `Interrupted` signals that the
/// work was cancelled (e.g. a deferred stream was stopped or an observer was attached to a stream
/// that had already terminated) and is not an error.
///
/// # Example
///
/// ```rust
/// use event_streams::Event;
///
/// let event: Event<i32, String> = Event::Next(21);
/// assert_eq!(event.map(|v| v * 2), Event::Next(42));
///
/// let done: Event<i32, String> = Event::Completed;
/// assert!(done.is_terminal());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the four outcomes are the complete event algebra and callers are expected to match on all of them"
)]
pub enum Event<V, E> {
    /// A value produced by the stream. Not terminal.
    Next(V),

    /// The stream failed with an error. Terminal.
    Failed(E),

    /// The stream finished successfully. Terminal.
    Completed,

    /// The stream was cancelled before it could finish. Terminal.
    Interrupted,
}

impl<V, E> Event<V, E> {
    /// Whether this event ends the event sequence of the subscription it is delivered on.
    #[must_use]
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }

    /// The payload of a `Next` event, if this is one.
    #[must_use]
    #[inline]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Next(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the event, returning the payload of a `Next` event, if this is one.
    #[must_use]
    #[inline]
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Next(value) => Some(value),
            _ => None,
        }
    }

    /// The error carried by a `Failed` event, if this is one.
    #[must_use]
    #[inline]
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// A short static name of the event kind, suitable for structured logging.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // No API contract for diagnostic names.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Next(_) => "next",
            Self::Failed(_) => "failed",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    /// Transforms the payload of a `Next` event. Terminal events pass through unchanged.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Event<U, E> {
        match self {
            Self::Next(value) => Event::Next(f(value)),
            Self::Failed(error) => Event::Failed(error),
            Self::Completed => Event::Completed,
            Self::Interrupted => Event::Interrupted,
        }
    }

    /// Transforms the error of a `Failed` event. All other events pass through unchanged.
    #[must_use]
    pub fn map_error<F>(self, f: impl FnOnce(E) -> F) -> Event<V, F> {
        match self {
            Self::Next(value) => Event::Next(value),
            Self::Failed(error) => Event::Failed(f(error)),
            Self::Completed => Event::Completed,
            Self::Interrupted => Event::Interrupted,
        }
    }

    /// Transforms the payload of a `Next` event, suppressing the event entirely if `f` returns
    /// [`None`]. Terminal events pass through unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use event_streams::Event;
    ///
    /// let even: Event<i32, ()> = Event::Next(4);
    /// let odd: Event<i32, ()> = Event::Next(5);
    /// let half = |v: i32| (v % 2 == 0).then_some(v / 2);
    ///
    /// assert_eq!(even.flat_map(half), Some(Event::Next(2)));
    /// assert_eq!(odd.flat_map(half), None);
    /// ```
    #[must_use]
    pub fn flat_map<U>(self, f: impl FnOnce(V) -> Option<U>) -> Option<Event<U, E>> {
        match self {
            Self::Next(value) => f(value).map(Event::Next),
            Self::Failed(error) => Some(Event::Failed(error)),
            Self::Completed => Some(Event::Completed),
            Self::Interrupted => Some(Event::Interrupted),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    type TestEvent = Event<i32, &'static str>;

    #[test]
    fn only_next_is_non_terminal() {
        assert!(!TestEvent::Next(1).is_terminal());
        assert!(TestEvent::Failed("boom").is_terminal());
        assert!(TestEvent::Completed.is_terminal());
        assert!(TestEvent::Interrupted.is_terminal());
    }

    #[test]
    fn map_touches_only_next() {
        assert_eq!(TestEvent::Next(2).map(|v| v + 1), Event::Next(3));
        assert_eq!(
            TestEvent::Failed("boom").map(|v| v + 1),
            Event::Failed("boom")
        );
        assert_eq!(TestEvent::Completed.map(|v| v + 1), Event::Completed);
        assert_eq!(TestEvent::Interrupted.map(|v| v + 1), Event::Interrupted);
    }

    #[test]
    fn map_error_touches_only_failed() {
        assert_eq!(TestEvent::Next(2).map_error(str::len), Event::Next(2));
        assert_eq!(TestEvent::Failed("boom").map_error(str::len), Event::Failed(4));
        assert_eq!(TestEvent::Completed.map_error(str::len), Event::Completed);
        assert_eq!(
            TestEvent::Interrupted.map_error(str::len),
            Event::Interrupted
        );
    }

    #[test]
    fn flat_map_suppresses_empty_results() {
        let positive = |v: i32| (v > 0).then_some(v);

        assert_eq!(TestEvent::Next(3).flat_map(positive), Some(Event::Next(3)));
        assert_eq!(TestEvent::Next(-3).flat_map(positive), None);
        assert_eq!(
            TestEvent::Failed("boom").flat_map(positive),
            Some(Event::Failed("boom"))
        );
        assert_eq!(
            TestEvent::Completed.flat_map(positive),
            Some(Event::Completed)
        );
        assert_eq!(
            TestEvent::Interrupted.flat_map(positive),
            Some(Event::Interrupted)
        );
    }

    #[test]
    fn accessors() {
        assert_eq!(TestEvent::Next(7).value(), Some(&7));
        assert_eq!(TestEvent::Completed.value(), None);
        assert_eq!(TestEvent::Next(7).into_value(), Some(7));
        assert_eq!(TestEvent::Failed("boom").into_value(), None);
        assert_eq!(TestEvent::Failed("boom").error(), Some(&"boom"));
        assert_eq!(TestEvent::Next(7).error(), None);
    }
}
