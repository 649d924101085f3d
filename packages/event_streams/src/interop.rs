//! Bridges between streams and futures.
//!
//! Streams never poll anything themselves. A future becomes a stream through a driver future that
//! the host executor polls, and a stream becomes a future by collecting its values until it
//! terminates.

use std::cell::RefCell;

use futures::channel::oneshot;
use scopeguard::ScopeGuard;

use crate::{CollectError, Event, Stream};

impl<V, E> Stream<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a stream that emits the outcome of `future`, together with the driver future that
    /// must be polled (on whatever executor the caller uses) to make that happen.
    ///
    /// When the driver completes, the stream emits `Next(value)` and `Completed` if `future`
    /// resolved to `Ok(value)`, or `Failed(error)` if it resolved to `Err(error)`. If the driver
    /// is dropped before `future` resolves, the stream is interrupted instead.
    ///
    /// Nothing is emitted until the driver is polled, so observers attached right after this
    /// returns see every event.
    ///
    /// # Example
    ///
    /// ```rust
    /// use futures::executor::block_on;
    /// use event_streams::Stream;
    ///
    /// let (stream, driver) = Stream::<i32, String>::from_future(async { Ok(42) });
    /// let values = stream.collect();
    ///
    /// block_on(driver);
    ///
    /// assert_eq!(block_on(values), Ok(vec![42]));
    /// ```
    #[must_use]
    pub fn from_future(
        future: impl Future<Output = Result<V, E>>,
    ) -> (Self, impl Future<Output = ()>) {
        let (stream, input) = Self::pipe();

        let interrupt_on_drop = scopeguard::guard(input, |input| input.send_interrupted());

        let driver = async move {
            let outcome = future.await;

            let input = ScopeGuard::into_inner(interrupt_on_drop);

            match outcome {
                Ok(value) => {
                    input.send_next(value);
                    input.send_completed();
                }
                Err(error) => input.send_failed(error),
            }
        };

        (stream, driver)
    }

    /// Attaches an observer that gathers every value of the stream, returning a future that
    /// resolves once the stream has terminated.
    ///
    /// # Errors
    ///
    /// The future resolves to an error if the stream fails or is interrupted instead of
    /// completing, or if the stream is dropped without ever terminating. A stream that has
    /// already terminated interrupts the observer immediately.
    pub fn collect(&self) -> impl Future<Output = Result<Vec<V>, CollectError<E>>> + 'static {
        let (sender, receiver) = oneshot::channel();

        let sender = RefCell::new(Some(sender));
        let values = RefCell::new(Vec::new());

        self.observe(move |event| {
            let outcome = match event {
                Event::Next(value) => {
                    values.borrow_mut().push(value);
                    return;
                }
                Event::Completed => Ok(values.take()),
                Event::Failed(error) => Err(CollectError::Failed(error)),
                Event::Interrupted => Err(CollectError::Interrupted),
            };

            if let Some(sender) = sender.borrow_mut().take() {
                // The caller may have dropped the future, in which case nobody is interested.
                drop(sender.send(outcome));
            }
        });

        async move { receiver.await.unwrap_or(Err(CollectError::Abandoned)) }
    }
}
