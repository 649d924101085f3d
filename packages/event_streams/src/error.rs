use thiserror::Error;

/// Returned by [`DeferredStream::try_start()`][crate::DeferredStream::try_start] when the
/// deferred stream already has an active run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("deferred stream is already running")]
pub struct AlreadyRunning {
    _private: (),
}

impl AlreadyRunning {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Why collecting the values of a stream did not produce a result.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectError<E> {
    /// The stream failed with the contained error.
    #[error("stream failed: {0}")]
    Failed(E),

    /// The stream was interrupted before it completed.
    #[error("stream was interrupted")]
    Interrupted,

    /// The stream was dropped without ever delivering a terminal event.
    #[error("stream was dropped before it terminated")]
    Abandoned,
}
