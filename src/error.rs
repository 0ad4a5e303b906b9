use thiserror::Error;

/// The reason a [Context](crate::Context) is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Operation-level failure of a cancellable parallel operation.
///
/// Cancellation is kept apart from failures raised by the user function.
#[derive(Debug, Error)]
pub enum Error<E> {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("task failed: {0}")]
    Task(E),
}

impl<E> Error<E> {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Returns the error produced by the user function, if any.
    pub fn into_task(self) -> Option<E> {
        match self {
            Self::Task(err) => Some(err),
            Self::Context(_) => None,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
