//! Settled results for fallible async operations
//!
//! Wraps a future so the caller always gets a `{data, error}` pair back and
//! decides what a failure means, instead of short-circuiting with `?`.

use std::future::Future;

/// Outcome of a settled operation. Exactly one of `data` and `error` is set.
#[derive(Debug)]
pub struct Settled<T, E = eyre::Report> {
    pub data: Option<T>,
    pub error: Option<E>,
}

impl<T, E> Settled<T, E> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: E) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Back into a `Result`, for callers that do want to propagate
    pub fn into_result(self) -> Result<T, E> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            // Constructors never produce this
            (None, None) => unreachable!("settled value without data or error"),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(error),
        }
    }
}

/// Await `future` and settle it into a [`Settled`] pair
pub async fn settle<T, E, F>(future: F) -> Settled<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    future.await.into()
}
