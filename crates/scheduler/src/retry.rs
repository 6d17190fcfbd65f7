use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::RetryOpt;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetryError<E>
where
    E: Display,
{
    /// Every permitted attempt failed; `last` is the final error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// A non-retryable error ended the loop early.
    #[error("attempt {attempt} failed: {error}")]
    Fatal { attempt: u32, error: E },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E>
where
    E: Display,
{
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Cancelled { attempts } => *attempts,
        }
    }

    /// The error that ended the loop, `None` when it was cancelled.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `opt.max` retries are spent. `op` receives the 1-based attempt number and
/// is invoked at most `opt.max + 1` times. Cancellation is observed while an
/// attempt runs and while waiting between attempts.
pub async fn retry_with_backoff<T, E, F, Fut>(
    opt: &RetryOpt,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            res = op(attempt) => res,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(RetryError::Fatal {
                attempt,
                error: err,
            });
        }
        if attempt > opt.max {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = opt.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "attempt failed, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
