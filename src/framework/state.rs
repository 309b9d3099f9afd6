use tracing::{error, warn};

/// Instructs the surrounding loop how to continue after a failed step.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The control flow should retry if possible.
    ///
    /// See: [`retry_if_possible`]
    #[error("transaction should be retried")]
    Retry,
    /// The control flow should exit immediately.
    #[error("transaction was cancelled")]
    Cancelled,
}

/// The result of a step inside a retrying transaction.
pub type StateResult<T> = Result<T, StateError>;

/// Decides whether retrying is allowed based on a provided retry times and the `max_retries` limit.
///
/// # Errors
///
/// Returns [`StateError::Cancelled`] if retrying is not allowed.
pub fn retry_if_possible(retry: &mut u8, max_retries: u8) -> StateResult<()> {
    *retry = retry.saturating_add(1);
    if *retry > max_retries {
        error!("retried for too many times ({max_retries}), stopping!");
        Err(StateError::Cancelled)
    } else {
        warn!("retrying… ({retry} / {max_retries})");
        Ok(())
    }
}
