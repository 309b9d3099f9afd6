use std::fmt::Display;

use tracing::{error, info};

use super::{StateError, StateResult, retry_if_possible};

/// Runs a transaction until it succeeds, is cancelled, or exhausts `max_retries`.
///
/// Each attempt calls `f` afresh, so the transaction must be safe to repeat.
///
/// # Errors
///
/// Returns [`StateError::Cancelled`] if the transaction was cancelled or retried for too many times.
pub async fn run_transaction<T, F, Fut>(name: impl Display, max_retries: u8, mut f: F) -> StateResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StateResult<T>>,
{
    info!("starting transaction {name}…");
    let mut retry: u8 = 0;

    loop {
        match f().await {
            Ok(value) => {
                info!("transaction {name} succeed!");
                return Ok(value);
            }
            Err(StateError::Retry) => retry_if_possible(&mut retry, max_retries)?,
            Err(StateError::Cancelled) => {
                error!("transaction {name} failed!");
                return Err(StateError::Cancelled);
            }
        }
    }
}
