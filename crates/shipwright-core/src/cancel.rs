//! Cancellation helpers for external calls.

use std::future::Future;

use crate::{CancellationToken, Error, Result};

/// Fail with [`Error::Cancelled`] once `cancel` has fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Await `fut` unless `cancel` fires first.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}
