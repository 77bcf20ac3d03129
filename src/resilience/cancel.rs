//! Cooperative cancellation helpers.

use crate::error::{DbError, DbResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Drive `future` unless `cancel` fires first.
///
/// An already cancelled token wins without polling `future` at all.
pub async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    operation: &str,
    future: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = future => result,
    }
}
