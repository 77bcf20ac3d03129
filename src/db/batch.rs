//! Transactional multi-row insert.
//!
//! Every row runs inside one transaction and must return exactly one result
//! row (typically through `RETURNING` or `OUTPUT`). Any failure rolls the
//! whole batch back before it propagates.

use crate::db::connection::SqlConnection;
use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, QueryParam, decode_row};
use crate::resilience::until_cancelled;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Insert `rows` one at a time inside a transaction on `conn`.
///
/// Returns one mapped result per input row, in input order. An empty batch
/// still begins and commits a transaction.
pub async fn insert_rows<C, T>(
    conn: &mut C,
    sql: &str,
    rows: &[Vec<QueryParam>],
    cancel: &CancellationToken,
) -> DbResult<Vec<T>>
where
    C: SqlConnection + ?Sized,
    T: DeserializeOwned,
{
    until_cancelled(cancel, "transaction begin", conn.begin()).await?;

    let outcome = match insert_each(conn, sql, rows, cancel).await {
        Ok(results) => until_cancelled(cancel, "transaction commit", conn.commit())
            .await
            .map(|()| results),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(results) => {
            debug!(rows = results.len(), "Batch committed");
            Ok(results)
        }
        Err(err) => {
            // Not raced against the token: a cancelled batch still has to roll back.
            if let Err(rollback_err) = conn.rollback().await {
                warn!(
                    error = %rollback_err,
                    cause = %err,
                    "Batch rollback failed"
                );
            } else {
                debug!(cause = %err, "Batch rolled back");
            }
            Err(err)
        }
    }
}

async fn insert_each<C, T>(
    conn: &mut C,
    sql: &str,
    rows: &[Vec<QueryParam>],
    cancel: &CancellationToken,
) -> DbResult<Vec<T>>
where
    C: SqlConnection + ?Sized,
    T: DeserializeOwned,
{
    let mut results = Vec::with_capacity(rows.len());

    for (row_index, params) in rows.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("batch insert"));
        }

        let returned = until_cancelled(cancel, "batch insert", conn.fetch_all(sql, params)).await?;
        let row = single_row(row_index, returned)?;
        results.push(decode_row(row)?);
    }

    Ok(results)
}

fn single_row(row_index: usize, returned: Vec<JsonRow>) -> DbResult<JsonRow> {
    let returned_rows = returned.len();
    match <[JsonRow; 1]>::try_from(returned) {
        Ok([row]) => Ok(row),
        Err(_) => Err(DbError::batch_contract_violation(row_index, returned_rows)),
    }
}
