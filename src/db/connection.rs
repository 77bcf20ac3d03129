//! Driver boundary: opening physical connections and running statements on them.

use crate::error::DbResult;
use crate::models::{JsonRow, QueryParam};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A physical connection owned by exactly one in-flight attempt.
///
/// Dropping the connection releases it as well; [`SqlConnection::close`] is
/// the orderly path used when the attempt finishes normally.
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Run a query and buffer every row it returns, in driver order.
    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<JsonRow>>;

    async fn begin(&mut self) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Release the connection. Calling it twice is a no-op.
    async fn close(&mut self) -> DbResult<()>;
}

/// Opens physical connections. Holds no retry logic.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: SqlConnection;

    /// Open a connection, failing with a cancellation error if `cancel`
    /// fires before or while connecting.
    async fn open(
        &self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> DbResult<Self::Connection>;
}
