//! Resilient execution pipeline.
//!
//! Every operation goes through [`SqlExecutor::with_connection`], which
//! resolves the connection string, opens a fresh connection, runs the
//! caller's work and closes the connection again, all inside one retried
//! attempt. A connection broken by a failed attempt is therefore never
//! reused by the next one.
//!
//! # Architecture
//!
//! The executor is generic over three collaborators composed at construction:
//! - [`ConnectionStringResolver`]: name to connection string
//! - [`ConnectionFactory`]: connection string to physical connection
//! - [`TransientFaultHandler`]: retry engine wrapping each attempt

use crate::config::{ConnectionStringResolver, SqlConfiguration};
use crate::db::batch;
use crate::db::connection::{ConnectionFactory, SqlConnection};
use crate::error::DbResult;
use crate::models::{IntoParams, Label, QueryParam, decode_row};
use crate::resilience::{RetryingFaultHandler, TransientFaultHandler, until_cancelled};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Executes statements with automatic retry on transient failures.
#[derive(Debug, Clone)]
pub struct SqlExecutor<R, F, H = RetryingFaultHandler> {
    resolver: R,
    factory: F,
    fault_handler: H,
}

impl<F: ConnectionFactory> SqlExecutor<Arc<SqlConfiguration>, F, RetryingFaultHandler> {
    /// Resolve connection strings from `config` and retry with its policy.
    ///
    /// The policy is captured now; later configuration changes do not
    /// affect this executor.
    pub fn from_configuration(config: Arc<SqlConfiguration>, factory: F) -> Self {
        let fault_handler = RetryingFaultHandler::new(config.retry_policy());
        Self::new(config, factory, fault_handler)
    }
}

impl<R, F, H> SqlExecutor<R, F, H>
where
    R: ConnectionStringResolver,
    F: ConnectionFactory,
    H: TransientFaultHandler,
{
    pub fn new(resolver: R, factory: F, fault_handler: H) -> Self {
        Self {
            resolver,
            factory,
            fault_handler,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn fault_handler(&self) -> &H {
        &self.fault_handler
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute<P: IntoParams>(
        &self,
        label: &Label,
        connection_string_name: &str,
        cancel: &CancellationToken,
        sql: &str,
        params: P,
    ) -> DbResult<u64> {
        let sql: Arc<str> = Arc::from(sql);
        let params: Arc<[QueryParam]> = params.into_params().into();

        self.with_connection(label, connection_string_name, cancel, move |conn, cancel| {
            let sql = Arc::clone(&sql);
            let params = Arc::clone(&params);
            Box::pin(async move {
                until_cancelled(&cancel, "statement execution", conn.execute(&sql, &params)).await
            })
        })
        .await
    }

    /// Run a query and map every returned row to `T`, in driver order.
    pub async fn query<T, P>(
        &self,
        label: &Label,
        connection_string_name: &str,
        cancel: &CancellationToken,
        sql: &str,
        params: P,
    ) -> DbResult<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
        P: IntoParams,
    {
        let sql: Arc<str> = Arc::from(sql);
        let params: Arc<[QueryParam]> = params.into_params().into();

        self.with_connection(label, connection_string_name, cancel, move |conn, cancel| {
            let sql = Arc::clone(&sql);
            let params = Arc::clone(&params);
            Box::pin(async move {
                let rows =
                    until_cancelled(&cancel, "query execution", conn.fetch_all(&sql, &params))
                        .await?;
                rows.into_iter().map(decode_row).collect::<DbResult<Vec<T>>>()
            })
        })
        .await
    }

    /// Insert every row in one transaction, returning one mapped result per row.
    ///
    /// `sql` must produce exactly one row per execution. A transient failure
    /// restarts the whole batch on a fresh connection.
    pub async fn insert_multiple<T, P, I>(
        &self,
        label: &Label,
        connection_string_name: &str,
        cancel: &CancellationToken,
        sql: &str,
        rows: I,
    ) -> DbResult<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
        P: IntoParams,
        I: IntoIterator<Item = P>,
    {
        let sql: Arc<str> = Arc::from(sql);
        let rows: Arc<[Vec<QueryParam>]> = rows.into_iter().map(IntoParams::into_params).collect();

        debug!(
            label = %label,
            connection_string_name,
            rows = rows.len(),
            "Starting batch insert"
        );

        self.with_connection(label, connection_string_name, cancel, move |conn, cancel| {
            let sql = Arc::clone(&sql);
            let rows = Arc::clone(&rows);
            Box::pin(async move { batch::insert_rows(conn, &sql, &rows, &cancel).await })
        })
        .await
    }

    /// Run `operation` on a freshly opened connection, retrying transient failures.
    ///
    /// Each attempt resolves the connection string and opens its own
    /// connection, which is closed before the attempt returns. The operation
    /// receives a clone of `cancel` and is expected to observe it.
    pub async fn with_connection<T, Op>(
        &self,
        label: &Label,
        connection_string_name: &str,
        cancel: &CancellationToken,
        operation: Op,
    ) -> DbResult<T>
    where
        T: Send + 'static,
        Op: for<'c> Fn(&'c mut F::Connection, CancellationToken) -> BoxFuture<'c, DbResult<T>>
            + Send
            + Sync,
    {
        let operation = &operation;

        self.fault_handler
            .try_async(label, cancel, move |attempt| async move {
                let connection_string = self
                    .resolver
                    .connection_string(label, connection_string_name, cancel)
                    .await?;
                let mut conn = self.factory.open(&connection_string, cancel).await?;
                debug!(
                    label = %label,
                    connection_string_name,
                    attempt,
                    "Connection opened"
                );

                let result = operation(&mut conn, cancel.clone()).await;

                if let Err(err) = conn.close().await {
                    warn!(
                        label = %label,
                        connection_string_name,
                        attempt,
                        error = %err,
                        "Failed to close connection"
                    );
                }
                result
            })
            .await
    }
}
