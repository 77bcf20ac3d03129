//! sqlx-backed connection factory.
//!
//! Opens one dedicated (non-pooled) connection per attempt for PostgreSQL,
//! MySQL or SQLite URLs. Pooling is left to the server side or to a custom
//! [`ConnectionFactory`].
//!
//! # Architecture
//!
//! Each backend gets its own submodule with the same `execute`/`fetch_all`
//! shape, adapted to the backend's argument and row types. The code is kept
//! parallel so the differences stand out.

use crate::config::SqlConfiguration;
use crate::db::connection::{ConnectionFactory, SqlConnection};
use crate::db::params::{bind_mysql, bind_postgres, bind_sqlite};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, JsonRow, QueryParam, masked_connection_string};
use crate::resilience::until_cancelled;
use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection, PgConnection, SqliteConnection};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Opens sqlx connections, picking the backend from the URL scheme.
#[derive(Debug, Clone)]
pub struct SqlxConnectionFactory {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SqlxConnectionFactory {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }

    /// Use the timeouts held by the configuration.
    pub fn from_configuration(config: &SqlConfiguration) -> Self {
        Self::new(config.connect_timeout(), config.command_timeout())
    }
}

#[async_trait]
impl ConnectionFactory for SqlxConnectionFactory {
    type Connection = SqlxConnection;

    async fn open(
        &self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> DbResult<SqlxConnection> {
        let db_type = DatabaseType::from_connection_string(connection_string).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Unknown database type in connection string: {}",
                masked_connection_string(connection_string)
            ))
        })?;

        debug!(
            db_type = %db_type,
            target = %masked_connection_string(connection_string),
            "Opening connection"
        );

        let connect = async {
            let backend = match db_type {
                DatabaseType::MySQL => {
                    Backend::MySql(MySqlConnection::connect(connection_string).await?)
                }
                DatabaseType::PostgreSQL => {
                    Backend::Postgres(PgConnection::connect(connection_string).await?)
                }
                DatabaseType::SQLite => {
                    Backend::SQLite(SqliteConnection::connect(connection_string).await?)
                }
            };
            Ok::<_, DbError>(backend)
        };

        let backend = until_cancelled(
            cancel,
            "connection open",
            with_timeout("connection open", self.connect_timeout, connect),
        )
        .await?;

        Ok(SqlxConnection {
            backend: Some(backend),
            db_type,
            command_timeout: self.command_timeout,
        })
    }
}

/// Database-specific connection (avoids AnyConnection limitations).
#[derive(Debug)]
enum Backend {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

/// A dedicated sqlx connection. Every statement is bounded by the command timeout.
#[derive(Debug)]
pub struct SqlxConnection {
    /// `None` once closed.
    backend: Option<Backend>,
    db_type: DatabaseType,
    command_timeout: Duration,
}

impl SqlxConnection {
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn backend(&mut self) -> DbResult<&mut Backend> {
        self.backend
            .as_mut()
            .ok_or_else(|| DbError::internal("Connection is already closed"))
    }

    async fn run_control(&mut self, statement: &'static str) -> DbResult<()> {
        self.execute(statement, &[]).await.map(|_| ())
    }
}

#[async_trait]
impl SqlConnection for SqlxConnection {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let timeout = self.command_timeout;
        let work = async {
            match self.backend()? {
                Backend::MySql(c) => mysql::execute(c, sql, params).await,
                Backend::Postgres(c) => postgres::execute(c, sql, params).await,
                Backend::SQLite(c) => sqlite::execute(c, sql, params).await,
            }
        };
        with_timeout("statement execution", timeout, work).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<JsonRow>> {
        let timeout = self.command_timeout;
        let work = async {
            match self.backend()? {
                Backend::MySql(c) => mysql::fetch_all(c, sql, params).await,
                Backend::Postgres(c) => postgres::fetch_all(c, sql, params).await,
                Backend::SQLite(c) => sqlite::fetch_all(c, sql, params).await,
            }
        };
        with_timeout("query execution", timeout, work).await
    }

    async fn begin(&mut self) -> DbResult<()> {
        match self.db_type {
            DatabaseType::MySQL => self.run_control("START TRANSACTION").await,
            DatabaseType::PostgreSQL | DatabaseType::SQLite => self.run_control("BEGIN").await,
        }
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.run_control("ROLLBACK").await
    }

    async fn close(&mut self) -> DbResult<()> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        let closed = match backend {
            Backend::MySql(c) => c.close().await,
            Backend::Postgres(c) => c.close().await,
            Backend::SQLite(c) => c.close().await,
        };
        closed.map_err(DbError::from)
    }
}

async fn with_timeout<T, F>(operation: &str, limit: Duration, future: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, limit)),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Without parameters the raw SQL is sent as-is, which avoids prepared
// statement restrictions (transaction control, some DDL).

mod mysql {
    use super::*;

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            bind_mysql(sqlx::query(sql), params).execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            bind_mysql(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(RowToJson::to_json_row).collect()
    }
}

mod postgres {
    use super::*;

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            bind_postgres(sqlx::query(sql), params).execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            bind_postgres(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(RowToJson::to_json_row).collect()
    }
}

mod sqlite {
    use super::*;

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            bind_sqlite(sqlx::query(sql), params).execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            bind_sqlite(sqlx::query(sql), params).fetch_all(&mut *conn).await?
        };
        rows.iter().map(RowToJson::to_json_row).collect()
    }
}
