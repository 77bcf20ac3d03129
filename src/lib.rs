//! Resilient SQL data-access layer.
//!
//! Resolves named connection strings, opens a fresh connection per attempt,
//! retries transient failures with a bounded random delay and inserts row
//! batches inside a single transaction. PostgreSQL, MySQL and SQLite are
//! supported through sqlx; other drivers plug in via [`db::ConnectionFactory`].

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod resilience;

pub use config::{ConnectionStringResolver, RepeatDelay, RetryPolicy, SqlConfiguration, SqlSettings};
pub use db::{ConnectionFactory, SqlConnection, SqlExecutor, SqlxConnectionFactory};
pub use error::{DbError, DbResult};
pub use models::{IntoParams, JsonRow, Label, QueryParam};
pub use resilience::{RetryingFaultHandler, TransientFaultHandler};
