//! Error types for the resilient SQL layer.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every variant belongs to one class of the failure taxonomy (configuration,
//! transient, fatal, cancellation, batch contract) and [`DbError::is_retryable`]
//! is what the default retry engine consults to tell them apart.

use thiserror::Error;

/// SQLSTATE codes (and SQLite result codes) that indicate a failure likely to
/// succeed when the whole operation is attempted again.
const TRANSIENT_SQL_STATES: &[&str] = &[
    // serialization_failure (PostgreSQL, MySQL deadlock)
    "40001",
    // deadlock_detected (PostgreSQL)
    "40P01",
    // admin_shutdown, crash_shutdown, cannot_connect_now
    "57P01",
    "57P02",
    "57P03",
    // too_many_connections
    "53300",
    // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
    "5",
    "6",
    "261",
    "262",
    "517",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection string '{name}' is already configured")]
    DuplicateConnectionString { name: String },

    #[error("There's no connection string named '{name}'")]
    ConnectionStringNotFound { name: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "40P01" for a PostgreSQL deadlock
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error(
        "Batch insert row {row_index} returned {returned_rows} rows, exactly one was expected"
    )]
    BatchContractViolation {
        row_index: usize,
        returned_rows: usize,
    },

    #[error("Failed to map row: {message}")]
    Mapping { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a duplicate connection string error.
    pub fn duplicate_connection_string(name: impl Into<String>) -> Self {
        Self::DuplicateConnectionString { name: name.into() }
    }

    /// Create a connection string not found error.
    pub fn connection_string_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionStringNotFound { name: name.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn batch_contract_violation(row_index: usize, returned_rows: usize) -> Self {
        Self::BatchContractViolation {
            row_index,
            returned_rows,
        }
    }

    /// Create a row mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is transient and the operation worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Database {
                sql_state: Some(code),
                ..
            } => is_transient_sql_state(code),
            _ => false,
        }
    }

    /// Check if this error was raised by a cancelled token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error comes from the connection string configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateConnectionString { .. }
                | Self::ConnectionStringNotFound { .. }
                | Self::InvalidInput { .. }
        )
    }
}

fn is_transient_sql_state(code: &str) -> bool {
    // Class 08: connection exception
    code.starts_with("08") || TRANSIENT_SQL_STATES.contains(&code)
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::invalid_input(format!(
                "Invalid connection configuration: {}",
                msg
            )),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, constraints and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection",
                "Check database server load and connection limits",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::mapping(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::mapping(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::mapping(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::mapping(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::mapping(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Open a new connection and retry",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::mapping(err.to_string())
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
