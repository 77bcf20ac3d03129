//! Database access layer.
//!
//! This module provides:
//! - The driver boundary traits (`SqlConnection`, `ConnectionFactory`)
//! - The sqlx-backed driver for PostgreSQL, MySQL and SQLite
//! - The resilient executor and the transactional batch insert
//! - Parameter binding and row-to-JSON type mappings

pub mod batch;
pub mod connection;
pub mod driver;
pub mod executor;
pub mod params;
pub mod types;

pub use batch::insert_rows;
pub use connection::{ConnectionFactory, SqlConnection};
pub use driver::{SqlxConnection, SqlxConnectionFactory};
pub use executor::SqlExecutor;
