//! Data models for the resilient SQL layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod label;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseType, masked_connection_string};
pub use label::Label;
pub use query::{IntoParams, JsonRow, QueryParam, decode_row};
