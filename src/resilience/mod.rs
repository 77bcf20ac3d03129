//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! SqlExecutor::with_connection
//!     → retry.rs (classify failure, wait a bounded delay, run the attempt again)
//!     → cancel.rs (every suspension point races the caller's token)
//! ```
//!
//! # Design Decisions
//! - The whole resolve/open/use sequence is one attempt; nothing is retried piecemeal
//! - Cancellation is never classified as transient
//! - The last transient error is surfaced unchanged once attempts run out

pub mod cancel;
pub mod retry;

pub use cancel::until_cancelled;
pub use retry::{RetryingFaultHandler, TransientFaultHandler};
