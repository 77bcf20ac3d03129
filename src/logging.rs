//! Tracing subscriber setup for hosts that want the crate's default log output.

use crate::config::LogSettings;
use crate::error::{DbError, DbResult};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if the host
/// already installed a subscriber.
pub fn init_tracing(settings: &LogSettings) -> DbResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = if settings.json_logs {
        subscriber.with(fmt::layer().json()).try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()
    };

    installed.map_err(|e| DbError::internal(format!("Failed to install tracing subscriber: {}", e)))
}
