//! Retry logic.
//!
//! # Responsibilities
//! - Run an operation and classify its failure as transient or fatal
//! - Retry transient failures up to the configured count
//! - Wait a delay drawn from the configured bounds between attempts
//! - Abort immediately, delay included, when the caller cancels

use crate::config::RetryPolicy;
use crate::error::{DbError, DbResult};
use crate::models::Label;
use crate::resilience::until_cancelled;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs an operation, retrying it on transient failures.
///
/// The operation receives the 1-based attempt number. Every call of the
/// operation must be a complete, independent attempt.
#[async_trait]
pub trait TransientFaultHandler: Send + Sync {
    async fn try_async<T, Op, Fut>(
        &self,
        label: &Label,
        cancel: &CancellationToken,
        operation: Op,
    ) -> DbResult<T>
    where
        T: Send,
        Op: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = DbResult<T>> + Send;
}

/// Default engine: bounded random delay, fixed retry count.
#[derive(Debug, Clone)]
pub struct RetryingFaultHandler {
    policy: RetryPolicy,
    classifier: fn(&DbError) -> bool,
}

impl RetryingFaultHandler {
    /// Create an engine that retries errors reported by [`DbError::is_retryable`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: DbError::is_retryable,
        }
    }

    /// Replace the transient failure classifier.
    pub fn with_classifier(mut self, classifier: fn(&DbError) -> bool) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn is_transient(&self, err: &DbError) -> bool {
        // Cancellation wins over whatever the classifier says.
        !err.is_cancelled() && (self.classifier)(err)
    }
}

#[async_trait]
impl TransientFaultHandler for RetryingFaultHandler {
    async fn try_async<T, Op, Fut>(
        &self,
        label: &Label,
        cancel: &CancellationToken,
        mut operation: Op,
    ) -> DbResult<T>
    where
        T: Send,
        Op: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = DbResult<T>> + Send,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(DbError::cancelled("operation"));
            }

            attempt += 1;
            debug!(label = %label, attempt, max_attempts, "Running attempt");

            let err = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(label = %label, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.is_transient(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(
                    label = %label,
                    attempts = attempt,
                    error = %err,
                    "Transient failure, no retries left"
                );
                return Err(err);
            }

            let delay = self.policy.delay.next_delay();
            warn!(
                label = %label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );

            until_cancelled(cancel, "retry delay", async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
    }
}
