//! Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use resilient_sql::config::{RepeatDelay, SqlConfiguration};
use resilient_sql::db::{ConnectionFactory, SqlConnection, SqlExecutor};
use resilient_sql::models::{JsonRow, QueryParam};
use resilient_sql::{DbError, DbResult, RetryingFaultHandler};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Answers every statement: `(sql, params)` to the rows it returns.
pub type Handler = Arc<dyn Fn(&str, &[QueryParam]) -> DbResult<Vec<JsonRow>> + Send + Sync>;

pub type TestExecutor = SqlExecutor<Arc<SqlConfiguration>, FakeFactory, RetryingFaultHandler>;

#[derive(Debug, Default)]
pub struct Counters {
    pub open_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    /// Connections released by `Drop` without an explicit close.
    pub dropped_open: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub statements: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Connections released by any path.
    pub fn released(&self) -> usize {
        Self::get(&self.closed) + Self::get(&self.dropped_open)
    }
}

struct Shared {
    counters: Arc<Counters>,
    handler: Handler,
    fail_commit: bool,
    fail_rollback: bool,
    fail_close: bool,
    opened_with: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failing {
    None,
    Commit,
    Rollback,
    Close,
}

pub struct FakeFactory {
    shared: Arc<Shared>,
    open_failures: Mutex<VecDeque<DbError>>,
}

impl FakeFactory {
    pub fn new(handler: Handler) -> Self {
        Self::build(handler, Vec::new(), Failing::None)
    }

    /// Each open pops the next error; once empty, opens succeed.
    pub fn with_open_failures(handler: Handler, failures: Vec<DbError>) -> Self {
        Self::build(handler, failures, Failing::None)
    }

    pub fn failing_commit(handler: Handler) -> Self {
        Self::build(handler, Vec::new(), Failing::Commit)
    }

    pub fn failing_rollback(handler: Handler) -> Self {
        Self::build(handler, Vec::new(), Failing::Rollback)
    }

    pub fn failing_close(handler: Handler) -> Self {
        Self::build(handler, Vec::new(), Failing::Close)
    }

    fn build(handler: Handler, failures: Vec<DbError>, failing: Failing) -> Self {
        Self {
            shared: Arc::new(Shared {
                counters: Arc::new(Counters::default()),
                handler,
                fail_commit: failing == Failing::Commit,
                fail_rollback: failing == Failing::Rollback,
                fail_close: failing == Failing::Close,
                opened_with: Mutex::new(Vec::new()),
            }),
            open_failures: Mutex::new(failures.into()),
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.shared.counters)
    }

    pub fn opened_with(&self) -> Vec<String> {
        self.shared.opened_with.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    async fn open(
        &self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> DbResult<FakeConnection> {
        self.shared.counters.open_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("connection open"));
        }
        if let Some(err) = self.open_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        self.shared.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.shared
            .opened_with
            .lock()
            .unwrap()
            .push(connection_string.to_string());
        Ok(FakeConnection {
            shared: Arc::clone(&self.shared),
            open: true,
        })
    }
}

pub struct FakeConnection {
    shared: Arc<Shared>,
    open: bool,
}

impl FakeConnection {
    fn run(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<JsonRow>> {
        assert!(self.open, "statement on a closed connection");
        self.shared.counters.statements.fetch_add(1, Ordering::SeqCst);
        (self.shared.handler)(sql, params)
    }
}

#[async_trait]
impl SqlConnection for FakeConnection {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.run(sql, params).map(|rows| rows.len() as u64)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<JsonRow>> {
        self.run(sql, params)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.shared.counters.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.shared.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_commit {
            return Err(DbError::database(
                "could not serialize access",
                Some("40001".to_string()),
                "retry",
            ));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_rollback {
            return Err(DbError::connection("rollback lost the link", "reconnect"));
        }
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.shared.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_close {
            return Err(DbError::internal("close failed"));
        }
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if self.open {
            self.shared.counters.dropped_open.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A handler that answers every statement with one `{"id": <first param>}` row.
pub fn echo_id() -> Handler {
    handler(|_, params| Ok(vec![id_row(param_value(params.first()))]))
}

pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&str, &[QueryParam]) -> DbResult<Vec<JsonRow>> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn id_row(id: Value) -> JsonRow {
    let mut row = JsonRow::new();
    row.insert("id".to_string(), id);
    row
}

pub fn param_value(param: Option<&QueryParam>) -> Value {
    match param {
        Some(QueryParam::Int(v)) => json!(v),
        Some(QueryParam::String(v)) => json!(v),
        _ => Value::Null,
    }
}

/// Configuration with a default and a named connection string and a tiny retry delay.
pub fn test_configuration(retry_count: u32) -> Arc<SqlConfiguration> {
    let config = SqlConfiguration::new()
        .with_transient_repeat_delay(
            RepeatDelay::between(Duration::from_millis(1), Duration::from_millis(3)).unwrap(),
        )
        .with_transient_retry_count(retry_count);
    config
        .set_connection_string("fake://default")
        .unwrap()
        .set_named_connection_string("Reporting", "fake://reporting")
        .unwrap();
    Arc::new(config)
}

pub fn executor(factory: FakeFactory, retry_count: u32) -> TestExecutor {
    SqlExecutor::from_configuration(test_configuration(retry_count), factory)
}

pub fn transient(message: &str) -> DbError {
    DbError::connection(message, "retry")
}
