//! SQLite-backed sandbox

use crate::abort::{AbortFlag, AbortReason};
use crate::Sandbox;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle};
use sqlbox_core::{Cell, Error, ExecutionInput, ExecutionOutput, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Executes each request in a fresh `:memory:` SQLite database
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSandbox;

impl SqliteSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Why the blocking worker stopped without an output
enum Failure {
    Init(String),
    Query(String),
    Aborted,
}

/// Interrupts the engine if the caller's future is dropped mid-run
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    abort: Arc<AbortFlag>,
    armed: bool,
}

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed && self.abort.trip(AbortReason::Cancelled) {
            self.handle.interrupt();
        }
    }
}

#[async_trait]
impl Sandbox for SqliteSandbox {
    #[instrument(skip_all, fields(deadline_ms = deadline.as_millis() as u64))]
    async fn execute(
        &self,
        input: ExecutionInput,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("query"));
        }

        let conn = Connection::open_in_memory()
            .map_err(|e| Error::sandbox(format!("open database: {e}")))?;
        let handle = Arc::new(conn.get_interrupt_handle());
        let abort = Arc::new(AbortFlag::new());

        let started = Instant::now();
        let worker_abort = Arc::clone(&abort);
        let mut worker =
            tokio::task::spawn_blocking(move || run_in_sandbox(conn, &input, worker_abort));

        let guard = InterruptOnDrop {
            handle: Arc::clone(&handle),
            abort: Arc::clone(&abort),
            armed: true,
        };

        let stopped = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AbortReason::Cancelled),
            () = tokio::time::sleep(deadline) => Err(AbortReason::TimedOut),
            joined = &mut worker => Ok(joined),
        };
        let joined = match stopped {
            Ok(joined) => joined,
            Err(reason) => {
                if abort.trip(reason) {
                    handle.interrupt();
                }
                // the engine unwinds at its next interrupt check
                worker.await
            }
        };
        guard.disarm();

        let outcome = joined.map_err(|e| Error::sandbox(format!("sandbox worker failed: {e}")))?;

        match abort.reason() {
            Some(AbortReason::TimedOut) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sandbox interrupted at deadline"
                );
                return Err(Error::timeout("query", deadline));
            }
            Some(AbortReason::Cancelled) => {
                debug!("sandbox interrupted by caller");
                return Err(Error::cancelled("query"));
            }
            None => {}
        }

        match outcome {
            Ok(output) => {
                debug!(
                    columns = output.column_count(),
                    rows = output.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sandbox run completed"
                );
                Ok(output)
            }
            Err(Failure::Init(message)) => Err(Error::init_error(message)),
            Err(Failure::Query(message)) => Err(Error::query_error(message)),
            Err(Failure::Aborted) => {
                warn!("sandbox worker reported an abort without a recorded reason");
                Err(Error::sandbox("sandbox aborted"))
            }
        }
    }
}

/// VM instructions between abort polls inside a single statement
const PROGRESS_INTERVAL: i32 = 1_000;

/// Blocking body of a run; owns and finally drops the connection
fn run_in_sandbox(
    conn: Connection,
    input: &ExecutionInput,
    abort: Arc<AbortFlag>,
) -> std::result::Result<ExecutionOutput, Failure> {
    // an interrupt that lands between two statements of a batch is dropped
    // by the engine; polling the flag covers that window
    let poll = Arc::clone(&abort);
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || poll.is_tripped()));

    check(&abort)?;
    conn.execute_batch(&input.init)
        .map_err(|e| interrupted_or(&abort, Failure::Init(e.to_string())))?;
    check(&abort)?;

    let output = run_query(&conn, &input.query, &abort);
    drop(conn);
    output
}

fn run_query(
    conn: &Connection,
    query: &str,
    abort: &AbortFlag,
) -> std::result::Result<ExecutionOutput, Failure> {
    let statements =
        sqlbox_sql::split_statements(query).map_err(|e| Failure::Query(e.to_string()))?;
    let Some((last, leading)) = statements.split_last() else {
        return Ok(ExecutionOutput::empty());
    };

    let query_failure = |e: rusqlite::Error| interrupted_or(abort, Failure::Query(e.to_string()));

    for sql in leading {
        check(abort)?;
        let mut stmt = conn.prepare(sql).map_err(query_failure)?;
        let mut rows = stmt.query([]).map_err(query_failure)?;
        while rows.next().map_err(query_failure)?.is_some() {
            check(abort)?;
        }
    }

    check(abort)?;
    let mut stmt = conn.prepare(last).map_err(query_failure)?;
    let header: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let column_count = header.len();

    let mut rows = stmt.query([]).map_err(query_failure)?;
    let mut data = Vec::new();
    while let Some(row) = rows.next().map_err(query_failure)? {
        check(abort)?;
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            cells.push(to_cell(row.get_ref(i).map_err(query_failure)?));
        }
        data.push(cells);
    }

    Ok(ExecutionOutput::new(header, data))
}

fn check(abort: &AbortFlag) -> std::result::Result<(), Failure> {
    if abort.is_tripped() {
        Err(Failure::Aborted)
    } else {
        Ok(())
    }
}

fn interrupted_or(abort: &AbortFlag, failure: Failure) -> Failure {
    if abort.is_tripped() {
        Failure::Aborted
    } else {
        failure
    }
}

/// Nullable text projection of a cell
fn to_cell(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
