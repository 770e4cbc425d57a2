//! Ledger trait definitions

use crate::model::{ChangeStatus, RecordKind, Run, RunError, RunId, RunStatus, Source};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Run {id} is already {status}")]
    InvalidTransition { id: RunId, status: RunStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Filter criteria for listing runs
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub source: Option<Source>,
    pub kind: Option<RecordKind>,
    pub change_status: Option<ChangeStatus>,
    pub status: Option<RunStatus>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_change_status(mut self, change_status: ChangeStatus) -> Self {
        self.change_status = Some(change_status);
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a run satisfies every set criterion (limit excluded)
    pub fn matches(&self, run: &Run) -> bool {
        self.source.map_or(true, |s| s == run.source)
            && self.kind.map_or(true, |k| k == run.kind)
            && self.change_status.map_or(true, |c| c == run.change_status)
            && self.status.map_or(true, |s| s == run.status)
    }
}

/// Persists harvest runs and their errors
///
/// Implementations must be thread-safe (Send + Sync): workers append errors
/// concurrently while the orchestrator owns the run lifecycle.
pub trait RunLedger: Send + Sync {
    /// Start time, in whole seconds, of the latest finished run for the triple.
    /// Returns 0 when no such run exists.
    fn last_finished_run_timestamp(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<i64>;

    /// Create a run in the `Started` state
    fn create_run(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<Run>;

    /// Transition a started run to `Finished`
    fn finish_run(&self, id: &RunId) -> LedgerResult<Run>;

    /// Transition a started run to `Errored`, recording `message` as a run error
    fn error_run(&self, id: &RunId, message: &str) -> LedgerResult<Run>;

    /// Record an error against a run without changing its status
    fn append_error(&self, id: &RunId, message: &str) -> LedgerResult<()>;

    /// Number of errors recorded against a run
    fn error_count(&self, id: &RunId) -> LedgerResult<usize>;

    /// Errors recorded against a run, oldest first
    fn errors(&self, id: &RunId) -> LedgerResult<Vec<RunError>>;

    /// Load a run by ID
    fn get_run(&self, id: &RunId) -> LedgerResult<Option<Run>>;

    /// Runs matching the filter, newest first
    fn list_runs(&self, filter: &RunFilter) -> LedgerResult<Vec<Run>>;

    /// Delete finished runs without errors, keeping the newest `keep` per
    /// (source, kind, change-status). Returns the number of runs deleted.
    fn prune_finished(&self, keep: usize) -> LedgerResult<usize>;
}

/// Extension trait for opening ledgers from paths
pub trait OpenLedger: RunLedger + Sized {
    /// Open or create a ledger at the given path
    fn open(path: impl AsRef<Path>) -> LedgerResult<Self>;

    /// Create an in-memory ledger (useful for testing)
    fn open_in_memory() -> LedgerResult<Self>;
}
