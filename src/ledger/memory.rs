//! In-process run ledger

use super::traits::{LedgerError, LedgerResult, RunFilter, RunLedger};
use crate::model::{ChangeStatus, RecordKind, Run, RunError, RunId, RunStatus, Source};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A run plus its errors and insertion sequence
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    run: Run,
    errors: Vec<RunError>,
}

/// Run ledger held entirely in memory
///
/// Nothing survives the process. Ordering ties between runs started in the
/// same instant are broken by insertion order, matching `SqliteLedger`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    runs: DashMap<RunId, Entry>,
    next_seq: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_run(&self, id: &RunId, status: RunStatus, message: Option<&str>) -> LedgerResult<Run> {
        let mut entry = self
            .runs
            .get_mut(id)
            .ok_or_else(|| LedgerError::RunNotFound(id.clone()))?;

        if entry.run.status.is_closed() {
            return Err(LedgerError::InvalidTransition {
                id: id.clone(),
                status: entry.run.status,
            });
        }

        if let Some(message) = message {
            entry.errors.push(RunError::new(id.clone(), message));
        }
        entry.run.status = status;
        entry.run.end_time = Some(Utc::now());
        entry.run.error_count = entry.errors.len();

        Ok(entry.run.clone())
    }

    /// Entries matching the filter, newest first
    fn sorted_entries(&self, filter: &RunFilter) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .runs
            .iter()
            .filter(|e| filter.matches(&e.run))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            b.run
                .start_time
                .cmp(&a.run.start_time)
                .then(b.seq.cmp(&a.seq))
        });
        entries
    }
}

impl RunLedger for MemoryLedger {
    fn last_finished_run_timestamp(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<i64> {
        let filter = RunFilter::new()
            .with_source(source)
            .with_kind(kind)
            .with_change_status(change_status)
            .with_status(RunStatus::Finished);

        Ok(self
            .sorted_entries(&filter)
            .first()
            .map(|e| e.run.start_time.timestamp())
            .unwrap_or(0))
    }

    fn create_run(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<Run> {
        let run = Run::start(source, kind, change_status);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.runs.insert(
            run.id.clone(),
            Entry {
                seq,
                run: run.clone(),
                errors: Vec::new(),
            },
        );
        Ok(run)
    }

    fn finish_run(&self, id: &RunId) -> LedgerResult<Run> {
        self.close_run(id, RunStatus::Finished, None)
    }

    fn error_run(&self, id: &RunId, message: &str) -> LedgerResult<Run> {
        self.close_run(id, RunStatus::Errored, Some(message))
    }

    fn append_error(&self, id: &RunId, message: &str) -> LedgerResult<()> {
        let mut entry = self
            .runs
            .get_mut(id)
            .ok_or_else(|| LedgerError::RunNotFound(id.clone()))?;
        entry.errors.push(RunError::new(id.clone(), message));
        entry.run.error_count = entry.errors.len();
        Ok(())
    }

    fn error_count(&self, id: &RunId) -> LedgerResult<usize> {
        self.runs
            .get(id)
            .map(|e| e.errors.len())
            .ok_or_else(|| LedgerError::RunNotFound(id.clone()))
    }

    fn errors(&self, id: &RunId) -> LedgerResult<Vec<RunError>> {
        self.runs
            .get(id)
            .map(|e| e.errors.clone())
            .ok_or_else(|| LedgerError::RunNotFound(id.clone()))
    }

    fn get_run(&self, id: &RunId) -> LedgerResult<Option<Run>> {
        Ok(self.runs.get(id).map(|e| e.run.clone()))
    }

    fn list_runs(&self, filter: &RunFilter) -> LedgerResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .sorted_entries(filter)
            .into_iter()
            .map(|e| e.run)
            .collect();
        if let Some(limit) = filter.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    fn prune_finished(&self, keep: usize) -> LedgerResult<usize> {
        let finished = self.sorted_entries(&RunFilter::new().with_status(RunStatus::Finished));

        let mut kept: std::collections::HashMap<(Source, RecordKind, ChangeStatus), usize> =
            std::collections::HashMap::new();
        let mut doomed = Vec::new();
        for entry in finished.iter().filter(|e| e.errors.is_empty()) {
            let seen = kept
                .entry((entry.run.source, entry.run.kind, entry.run.change_status))
                .or_insert(0);
            *seen += 1;
            if *seen > keep {
                doomed.push(entry.run.id.clone());
            }
        }

        for id in &doomed {
            self.runs.remove(id);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject_run(ledger: &MemoryLedger) -> Run {
        ledger
            .create_run(Source::Catalog, RecordKind::Subject, ChangeStatus::Deleted)
            .unwrap()
    }

    #[test]
    fn test_lifecycle_matches_sqlite_semantics() {
        let ledger = MemoryLedger::new();
        let run = subject_run(&ledger);
        assert_eq!(
            ledger
                .last_finished_run_timestamp(Source::Catalog, RecordKind::Subject, ChangeStatus::Deleted)
                .unwrap(),
            0
        );

        ledger.append_error(&run.id, "one").unwrap();
        let finished = ledger.finish_run(&run.id).unwrap();
        assert_eq!(finished.status, RunStatus::Finished);
        assert_eq!(finished.error_count, 1);
        assert!(finished.end_time.is_some());

        assert!(matches!(
            ledger.error_run(&run.id, "again").unwrap_err(),
            LedgerError::InvalidTransition { .. }
        ));
        assert_eq!(ledger.error_count(&run.id).unwrap(), 1);

        assert_eq!(
            ledger
                .last_finished_run_timestamp(Source::Catalog, RecordKind::Subject, ChangeStatus::Deleted)
                .unwrap(),
            run.start_time.timestamp()
        );
    }

    #[test]
    fn test_error_run_appends_message() {
        let ledger = MemoryLedger::new();
        let run = subject_run(&ledger);
        let errored = ledger.error_run(&run.id, "boom").unwrap();
        assert_eq!(errored.status, RunStatus::Errored);
        assert_eq!(ledger.errors(&run.id).unwrap()[0].message, "boom");
    }

    #[test]
    fn test_list_and_prune() {
        let ledger = MemoryLedger::new();
        let ids: Vec<RunId> = (0..3)
            .map(|_| {
                let run = subject_run(&ledger);
                ledger.finish_run(&run.id).unwrap();
                run.id
            })
            .collect();

        let listed = ledger.list_runs(&RunFilter::new().with_limit(2)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);

        assert_eq!(ledger.prune_finished(2).unwrap(), 1);
        assert!(ledger.get_run(&ids[0]).unwrap().is_none());
        assert!(ledger.get_run(&ids[2]).unwrap().is_some());
    }

    #[test]
    fn test_missing_run() {
        let ledger = MemoryLedger::new();
        let id = RunId::new();
        assert!(matches!(
            ledger.errors(&id).unwrap_err(),
            LedgerError::RunNotFound(_)
        ));
    }
}
