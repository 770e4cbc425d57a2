//! SQLite run ledger

use super::traits::{LedgerError, LedgerResult, OpenLedger, RunFilter, RunLedger};
use crate::model::{ChangeStatus, RecordKind, Run, RunError, RunId, RunStatus, Source};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Columns selected for every run query, including the derived error count
const RUN_COLUMNS: &str = "r.id, r.source, r.record_kind, r.change_status, r.status, \
     r.start_time, r.end_time, \
     (SELECT COUNT(*) FROM run_errors e WHERE e.run_id = r.id)";

/// Raw column values of one run row
type RunRow = (String, String, String, String, String, String, Option<String>, i64);

/// SQLite-backed run ledger
///
/// Uses two tables, `runs` and `run_errors`. Thread-safe via an internal
/// mutex on the connection.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> LedgerResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                record_kind TEXT NOT NULL,
                change_status TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                start_ts INTEGER NOT NULL,
                end_time TEXT
            );

            -- Watermark lookups and filtered listings
            CREATE INDEX IF NOT EXISTS idx_runs_triple
                ON runs(source, record_kind, change_status, status, start_time);

            CREATE TABLE IF NOT EXISTS run_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_run_errors_run
                ON run_errors(run_id);

            PRAGMA foreign_keys = ON;

            -- Concurrent readers while a harvest is writing
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    /// Fixed-width RFC 3339 so that text ordering matches time ordering
    fn format_time(time: DateTime<Utc>) -> String {
        time.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_time(value: &str) -> LedgerResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| LedgerError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
    }

    fn parse_column<T: std::str::FromStr>(value: &str) -> LedgerResult<T>
    where
        T::Err: std::fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| LedgerError::Corrupt(e.to_string()))
    }

    fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    /// Deserialize a run from database columns
    fn row_to_run(row: RunRow) -> LedgerResult<Run> {
        let (id, source, kind, change_status, status, start_time, end_time, error_count) = row;
        Ok(Run {
            id: RunId::from_string(id),
            source: Self::parse_column(&source)?,
            kind: Self::parse_column(&kind)?,
            change_status: Self::parse_column(&change_status)?,
            status: Self::parse_column(&status)?,
            start_time: Self::parse_time(&start_time)?,
            end_time: end_time.as_deref().map(Self::parse_time).transpose()?,
            error_count: error_count.max(0) as usize,
        })
    }

    fn load_run(conn: &Connection, id: &RunId) -> LedgerResult<Option<Run>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM runs r WHERE r.id = ?1", RUN_COLUMNS),
                params![id.as_str()],
                Self::read_run_row,
            )
            .optional()?;

        row.map(Self::row_to_run).transpose()
    }

    fn run_exists(conn: &Connection, id: &RunId) -> LedgerResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM runs WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Move a started run to a closed status, optionally recording an error
    /// in the same transaction.
    fn close_run(&self, id: &RunId, status: RunStatus, message: Option<&str>) -> LedgerResult<Run> {
        let mut conn = self.conn.lock().unwrap();
        let now = Self::format_time(Utc::now());

        {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE runs SET status = ?1, end_time = ?2 WHERE id = ?3 AND status = 'started'",
                params![status.as_str(), now, id.as_str()],
            )?;

            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM runs WHERE id = ?1",
                        params![id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match current {
                    None => LedgerError::RunNotFound(id.clone()),
                    Some(current) => LedgerError::InvalidTransition {
                        id: id.clone(),
                        status: Self::parse_column(&current)?,
                    },
                });
            }

            if let Some(message) = message {
                tx.execute(
                    "INSERT INTO run_errors (run_id, message, created_at) VALUES (?1, ?2, ?3)",
                    params![id.as_str(), message, now],
                )?;
            }

            tx.commit()?;
        }

        Self::load_run(&conn, id)?.ok_or_else(|| LedgerError::RunNotFound(id.clone()))
    }
}

impl OpenLedger for SqliteLedger {
    fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RunLedger for SqliteLedger {
    fn last_finished_run_timestamp(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<i64> {
        let conn = self.conn.lock().unwrap();
        let ts: Option<i64> = conn
            .query_row(
                "SELECT start_ts FROM runs
                 WHERE source = ?1 AND record_kind = ?2 AND change_status = ?3 AND status = 'finished'
                 ORDER BY start_time DESC, rowid DESC
                 LIMIT 1",
                params![source.as_str(), kind.as_str(), change_status.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ts.unwrap_or(0))
    }

    fn create_run(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> LedgerResult<Run> {
        let run = Run::start(source, kind, change_status);
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO runs (id, source, record_kind, change_status, status, start_time, start_ts, end_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
            "#,
            params![
                run.id.as_str(),
                source.as_str(),
                kind.as_str(),
                change_status.as_str(),
                run.status.as_str(),
                Self::format_time(run.start_time),
                run.start_time.timestamp(),
            ],
        )?;

        Self::load_run(&conn, &run.id)?.ok_or_else(|| LedgerError::RunNotFound(run.id.clone()))
    }

    fn finish_run(&self, id: &RunId) -> LedgerResult<Run> {
        self.close_run(id, RunStatus::Finished, None)
    }

    fn error_run(&self, id: &RunId, message: &str) -> LedgerResult<Run> {
        self.close_run(id, RunStatus::Errored, Some(message))
    }

    fn append_error(&self, id: &RunId, message: &str) -> LedgerResult<()> {
        let conn = self.conn.lock().unwrap();
        if !Self::run_exists(&conn, id)? {
            return Err(LedgerError::RunNotFound(id.clone()));
        }

        conn.execute(
            "INSERT INTO run_errors (run_id, message, created_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), message, Self::format_time(Utc::now())],
        )?;

        Ok(())
    }

    fn error_count(&self, id: &RunId) -> LedgerResult<usize> {
        let conn = self.conn.lock().unwrap();
        if !Self::run_exists(&conn, id)? {
            return Err(LedgerError::RunNotFound(id.clone()));
        }

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM run_errors WHERE run_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count.max(0) as usize)
    }

    fn errors(&self, id: &RunId) -> LedgerResult<Vec<RunError>> {
        let conn = self.conn.lock().unwrap();
        if !Self::run_exists(&conn, id)? {
            return Err(LedgerError::RunNotFound(id.clone()));
        }

        let mut stmt = conn.prepare(
            "SELECT message, created_at FROM run_errors WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut errors = Vec::new();
        for row in rows {
            let (message, created_at) = row?;
            errors.push(RunError {
                run_id: id.clone(),
                message,
                created_at: Self::parse_time(&created_at)?,
            });
        }

        Ok(errors)
    }

    fn get_run(&self, id: &RunId) -> LedgerResult<Option<Run>> {
        let conn = self.conn.lock().unwrap();
        Self::load_run(&conn, id)
    }

    fn list_runs(&self, filter: &RunFilter) -> LedgerResult<Vec<Run>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {} FROM runs r WHERE 1 = 1", RUN_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(source) = filter.source {
            sql.push_str(" AND r.source = ?");
            params_vec.push(Box::new(source.as_str()));
        }

        if let Some(kind) = filter.kind {
            sql.push_str(" AND r.record_kind = ?");
            params_vec.push(Box::new(kind.as_str()));
        }

        if let Some(change_status) = filter.change_status {
            sql.push_str(" AND r.change_status = ?");
            params_vec.push(Box::new(change_status.as_str()));
        }

        if let Some(status) = filter.status {
            sql.push_str(" AND r.status = ?");
            params_vec.push(Box::new(status.as_str()));
        }

        sql.push_str(" ORDER BY r.start_time DESC, r.rowid DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), Self::read_run_row)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(Self::row_to_run(row?)?);
        }

        Ok(runs)
    }

    fn prune_finished(&self, keep: usize) -> LedgerResult<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            r#"
            DELETE FROM runs WHERE id IN (
                SELECT id FROM (
                    SELECT r.id AS id,
                           ROW_NUMBER() OVER (
                               PARTITION BY r.source, r.record_kind, r.change_status
                               ORDER BY r.start_time DESC, r.rowid DESC
                           ) AS position
                    FROM runs r
                    WHERE r.status = 'finished'
                      AND NOT EXISTS (SELECT 1 FROM run_errors e WHERE e.run_id = r.id)
                )
                WHERE position > ?1
            )
            "#,
            params![keep as i64],
        )?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ledger() -> SqliteLedger {
        SqliteLedger::open_in_memory().unwrap()
    }

    fn start_resource_run(ledger: &SqliteLedger) -> Run {
        ledger
            .create_run(Source::Catalog, RecordKind::Resource, ChangeStatus::Updated)
            .unwrap()
    }

    #[test]
    fn test_watermark_is_zero_without_finished_runs() {
        let ledger = create_test_ledger();
        let ts = ledger
            .last_finished_run_timestamp(Source::Catalog, RecordKind::Resource, ChangeStatus::Updated)
            .unwrap();
        assert_eq!(ts, 0);

        // A started run does not move the watermark
        start_resource_run(&ledger);
        let ts = ledger
            .last_finished_run_timestamp(Source::Catalog, RecordKind::Resource, ChangeStatus::Updated)
            .unwrap();
        assert_eq!(ts, 0);
    }

    #[test]
    fn test_watermark_is_start_of_finished_run() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);
        ledger.finish_run(&run.id).unwrap();

        let ts = ledger
            .last_finished_run_timestamp(Source::Catalog, RecordKind::Resource, ChangeStatus::Updated)
            .unwrap();
        assert_eq!(ts, run.start_time.timestamp());
    }

    #[test]
    fn test_watermark_is_scoped_to_the_triple() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);
        ledger.finish_run(&run.id).unwrap();

        for (source, kind, status) in [
            (Source::Catalog, RecordKind::Resource, ChangeStatus::Deleted),
            (Source::Catalog, RecordKind::Subject, ChangeStatus::Updated),
            (Source::Arrangement, RecordKind::Resource, ChangeStatus::Updated),
        ] {
            assert_eq!(ledger.last_finished_run_timestamp(source, kind, status).unwrap(), 0);
        }
    }

    #[test]
    fn test_errored_runs_do_not_move_watermark() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);
        ledger.error_run(&run.id, "upstream unreachable").unwrap();

        let ts = ledger
            .last_finished_run_timestamp(Source::Catalog, RecordKind::Resource, ChangeStatus::Updated)
            .unwrap();
        assert_eq!(ts, 0);
    }

    #[test]
    fn test_finish_sets_end_time_once() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);
        assert!(run.end_time.is_none());

        let finished = ledger.finish_run(&run.id).unwrap();
        assert_eq!(finished.status, RunStatus::Finished);
        assert!(finished.end_time.is_some());

        let err = ledger.finish_run(&run.id).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition { status: RunStatus::Finished, .. }
        ));

        let err = ledger.error_run(&run.id, "late failure").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        // The rejected transition recorded nothing
        assert_eq!(ledger.error_count(&run.id).unwrap(), 0);
        let reloaded = ledger.get_run(&run.id).unwrap().unwrap();
        assert_eq!(reloaded.end_time, finished.end_time);
    }

    #[test]
    fn test_error_run_records_one_error() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);

        let errored = ledger.error_run(&run.id, "enumeration failed").unwrap();
        assert_eq!(errored.status, RunStatus::Errored);
        assert!(errored.end_time.is_some());
        assert_eq!(errored.error_count, 1);

        let errors = ledger.errors(&run.id).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "enumeration failed");
    }

    #[test]
    fn test_append_error_keeps_order_and_status() {
        let ledger = create_test_ledger();
        let run = start_resource_run(&ledger);

        ledger.append_error(&run.id, "first").unwrap();
        ledger.append_error(&run.id, "second").unwrap();

        assert_eq!(ledger.error_count(&run.id).unwrap(), 2);
        let messages: Vec<_> = ledger
            .errors(&run.id)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);

        let reloaded = ledger.get_run(&run.id).unwrap().unwrap();
        assert_eq!(reloaded.status, RunStatus::Started);
        assert_eq!(reloaded.error_count, 2);
    }

    #[test]
    fn test_unknown_run_is_reported() {
        let ledger = create_test_ledger();
        let missing = RunId::from_string("missing");

        assert!(ledger.get_run(&missing).unwrap().is_none());
        assert!(matches!(
            ledger.append_error(&missing, "x").unwrap_err(),
            LedgerError::RunNotFound(_)
        ));
        assert!(matches!(
            ledger.finish_run(&missing).unwrap_err(),
            LedgerError::RunNotFound(_)
        ));
        assert!(matches!(
            ledger.error_count(&missing).unwrap_err(),
            LedgerError::RunNotFound(_)
        ));
    }

    #[test]
    fn test_list_runs_filters_and_orders_newest_first() {
        let ledger = create_test_ledger();
        let first = start_resource_run(&ledger);
        let second = start_resource_run(&ledger);
        ledger
            .create_run(Source::Catalog, RecordKind::Subject, ChangeStatus::Updated)
            .unwrap();

        let runs = ledger
            .list_runs(&RunFilter::new().with_kind(RecordKind::Resource))
            .unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);

        let all = ledger.list_runs(&RunFilter::new()).unwrap();
        assert_eq!(all.len(), 3);

        let limited = ledger.list_runs(&RunFilter::new().with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);

        ledger.finish_run(&first.id).unwrap();
        let finished = ledger
            .list_runs(&RunFilter::new().with_status(RunStatus::Finished))
            .unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, first.id);
    }

    #[test]
    fn test_prune_keeps_newest_and_errored_runs() {
        let ledger = create_test_ledger();
        let mut finished = Vec::new();
        for _ in 0..3 {
            let run = start_resource_run(&ledger);
            ledger.finish_run(&run.id).unwrap();
            finished.push(run.id);
        }
        let with_errors = start_resource_run(&ledger);
        ledger.append_error(&with_errors.id, "item failed").unwrap();
        ledger.finish_run(&with_errors.id).unwrap();
        let open = start_resource_run(&ledger);

        let deleted = ledger.prune_finished(1).unwrap();
        assert_eq!(deleted, 2);

        assert!(ledger.get_run(&finished[2]).unwrap().is_some());
        assert!(ledger.get_run(&finished[0]).unwrap().is_none());
        assert!(ledger.get_run(&finished[1]).unwrap().is_none());
        assert!(ledger.get_run(&with_errors.id).unwrap().is_some());
        assert!(ledger.get_run(&open.id).unwrap().is_some());
    }

    #[test]
    fn test_runs_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ledger.db");

        let run_id = {
            let ledger = SqliteLedger::open(&db_path).unwrap();
            let run = start_resource_run(&ledger);
            ledger.append_error(&run.id, "kept").unwrap();
            ledger.finish_run(&run.id).unwrap();
            run.id
        };

        let ledger = SqliteLedger::open(&db_path).unwrap();
        let run = ledger.get_run(&run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(run.error_count, 1);
        assert!(run.elapsed().is_some());
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let ledger = SqliteLedger::open(&db_path).unwrap();

        let journal_mode: String = ledger
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }
}
