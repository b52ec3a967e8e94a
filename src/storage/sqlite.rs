//! SQLite storage
//!
//! Single connection behind a mutex. Snapshots are read inside one
//! transaction and verdict batches are written inside one transaction, so a
//! run never observes or leaves behind a half-applied state.

use crate::error::{StorageError, StorageResult};
use crate::storage::EligibilityStore;
use crate::types::{
    EligibilityRun, EligibilityVerdict, PopulationSnapshot, RunSummary, TestResult,
    ThresholdPolicy, Worker, WorkerAccuracyRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threshold_policy (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    threshold_type TEXT NOT NULL,
    value REAL,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workers (
    worker_id TEXT PRIMARY KEY,
    tester_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_results (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    worker_id TEXT NOT NULL REFERENCES workers(worker_id),
    test_id TEXT NOT NULL,
    score REAL NOT NULL,
    feedback TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_worker ON test_results(worker_id);

CREATE TABLE IF NOT EXISTS verdicts (
    worker_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    accuracy REAL,
    threshold REAL,
    run_id TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    run_trigger TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    summary_json TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at);
"#;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Eligibility storage initialized at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<ThresholdPolicy> {
    Ok(ThresholdPolicy {
        threshold_type: parse_enum(0, row.get(0)?)?,
        value: row.get(1)?,
        last_updated: parse_ts(2, row.get(2)?)?,
    })
}

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        worker_id: row.get(0)?,
        tester_name: row.get(1)?,
        created_at: parse_ts(2, row.get(2)?)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    Ok(TestResult {
        id: parse_uuid(0, row.get(0)?)?,
        worker_id: row.get(1)?,
        test_id: row.get(2)?,
        score: row.get(3)?,
        feedback: row.get(4)?,
        created_at: parse_ts(5, row.get(5)?)?,
    })
}

fn verdict_from_row(row: &Row<'_>) -> rusqlite::Result<EligibilityVerdict> {
    Ok(EligibilityVerdict {
        worker_id: row.get(0)?,
        is_eligible: parse_enum(1, row.get(1)?)?,
        accuracy: row.get(2)?,
        threshold: row.get(3)?,
        run_id: parse_uuid(4, row.get(4)?)?,
        computed_at: parse_ts(5, row.get(5)?)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<EligibilityRun> {
    let summary_json: Option<String> = row.get(5)?;
    let summary = match summary_json {
        Some(raw) => Some(serde_json::from_str::<RunSummary>(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
        })?),
        None => None,
    };
    let finished_at: Option<String> = row.get(4)?;

    Ok(EligibilityRun {
        id: parse_uuid(0, row.get(0)?)?,
        status: parse_enum(1, row.get(1)?)?,
        trigger: parse_enum(2, row.get(2)?)?,
        started_at: parse_ts(3, row.get(3)?)?,
        finished_at: finished_at.map(|raw| parse_ts(4, raw)).transpose()?,
        summary,
        error: row.get(6)?,
    })
}

fn insert_run(conn: &Connection, run: &EligibilityRun) -> StorageResult<()> {
    let summary_json = run
        .summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO runs (id, status, run_trigger, started_at, finished_at, summary_json, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.id.to_string(),
            run.status.as_str(),
            run.trigger.as_str(),
            ts(&run.started_at),
            run.finished_at.as_ref().map(ts),
            summary_json,
            run.error,
        ],
    )?;
    Ok(())
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl EligibilityStore for SqliteStore {
    fn load_policy(&self) -> StorageResult<Option<ThresholdPolicy>> {
        let conn = self.conn.lock();
        let policy = conn
            .query_row(
                "SELECT threshold_type, value, last_updated FROM threshold_policy WHERE id = 1",
                [],
                policy_from_row,
            )
            .optional()?;
        Ok(policy)
    }

    fn save_policy(&self, policy: &ThresholdPolicy) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO threshold_policy (id, threshold_type, value, last_updated)
             VALUES (1, ?1, ?2, ?3)",
            params![
                policy.threshold_type.as_str(),
                policy.value,
                ts(&policy.last_updated)
            ],
        )?;
        Ok(())
    }

    fn upsert_worker(&self, worker_id: &str, tester_name: &str) -> StorageResult<Worker> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workers (worker_id, tester_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(worker_id) DO UPDATE SET tester_name = excluded.tester_name",
            params![worker_id, tester_name, ts(&Utc::now())],
        )?;
        let worker = conn.query_row(
            "SELECT worker_id, tester_name, created_at FROM workers WHERE worker_id = ?1",
            params![worker_id],
            worker_from_row,
        )?;
        Ok(worker)
    }

    fn get_worker(&self, worker_id: &str) -> StorageResult<Option<Worker>> {
        let conn = self.conn.lock();
        let worker = conn
            .query_row(
                "SELECT worker_id, tester_name, created_at FROM workers WHERE worker_id = ?1",
                params![worker_id],
                worker_from_row,
            )
            .optional()?;
        Ok(worker)
    }

    fn list_workers(&self) -> StorageResult<Vec<Worker>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT worker_id, tester_name, created_at FROM workers ORDER BY worker_id ASC",
        )?;
        let workers = stmt
            .query_map([], worker_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workers)
    }

    fn record_test_result(
        &self,
        result: &TestResult,
        tester_name: Option<&str>,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = ts(&Utc::now());
        match tester_name {
            Some(name) => tx.execute(
                "INSERT INTO workers (worker_id, tester_name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(worker_id) DO UPDATE SET tester_name = excluded.tester_name",
                params![result.worker_id, name, now],
            )?,
            None => tx.execute(
                "INSERT INTO workers (worker_id, tester_name, created_at) VALUES (?1, ?1, ?2)
                 ON CONFLICT(worker_id) DO NOTHING",
                params![result.worker_id, now],
            )?,
        };
        tx.execute(
            "INSERT INTO test_results (id, worker_id, test_id, score, feedback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.id.to_string(),
                result.worker_id,
                result.test_id,
                result.score,
                result.feedback,
                ts(&result.created_at)
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn list_test_results(&self, worker_id: Option<&str>) -> StorageResult<Vec<TestResult>> {
        let conn = self.conn.lock();
        let results = match worker_id {
            Some(worker_id) => {
                let mut stmt = conn.prepare(
                    "SELECT id, worker_id, test_id, score, feedback, created_at
                     FROM test_results WHERE worker_id = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(params![worker_id], result_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, worker_id, test_id, score, feedback, created_at
                     FROM test_results ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map([], result_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(results)
    }

    fn load_snapshot(&self) -> StorageResult<PopulationSnapshot> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let policy = tx
            .query_row(
                "SELECT threshold_type, value, last_updated FROM threshold_policy WHERE id = 1",
                [],
                policy_from_row,
            )
            .optional()?
            .unwrap_or_default();

        let mut records: BTreeMap<String, WorkerAccuracyRecord> = BTreeMap::new();
        {
            let mut stmt = tx.prepare("SELECT worker_id, tester_name FROM workers")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (worker_id, tester_name) = row?;
                records.insert(
                    worker_id.clone(),
                    WorkerAccuracyRecord {
                        worker_id,
                        tester_name,
                        scores: Vec::new(),
                    },
                );
            }

            let mut stmt =
                tx.prepare("SELECT worker_id, score FROM test_results ORDER BY seq ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (worker_id, score) = row?;
                match records.get_mut(&worker_id) {
                    Some(record) => record.scores.push(score),
                    None => {
                        return Err(StorageError::InvalidData(format!(
                            "test result references unknown worker {}",
                            worker_id
                        )))
                    }
                }
            }
        }

        tx.commit()?;
        debug!("Loaded snapshot of {} workers", records.len());

        Ok(PopulationSnapshot {
            policy,
            workers: records.into_values().collect(),
        })
    }

    fn commit_run(
        &self,
        run: &EligibilityRun,
        verdicts: &[EligibilityVerdict],
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM verdicts", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO verdicts (worker_id, status, accuracy, threshold, run_id, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for verdict in verdicts {
                stmt.execute(params![
                    verdict.worker_id,
                    verdict.is_eligible.as_str(),
                    verdict.accuracy,
                    verdict.threshold,
                    verdict.run_id.to_string(),
                    ts(&verdict.computed_at)
                ])?;
            }
        }
        insert_run(&tx, run)?;

        tx.commit()?;
        Ok(())
    }

    fn record_failed_run(&self, run: &EligibilityRun) -> StorageResult<()> {
        let conn = self.conn.lock();
        insert_run(&conn, run)
    }

    fn latest_verdicts(&self) -> StorageResult<Vec<EligibilityVerdict>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT worker_id, status, accuracy, threshold, run_id, computed_at
             FROM verdicts ORDER BY worker_id ASC",
        )?;
        let verdicts = stmt
            .query_map([], verdict_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(verdicts)
    }

    fn latest_run(&self) -> StorageResult<Option<EligibilityRun>> {
        let conn = self.conn.lock();
        let run = conn
            .query_row(
                "SELECT id, status, run_trigger, started_at, finished_at, summary_json, error
                 FROM runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }
}
