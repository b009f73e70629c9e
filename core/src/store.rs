//! SQLite persistence layer for the run ledger.
//!
//! RULE: Only store.rs talks to the database.
//! Stages never touch it; the engine persists their events.

use crate::{
    error::AnalysisResult,
    event::EventLogEntry,
};
use rusqlite::{params, Connection, OptionalExtension};

pub struct AnalysisStore {
    conn: Connection,
}

/// A row of the `run` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id:     String,
    pub seed:       u64,
    pub pipeline:   String,
    pub version:    String,
    pub started_at: String,
}

impl AnalysisStore {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &str) -> AnalysisResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is ignored for :memory:.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalysisResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalysisResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        seed: u64,
        pipeline: &str,
        version: &str,
        started_at: &str,
    ) -> AnalysisResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, pipeline, version, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, seed as i64, pipeline, version, started_at],
        )?;
        Ok(())
    }

    pub fn run(&self, run_id: &str) -> AnalysisResult<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT run_id, seed, pipeline, version, started_at FROM run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        run_id:     row.get(0)?,
                        seed:       row.get::<_, i64>(1)? as u64,
                        pipeline:   row.get(2)?,
                        version:    row.get(3)?,
                        started_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> AnalysisResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, seq, stage, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.seq as i64,
                entry.stage,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    /// Every event of a run, in emission order.
    pub fn events_for_run(&self, run_id: &str) -> AnalysisResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC",
            params![run_id],
        )
    }

    pub fn events_of_type(&self, run_id: &str, event_type: &str) -> AnalysisResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1 AND event_type = ?2
             ORDER BY id ASC",
            params![run_id, event_type],
        )
    }

    pub fn event_count(&self, run_id: &str) -> AnalysisResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_events(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> AnalysisResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(args, |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    seq:        row.get::<_, i64>(2)? as u64,
                    stage:      row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
