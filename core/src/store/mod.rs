//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engines call store methods; they never execute SQL directly.

use crate::{error::PmsResult, event::EventLogEntry};
use rusqlite::{params, Connection};
use std::cell::Cell;

mod baseline;
mod cbs;
mod mapping;
mod performance;
mod plan;
mod roster;
mod task;

pub use cbs::NewValidation;

pub struct PmsStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    savepoint_depth: Cell<usize>,
}

impl PmsStore {
    pub fn open(path: &str) -> PmsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            savepoint_depth: Cell::new(0),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PmsResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            savepoint_depth: Cell::new(0),
        })
    }

    /// Path of the backing file, None for in-memory stores.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PmsResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_balances_and_mapping.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_plans.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_tasks_and_cbs.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_performance.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    /// Run `f` atomically. Backed by a SAVEPOINT, so calls nest: an inner
    /// failure rolls back only the inner work unless the outer closure
    /// propagates it.
    pub fn with_transaction<T, F>(&self, f: F) -> PmsResult<T>
    where
        F: FnOnce(&Self) -> PmsResult<T>,
    {
        let depth = self.savepoint_depth.get();
        let name = format!("pms_sp_{depth}");
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        self.savepoint_depth.set(depth + 1);
        let result = f(self);
        self.savepoint_depth.set(depth);

        match result {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name};"))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
                {
                    log::error!("rollback of {name} failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> PmsResult<i64> {
        self.conn.execute(
            "INSERT INTO event_log (actor_id, action, entity_type, entity_id, detail, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.actor_id,
                entry.action,
                entry.entity_type,
                entry.entity_id,
                entry.detail,
                entry.payload,
                entry.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> PmsResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_id, action, entity_type, entity_id, detail, payload, created_at
             FROM event_log WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![entity_type, entity_id], Self::map_event_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn recent_events(&self, limit: usize) -> PmsResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_id, action, entity_type, entity_id, detail, payload, created_at
             FROM event_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], Self::map_event_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, action: &str) -> PmsResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE action = ?1",
            params![action],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventLogEntry> {
        Ok(EventLogEntry {
            id: Some(row.get(0)?),
            actor_id: row.get(1)?,
            action: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            detail: row.get(5)?,
            payload: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// JSON column helper: rusqlite error so it composes inside row mappers.
fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
