//! SQLite audit log implementation.

use crate::{AuditEvent, Error, Result};
use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite-backed, append-only audit trail of issuance and consumption.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Open or create an audit log at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory audit log (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                capability_id TEXT,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_capability
                ON audit_events(capability_id, timestamp);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append an event to the log.
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO audit_events (id, timestamp, kind, capability_id, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                event.kind.name(),
                event.kind.capability_id(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load the most recent events, oldest first, optionally filtered by kind.
    pub fn recent(&self, kind: Option<&str>, limit: usize) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, data FROM (
                SELECT id, timestamp, data, rowid FROM audit_events
                WHERE ?1 IS NULL OR kind = ?1
                ORDER BY timestamp DESC, rowid DESC LIMIT ?2
             ) ORDER BY timestamp, rowid",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![kind, limit], read_row)?;
        rows.map(|row| decode(row?)).collect()
    }

    /// Load every event recorded for one capability, oldest first.
    pub fn for_capability(&self, capability_id: &str) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, data FROM audit_events
             WHERE capability_id = ?1 ORDER BY timestamp, rowid",
        )?;
        let rows = stmt.query_map([capability_id], read_row)?;
        rows.map(|row| decode(row?)).collect()
    }
}

type Row = (String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode((id, timestamp, data): Row) -> Result<AuditEvent> {
    let corrupt = |what: &str| Error::Corrupt {
        id: id.clone(),
        reason: format!("bad {what}"),
    };
    Ok(AuditEvent {
        id: id.parse().map_err(|_| corrupt("id"))?,
        timestamp: timestamp.parse().map_err(|_| corrupt("timestamp"))?,
        kind: serde_json::from_str(&data)?,
    })
}
