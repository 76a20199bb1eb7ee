//! SQLite Snapshot Archive.
//!
//! Keeps exported store snapshots on disk so a host can stop and resume a
//! simulation.  The stores themselves stay purely in-memory; the archive only
//! ever sees their serialised [`StoreSnapshot`](crate::snapshot::StoreSnapshot)
//! JSON.
//!
//! # Storage layout
//!
//! A single SQLite table `store_snapshots` is created (if it does not already
//! exist):
//!
//! | column   | type    | description                                  |
//! |----------|---------|----------------------------------------------|
//! | id       | TEXT    | UUID v4 primary key                          |
//! | kind     | TEXT    | `"episodic"` or `"semantic"`                 |
//! | tick     | INTEGER | simulation tick the snapshot was taken at    |
//! | taken_at | TEXT    | RFC-3339 timestamp (UTC)                     |
//! | payload  | TEXT    | snapshot JSON                                |
//!
//! # Example
//!
//! ```rust
//! use anima_memory::archive::{SnapshotArchive, SnapshotKind};
//! use anima_memory::episodic::{EpisodicConfig, EpisodicSnapshot, EpisodicStore};
//! use chrono::Utc;
//!
//! let archive = SnapshotArchive::open_in_memory().unwrap();
//! let mut store = EpisodicStore::new(EpisodicConfig::default()).unwrap();
//! store.form("first light", "dawn", &["wonder"], 0.7);
//!
//! archive.save(SnapshotKind::Episodic, 10, Utc::now(), &store.export()).unwrap();
//!
//! let restored: EpisodicSnapshot = archive.load_latest(SnapshotKind::Episodic).unwrap();
//! assert_eq!(restored.entries.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use anima_types::MemoryError;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the snapshot archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Snapshot JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No snapshot found: {0}")]
    NotFound(String),
    /// A stored snapshot decoded but could not be turned back into a store.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

// ─────────────────────────────────────────────────────────────────────────────
// SnapshotKind
// ─────────────────────────────────────────────────────────────────────────────

/// Which store a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Episodic,
    Semantic,
}

impl SnapshotKind {
    /// Value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Episodic => "episodic",
            SnapshotKind::Semantic => "semantic",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "episodic" => Some(SnapshotKind::Episodic),
            "semantic" => Some(SnapshotKind::Semantic),
            _ => None,
        }
    }
}

/// One archived snapshot, without its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub id: String,
    pub kind: SnapshotKind,
    /// Simulation tick the snapshot was taken at.
    pub tick: u64,
    /// RFC-3339 timestamp.
    pub taken_at: String,
    /// Payload size in bytes.
    pub size: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// SnapshotArchive
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed history of store snapshots.
pub struct SnapshotArchive {
    conn: Connection,
}

impl SnapshotArchive {
    /// Open (or create) an archive file at `path`.
    pub fn open(path: &str) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    /// Open a throwaway archive that lives only as long as the value.
    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        let conn = Connection::open_in_memory()?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS store_snapshots (
                id       TEXT NOT NULL PRIMARY KEY,
                kind     TEXT NOT NULL,
                tick     INTEGER NOT NULL,
                taken_at TEXT NOT NULL,
                payload  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS store_snapshots_kind_tick
                ON store_snapshots (kind, tick);",
        )?;
        Ok(())
    }

    /// Serialise `snapshot` and store it.  Returns the new row id.
    pub fn save<T: Serialize>(
        &self,
        kind: SnapshotKind,
        tick: u64,
        taken_at: DateTime<Utc>,
        snapshot: &T,
    ) -> Result<String, ArchiveError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO store_snapshots (id, kind, tick, taken_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, kind.as_str(), tick_to_sql(tick), taken_at.to_rfc3339(), payload],
        )?;
        Ok(id)
    }

    /// Raw JSON of the newest snapshot of `kind` (highest tick, then latest
    /// insert), if any.
    pub fn latest(&self, kind: SnapshotKind) -> Result<Option<String>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM store_snapshots WHERE kind = ?1
             ORDER BY tick DESC, rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
        rows.next().transpose().map_err(ArchiveError::Sqlite)
    }

    /// Decode the newest snapshot of `kind`.
    ///
    /// Returns [`ArchiveError::NotFound`] when the archive holds none.
    pub fn load_latest<T: DeserializeOwned>(&self, kind: SnapshotKind) -> Result<T, ArchiveError> {
        let payload = self
            .latest(kind)?
            .ok_or_else(|| ArchiveError::NotFound(kind.as_str().to_string()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Archived snapshots of `kind`, oldest tick first.
    pub fn list(&self, kind: SnapshotKind) -> Result<Vec<SnapshotInfo>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, tick, taken_at, length(payload) FROM store_snapshots
             WHERE kind = ?1 ORDER BY tick ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], row_to_info)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ArchiveError::Sqlite)
    }

    /// Delete all but the newest `keep` snapshots of `kind`.  Returns the
    /// number of rows removed.
    pub fn prune(&self, kind: SnapshotKind, keep: usize) -> Result<usize, ArchiveError> {
        let removed = self.conn.execute(
            "DELETE FROM store_snapshots WHERE kind = ?1 AND id NOT IN (
                SELECT id FROM store_snapshots WHERE kind = ?1
                ORDER BY tick DESC, rowid DESC LIMIT ?2
            )",
            params![kind.as_str(), i64::try_from(keep).unwrap_or(i64::MAX)],
        )?;
        Ok(removed)
    }
}

fn tick_to_sql(tick: u64) -> i64 {
    i64::try_from(tick).unwrap_or(i64::MAX)
}

fn row_to_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotInfo> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let tick: i64 = row.get(2)?;
    let taken_at: String = row.get(3)?;
    let size: i64 = row.get(4)?;
    let kind = SnapshotKind::from_str(&kind_str)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, kind_str, rusqlite::types::Type::Text))?;
    Ok(SnapshotInfo {
        id,
        kind,
        tick: u64::try_from(tick).unwrap_or(0),
        taken_at,
        size: usize::try_from(size).unwrap_or(0),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
