//! Write-once track document store.
//!
//! One SQLite table holds a JSON document per track, keyed by the track id
//! with an index on genre:
//!
//! ```sql
//! CREATE TABLE tracks (
//!     track_id       TEXT PRIMARY KEY,
//!     genre          TEXT NOT NULL,
//!     playlist_id    TEXT NOT NULL,
//!     metadata_json  TEXT NOT NULL,
//!     features_json  TEXT NOT NULL,
//!     embedding_json TEXT NOT NULL,
//!     fetched_at     TEXT NOT NULL
//! );
//! ```
//!
//! Inserts are `INSERT OR IGNORE`, so the first writer of an id wins and a
//! row is counted as new only when SQLite reports it changed.

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use rustc_hash::FxHashSet;
use std::path::Path;
use std::time::Duration;

use crate::accumulation::AccumulationMap;
use crate::models::{EmbeddingSlot, TrackMetadata};

/// SQLite host parameter limit is 32766; stay well under it for id lookups.
const LOOKUP_CHUNK: usize = 500;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Idempotent persistence used by the aggregator.
pub trait PersistenceGateway {
    /// Documents already tagged with `genre`.
    fn count_existing(&self, genre: &str) -> Result<usize>;

    /// Ids already tagged with `genre`.
    fn load_existing_ids(&self, genre: &str) -> Result<FxHashSet<String>>;

    /// Subset of `ids` stored under any genre.
    fn stored_ids(&self, ids: &[String]) -> Result<FxHashSet<String>>;

    /// Insert-if-absent every fresh entry of `map` in one transaction.
    /// Returns how many rows were genuinely new.
    fn commit(&mut self, genre: &str, map: &AccumulationMap) -> Result<usize>;
}

/// Per-genre document count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreCount {
    pub genre: String,
    pub documents: usize,
    pub missing_embeddings: usize,
}

pub struct SqliteTrackStore {
    conn: Connection,
}

impl SqliteTrackStore {
    /// Open (creating if needed) a store file. Safe to open once per worker.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open track store {:?}", path))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracks (
                track_id       TEXT PRIMARY KEY,
                genre          TEXT NOT NULL,
                playlist_id    TEXT NOT NULL,
                metadata_json  TEXT NOT NULL,
                features_json  TEXT NOT NULL,
                embedding_json TEXT NOT NULL,
                fetched_at     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tracks_genre ON tracks(genre);",
        )
        .context("Failed to create tracks schema")?;
        Ok(Self { conn })
    }

    /// Document counts per genre, largest first.
    pub fn genre_counts(&self) -> Result<Vec<GenreCount>> {
        let empty_embedding = serde_json::to_string(&EmbeddingSlot::default())?;
        let mut stmt = self.conn.prepare(
            "SELECT genre, COUNT(*), SUM(CASE WHEN embedding_json = ?1 THEN 1 ELSE 0 END)
             FROM tracks
             GROUP BY genre
             ORDER BY COUNT(*) DESC, genre",
        )?;
        let rows = stmt.query_map([empty_embedding], |row| {
            Ok(GenreCount {
                genre: row.get(0)?,
                documents: row.get::<_, i64>(1)? as usize,
                missing_embeddings: row.get::<_, i64>(2)? as usize,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    pub fn total_documents(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Ids stored more than once. Always empty while the primary key holds;
    /// checked by the report tool against stores copied or merged by hand.
    pub fn duplicate_ids(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, COUNT(*) FROM tracks GROUP BY track_id HAVING COUNT(*) > 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        let mut dupes = Vec::new();
        for row in rows {
            dupes.push(row?);
        }
        Ok(dupes)
    }

    /// Stored feature payload for a track, if present.
    pub fn features_of(&self, track_id: &str) -> Result<Option<serde_json::Value>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT features_json FROM tracks WHERE track_id = ?1")?;
        let mut rows = stmt.query([track_id])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Genre a track was first stored under.
    pub fn genre_of(&self, track_id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT genre FROM tracks WHERE track_id = ?1")?;
        let mut rows = stmt.query([track_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

impl PersistenceGateway for SqliteTrackStore {
    fn count_existing(&self, genre: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE genre = ?1",
            [genre],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn load_existing_ids(&self, genre: &str) -> Result<FxHashSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT track_id FROM tracks WHERE genre = ?1")?;
        let rows = stmt.query_map([genre], |row| row.get::<_, String>(0))?;
        let mut ids = FxHashSet::default();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }

    fn stored_ids(&self, ids: &[String]) -> Result<FxHashSet<String>> {
        let mut found = FxHashSet::default();
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT track_id FROM tracks WHERE track_id IN ({})",
                placeholders
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for id in rows {
                found.insert(id?);
            }
        }
        Ok(found)
    }

    fn commit(&mut self, genre: &str, map: &AccumulationMap) -> Result<usize> {
        let embedding_json = serde_json::to_string(&EmbeddingSlot::default())?;
        let fetched_at = chrono::Utc::now().to_rfc3339();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO tracks
                 (track_id, genre, playlist_id, metadata_json, features_json, embedding_json, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for entry in map.fresh_entries() {
                let metadata_json = serde_json::to_string(&TrackMetadata::from(&entry.track))?;
                let features_json = serde_json::to_string(&entry.features)?;
                inserted += stmt.execute(params![
                    entry.track.id,
                    genre,
                    entry.playlist_id,
                    metadata_json,
                    features_json,
                    embedding_json,
                    fetched_at,
                ])?;
            }
        }
        tx.commit().context("Failed to commit genre batch")?;
        Ok(inserted)
    }
}
