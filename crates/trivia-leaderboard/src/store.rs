//! Leaderboard document stores.
//!
//! Records are JSON objects keyed by uid. `merge` overwrites the given
//! fields and keeps everything else; concurrent merges for one uid are
//! last-write-wins.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use trivia_core::{TriviaError, TriviaResult, Uid};

/// A stored leaderboard record.
pub type Document = Map<String, JsonValue>;

/// Backing store for leaderboard records.
pub trait LeaderboardStore: Send + Sync {
    /// Insert the record, or merge `fields` into the existing one.
    fn merge(&self, uid: &Uid, fields: Document) -> TriviaResult<()>;

    fn get(&self, uid: &Uid) -> TriviaResult<Option<Document>>;

    /// Highest scores first; ties go to the faster game.
    fn top(&self, limit: usize) -> TriviaResult<Vec<Document>>;

    fn count(&self) -> TriviaResult<usize>;
}

fn int_field(doc: &Document, key: &str) -> i64 {
    doc.get(key).and_then(JsonValue::as_i64).unwrap_or(0)
}

fn lock_poisoned<T>(_: T) -> TriviaError {
    TriviaError::storage("leaderboard lock poisoned")
}

/// In-memory store for tests and smoke runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<Uid, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaderboardStore for MemoryStore {
    fn merge(&self, uid: &Uid, fields: Document) -> TriviaResult<()> {
        let mut docs = self.docs.lock().map_err(lock_poisoned)?;
        docs.entry(uid.clone()).or_default().extend(fields);
        Ok(())
    }

    fn get(&self, uid: &Uid) -> TriviaResult<Option<Document>> {
        let docs = self.docs.lock().map_err(lock_poisoned)?;
        Ok(docs.get(uid).cloned())
    }

    fn top(&self, limit: usize) -> TriviaResult<Vec<Document>> {
        let docs = self.docs.lock().map_err(lock_poisoned)?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by(|a, b| {
            int_field(b, "score")
                .cmp(&int_field(a, "score"))
                .then_with(|| int_field(a, "time").cmp(&int_field(b, "time")))
        });
        all.truncate(limit);
        Ok(all)
    }

    fn count(&self) -> TriviaResult<usize> {
        Ok(self.docs.lock().map_err(lock_poisoned)?.len())
    }
}

/// SQLite-backed store. Documents are kept as JSON text, with the sort
/// columns copied out for `top`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> TriviaResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            TriviaError::storage(format!("Failed to open leaderboard database: {}", e))
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> TriviaResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> TriviaResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard (
                uid TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                score INTEGER NOT NULL DEFAULT 0,
                time INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_leaderboard_rank ON leaderboard(score DESC, time ASC);
            "#,
        )
        .map_err(|e| TriviaError::storage(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn storage_err(e: rusqlite::Error) -> TriviaError {
    TriviaError::storage(e.to_string())
}

fn parse_doc(text: &str) -> TriviaResult<Document> {
    Ok(serde_json::from_str(text)?)
}

impl LeaderboardStore for SqliteStore {
    fn merge(&self, uid: &Uid, fields: Document) -> TriviaResult<()> {
        let mut conn = self.conn.lock().map_err(lock_poisoned)?;
        let tx = conn.transaction().map_err(storage_err)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT doc FROM leaderboard WHERE uid = ?1",
                params![uid.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        let mut doc = match existing {
            Some(text) => parse_doc(&text)?,
            None => Document::new(),
        };
        doc.extend(fields);

        tx.execute(
            "INSERT INTO leaderboard (uid, doc, score, time, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(uid) DO UPDATE SET
                doc = excluded.doc,
                score = excluded.score,
                time = excluded.time,
                updated_at = excluded.updated_at",
            params![
                uid.as_str(),
                serde_json::to_string(&doc)?,
                int_field(&doc, "score"),
                int_field(&doc, "time"),
                int_field(&doc, "updatedAt"),
            ],
        )
        .map_err(storage_err)?;

        tx.commit().map_err(storage_err)?;
        debug!(uid = %uid, "Merged leaderboard record");
        Ok(())
    }

    fn get(&self, uid: &Uid) -> TriviaResult<Option<Document>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let text: Option<String> = conn
            .query_row(
                "SELECT doc FROM leaderboard WHERE uid = ?1",
                params![uid.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        text.as_deref().map(parse_doc).transpose()
    }

    fn top(&self, limit: usize) -> TriviaResult<Vec<Document>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn
            .prepare("SELECT doc FROM leaderboard ORDER BY score DESC, time ASC LIMIT ?1")
            .map_err(storage_err)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;

        let mut docs = Vec::new();
        for text in rows {
            docs.push(parse_doc(&text.map_err(storage_err)?)?);
        }
        Ok(docs)
    }

    fn count(&self) -> TriviaResult<usize> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM leaderboard", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}
