//! `SQLite`-backed session store.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::path::Path;
use std::sync::Mutex;

use amica_common::{Error, Result, ResultExt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::SessionStore;
use crate::session::Session;
use crate::transcript::Transcript;

/// One row per identity; the transcript is stored as JSON.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

fn storage(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

impl SqliteSessionStore {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("creating {}", parent.display()))?;
        }

        let conn = Connection::open(db_path).map_err(storage)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                identity        TEXT PRIMARY KEY,
                transcript      TEXT NOT NULL,
                exchange_count  INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );",
        )
        .map_err(storage)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {e}")))
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {value:?}: {e}")))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, identity: &str) -> Result<Option<Session>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT transcript, exchange_count, created_at, updated_at
                 FROM sessions WHERE identity = ?1",
                params![identity],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(storage)?
        };

        let Some((transcript, exchange_count, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let transcript: Transcript = serde_json::from_str(&transcript)
            .context(format!("decoding transcript of {identity}"))?;
        Ok(Some(Session {
            identity: identity.to_string(),
            transcript,
            exchange_count: exchange_count as u64,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        }))
    }

    async fn put(&self, session: Session) -> Result<()> {
        let transcript = serde_json::to_string(&session.transcript)
            .context(format!("encoding transcript of {}", session.identity))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (identity, transcript, exchange_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identity) DO UPDATE SET
                transcript = excluded.transcript,
                exchange_count = excluded.exchange_count,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                session.identity,
                transcript,
                session.exchange_count as i64,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM sessions WHERE identity = ?1", params![identity])
            .map_err(storage)?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{Persona, PersonaThresholds};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_through_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("sessions.db");

        let mut session = Session::new("1001");
        let thresholds = PersonaThresholds::new(0, 5);
        session.record_exchange("{user_message} hi", "hello", &thresholds);

        {
            let store = SqliteSessionStore::new(&path).unwrap();
            store.put(session.clone()).await.unwrap();
        }

        let store = SqliteSessionStore::new(&path).unwrap();
        let loaded = store.get("1001").await.unwrap().unwrap();
        assert_eq!(loaded.exchange_count, 1);
        assert_eq!(loaded.active_persona(), Persona::Familiar);
        assert_eq!(loaded.transcript, session.transcript);
        assert_eq!(loaded.created_at, session.created_at);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_remove() {
        let store = SqliteSessionStore::in_memory().unwrap();
        store.put(Session::new("a")).await.unwrap();

        let mut next = Session::new("a");
        next.exchange_count = 4;
        store.put(next).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().exchange_count, 4);

        assert!(store.remove("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert!(!store.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_transcript_names_identity() {
        let store = SqliteSessionStore::in_memory().unwrap();
        store.put(Session::new("1002")).await.unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE sessions SET transcript = 'not json' WHERE identity = '1002'",
                [],
            )
            .unwrap();

        let err = store.get("1002").await.unwrap_err();
        match err {
            Error::WithContext { context, source } => {
                assert_eq!(context, "decoding transcript of 1002");
                assert!(matches!(*source, Error::Json(_)));
            }
            other => panic!("expected context wrapper, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let store = SqliteSessionStore::in_memory().unwrap();
        assert!(store.get("nobody").await.unwrap().is_none());
    }
}
