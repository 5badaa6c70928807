//! Session storage backends.
//!
//! The manager only talks to [`SessionStore`]; the in-memory backend is the
//! default and SQLite keeps sessions across restarts.

pub mod memory;
pub mod sqlite;

use amica_common::Result;
use async_trait::async_trait;

use crate::session::Session;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

/// Identity-keyed session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn get(&self, identity: &str) -> Result<Option<Session>>;

    /// Insert or replace the session stored under `session.identity`.
    async fn put(&self, session: Session) -> Result<()>;

    /// Returns whether a session was removed.
    async fn remove(&self, identity: &str) -> Result<bool>;
}
