use amica_common::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::SessionStore;
use crate::session::Session;

/// Process-local session store. Sessions are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, identity: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(identity).map(|s| s.value().clone()))
    }

    async fn put(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.identity.clone(), session);
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<bool> {
        Ok(self.sessions.remove(identity).is_some())
    }
}
