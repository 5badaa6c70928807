//! Conversation session manager.
//!
//! Owns per-identity conversation state: builds each prompt from the stored
//! transcript, sends it through the generation worker, extracts the reply and
//! escalates the persona as exchanges accumulate. A session is only written
//! back once a reply has been extracted, so a failed exchange leaves it as it
//! was.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use amica_common::Config;
use anyhow::Context;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::archive::{ArchiveRecord, JsonlArchive, TranscriptArchive};
use crate::error::{Result, SessionError};
use crate::generation::{create_generator, GenerationHandle, GenerationParams, GenerationWorker};
use crate::persona::{PersonaThresholds, Preambles};
use crate::session::Session;
use crate::store::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::template::TurnTemplates;
use crate::transcript::Turn;

/// Entry point for conversations: one session per identity, calls for the
/// same identity run one at a time.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    generation: GenerationHandle,
    params: GenerationParams,
    templates: TurnTemplates,
    preambles: Preambles,
    thresholds: PersonaThresholds,
    archive: Option<Arc<dyn TranscriptArchive>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    /// Manager with default templates, preambles, thresholds and parameters.
    pub fn new(store: Arc<dyn SessionStore>, generation: GenerationHandle) -> Self {
        Self {
            store,
            generation,
            params: GenerationParams::default(),
            templates: TurnTemplates::default(),
            preambles: Preambles::default(),
            thresholds: PersonaThresholds::default(),
            archive: None,
            locks: DashMap::new(),
        }
    }

    /// Build everything from configuration and start the generation worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let generator = create_generator(&config.generation)?;
        let (generation, _worker) = GenerationWorker::spawn(
            generator,
            config.generation.queue_capacity,
            Duration::from_secs(config.generation.timeout_secs),
        );

        let store: Arc<dyn SessionStore> = match config.storage.sessions_db_path() {
            Some(path) => Arc::new(
                SqliteSessionStore::new(&path)
                    .with_context(|| format!("Failed to open session store: {}", path.display()))?,
            ),
            None => Arc::new(MemorySessionStore::new()),
        };

        let templates = TurnTemplates::from_config(&config.templates)?;

        let mut manager = Self::new(store, generation)
            .with_params(config.generation.params.clone())
            .with_templates(templates)
            .with_preambles(Preambles::from_overrides(&config.persona.preambles))
            .with_thresholds(PersonaThresholds::from(&config.persona));

        if let Some(dir) = config.storage.archive_dir_path() {
            manager = manager.with_archive(Arc::new(JsonlArchive::new(dir)?));
        }

        tracing::info!(
            backend = manager.generation.backend(),
            store = manager.store.name(),
            archive = manager.archive.is_some(),
            "Session manager ready"
        );

        Ok(manager)
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_templates(mut self, templates: TurnTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_preambles(mut self, preambles: Preambles) -> Self {
        self.preambles = preambles;
        self
    }

    pub fn with_thresholds(mut self, thresholds: PersonaThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn TranscriptArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn templates(&self) -> &TurnTemplates {
        &self.templates
    }

    pub fn preambles(&self) -> &Preambles {
        &self.preambles
    }

    /// Run `work` while holding the identity's lock. The lock entry is
    /// dropped again once no other call is holding or waiting on it.
    async fn locked<T>(&self, identity: &str, work: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(identity.to_string()).or_default().clone();
        let output = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.locks
            .remove_if(identity, |_, lock| Arc::strong_count(lock) == 1);
        output
    }

    async fn load(&self, identity: &str, operation: &'static str) -> Result<Option<Session>> {
        self.store
            .get(identity)
            .await
            .map_err(|e| SessionError::store(identity, operation, e))
    }

    async fn save(&self, session: Session, operation: &'static str) -> Result<()> {
        let identity = session.identity.clone();
        self.store
            .put(session)
            .await
            .map_err(|e| SessionError::store(&identity, operation, e))
    }

    /// Create a session if none exists. Returns whether one was created.
    pub async fn initialize(&self, identity: &str) -> Result<bool> {
        self.locked(identity, self.initialize_locked(identity)).await
    }

    async fn initialize_locked(&self, identity: &str) -> Result<bool> {
        if let Some(existing) = self.load(identity, "initialize").await? {
            tracing::debug!(
                identity,
                exchange_count = existing.exchange_count,
                persona = %existing.active_persona(),
                "Session already initialized"
            );
            return Ok(false);
        }

        self.save(Session::new(identity), "initialize").await?;
        tracing::info!(identity, operation = "initialize", "Session created");
        Ok(true)
    }

    /// Run one exchange and return the model's reply.
    pub async fn respond(&self, identity: &str, user_message: &str) -> Result<String> {
        self.locked(identity, self.respond_locked(identity, user_message))
            .await
    }

    async fn respond_locked(&self, identity: &str, user_message: &str) -> Result<String> {
        let mut session = self
            .load(identity, "respond")
            .await?
            .ok_or_else(|| SessionError::not_initialized(identity, "respond"))?;

        let mut pending = session.transcript.clone();
        pending.push(Turn::user(user_message));
        let prompt = pending.render(&self.templates, &self.preambles);

        let start = Instant::now();
        let generated = self
            .generation
            .generate(prompt, self.params.clone())
            .await
            .map_err(|e| {
                tracing::warn!(identity, operation = "respond", error = %e, "Generation failed");
                SessionError::generation(identity, e)
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let reply = self.templates.extract_reply(&generated).ok_or_else(|| {
            tracing::warn!(
                identity,
                operation = "respond",
                output_len = generated.len(),
                "No reply found in generated text"
            );
            SessionError::inference(identity, "no reply found in generated text")
        })?;

        let transition = session.record_exchange(user_message, &reply, &self.thresholds);
        let exchange_count = session.exchange_count;
        let persona = session.active_persona();
        self.save(session, "respond").await?;

        if let Some(t) = transition {
            tracing::info!(
                identity,
                exchange_count,
                from = %t.from,
                to = %t.to,
                "Persona escalated"
            );
        }
        tracing::info!(
            identity,
            operation = "respond",
            exchange_count,
            persona = %persona,
            latency_ms,
            "Exchange completed"
        );

        Ok(reply)
    }

    /// Archive the current transcript (if an archive is configured) and
    /// start the conversation over.
    pub async fn reset(&self, identity: &str) -> Result<()> {
        self.locked(identity, self.reset_locked(identity)).await
    }

    async fn reset_locked(&self, identity: &str) -> Result<()> {
        let mut session = self
            .load(identity, "reset")
            .await?
            .ok_or_else(|| SessionError::not_initialized(identity, "reset"))?;

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.archive(&ArchiveRecord::from_session(&session)).await {
                tracing::warn!(identity, operation = "reset", error = %e, "Failed to archive transcript");
            }
        }

        let previous_count = session.exchange_count;
        session.reset();
        self.save(session, "reset").await?;

        tracing::info!(
            identity,
            operation = "reset",
            previous_exchange_count = previous_count,
            "Session reset"
        );
        Ok(())
    }

    /// Snapshot of the stored session, if any.
    pub async fn session(&self, identity: &str) -> Result<Option<Session>> {
        self.load(identity, "session").await
    }
}
