//! Archival sink for transcripts discarded by a reset.
//!
//! Each identity maps to `{base_dir}/{sanitized_identity}.jsonl`; every reset
//! appends one [`ArchiveRecord`] line.

use std::path::PathBuf;

use amica_common::util::sanitize_key;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::persona::Persona;
use crate::session::Session;
use crate::transcript::Transcript;

/// Snapshot of a session taken just before it was reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub identity: String,
    pub transcript: Transcript,
    pub exchange_count: u64,
    pub persona: Persona,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn from_session(session: &Session) -> Self {
        Self {
            identity: session.identity.clone(),
            transcript: session.transcript.clone(),
            exchange_count: session.exchange_count,
            persona: session.active_persona(),
            archived_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    async fn archive(&self, record: &ArchiveRecord) -> Result<()>;
}

/// JSON-lines archive, one file per identity.
pub struct JsonlArchive {
    base_dir: PathBuf,
}

impl JsonlArchive {
    /// Create the archive. Creates `base_dir` if it doesn't exist.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create archive directory: {}", base_dir.display())
        })?;
        Ok(Self { base_dir })
    }

    fn archive_path(&self, identity: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", sanitize_key(identity)))
    }

    /// All records archived for `identity`, oldest first.
    pub async fn records(&self, identity: &str) -> Result<Vec<ArchiveRecord>> {
        let path = self.archive_path(identity);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read archive file: {}", path.display()))?;

        let mut records = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ArchiveRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        line = line_num + 1,
                        error = %e,
                        path = %path.display(),
                        "Skipping malformed archive line"
                    );
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl TranscriptArchive for JsonlArchive {
    async fn archive(&self, record: &ArchiveRecord) -> Result<()> {
        let path = self.archive_path(&record.identity);
        let mut line = serde_json::to_string(record).context("Failed to serialize ArchiveRecord")?;
        line.push('\n');

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open archive file: {}", path.display()))?
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to archive file: {}", path.display()))?;

        Ok(())
    }
}
