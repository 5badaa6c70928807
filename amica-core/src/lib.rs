//! Amica Core - conversation sessions for a single-persona companion bot.
//!
//! - [`manager::SessionManager`]: `initialize`, `respond`, `reset`
//! - [`persona`]: persona stages, preambles and escalation thresholds
//! - [`template`]: turn templates and reply extraction
//! - [`generation`]: backend contract, HTTP backends, single-worker executor
//! - [`store`] / [`archive`]: session storage and reset archival

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod archive;
pub mod error;
pub mod generation;
pub mod manager;
pub mod persona;
pub mod session;
pub mod store;
pub mod template;
pub mod transcript;

pub use archive::{ArchiveRecord, JsonlArchive, TranscriptArchive};
pub use error::SessionError;
pub use generation::{GenerationError, GenerationHandle, GenerationParams, GenerationWorker, Generator};
pub use manager::SessionManager;
pub use persona::{Persona, PersonaThresholds, Preambles};
pub use session::{PersonaTransition, Session};
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore};
pub use template::{TurnTemplate, TurnTemplates};
pub use transcript::{Role, Transcript, Turn};
