//! Per-user conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona::{Persona, PersonaThresholds};
use crate::transcript::{Transcript, Turn};

/// Conversation state for one end-user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub transcript: Transcript,
    /// Completed user/model exchanges since creation or the last reset.
    pub exchange_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persona change caused by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonaTransition {
    pub from: Persona,
    pub to: Persona,
}

impl Session {
    /// Fresh session: initial persona, no turns, count 0.
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            transcript: Transcript::new(Persona::Initial),
            exchange_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active_persona(&self) -> Persona {
        self.transcript.persona()
    }

    /// Append a completed exchange, bump the counter and escalate the
    /// persona if a threshold was crossed.
    pub fn record_exchange(
        &mut self,
        user_message: &str,
        reply: &str,
        thresholds: &PersonaThresholds,
    ) -> Option<PersonaTransition> {
        self.transcript.push(Turn::user(user_message));
        self.transcript.push(Turn::model(reply));
        self.exchange_count += 1;
        self.updated_at = Utc::now();

        let from = self.active_persona();
        let to = thresholds.escalate(from, self.exchange_count);
        self.transcript
            .set_persona(to)
            .then_some(PersonaTransition { from, to })
    }

    /// Back to the initial preamble with no turns. `created_at` is kept.
    pub fn reset(&mut self) {
        self.transcript = Transcript::new(Persona::Initial);
        self.exchange_count = 0;
        self.updated_at = Utc::now();
    }
}
