//! Errors surfaced by the session manager.

use thiserror::Error;

use crate::generation::GenerationError;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// `respond` or `reset` before `initialize`.
    #[error("no session for {identity} ({operation}); send /start first")]
    NotInitialized {
        identity: String,
        operation: &'static str,
    },

    /// Generation failed or produced nothing usable. The session is unchanged.
    #[error("inference failed for {identity}: {reason}")]
    InferenceFailure { identity: String, reason: String },

    #[error("session store failed for {identity} ({operation}): {source}")]
    Store {
        identity: String,
        operation: &'static str,
        #[source]
        source: amica_common::Error,
    },
}

impl SessionError {
    pub(crate) fn not_initialized(identity: &str, operation: &'static str) -> Self {
        Self::NotInitialized {
            identity: identity.to_string(),
            operation,
        }
    }

    pub(crate) fn inference(identity: &str, reason: impl Into<String>) -> Self {
        Self::InferenceFailure {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn generation(identity: &str, err: GenerationError) -> Self {
        Self::inference(identity, err.to_string())
    }

    pub(crate) fn store(identity: &str, operation: &'static str, source: amica_common::Error) -> Self {
        Self::Store {
            identity: identity.to_string(),
            operation,
            source,
        }
    }

    /// Stable short code for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInitialized { .. } => "session_not_initialized",
            Self::InferenceFailure { .. } => "inference_failure",
            Self::Store { .. } => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_identity_and_operation() {
        let err = SessionError::not_initialized("7", "respond");
        assert_eq!(err.to_string(), "no session for 7 (respond); send /start first");
        assert_eq!(err.kind(), "session_not_initialized");

        let err = SessionError::store("7", "put", amica_common::Error::Storage("locked".into()));
        assert!(err.to_string().contains("(put)"));
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_generation_error_becomes_inference_failure() {
        let err = SessionError::generation("7", GenerationError::Timeout(std::time::Duration::from_secs(5)));
        assert!(matches!(err, SessionError::InferenceFailure { .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
