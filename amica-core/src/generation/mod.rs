//! Text generation: the backend contract, HTTP backends and the
//! single-worker executor that serializes calls to them.

pub mod ollama;
pub mod tgi;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use amica_common::config::GenerationConfig;
use async_trait::async_trait;
use thiserror::Error;

pub use amica_common::config::GenerationParams;
pub use ollama::OllamaGenerator;
pub use tgi::TgiGenerator;
pub use worker::{GenerationHandle, GenerationWorker};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{backend} request failed: {message}")]
    Request {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("{backend} response could not be parsed: {message}")]
    Parse {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} returned no text")]
    Empty { backend: &'static str },

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation worker is not running")]
    WorkerUnavailable,

    #[error("unsupported generation backend: {0}")]
    UnsupportedBackend(String),
}

/// A language model behind some transport.
///
/// `generate` returns the prompt followed by the continuation. Backends that
/// only produce the continuation prepend the prompt themselves.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Build the backend selected by `config.backend`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, GenerationError> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::from_config(config))),
        "tgi" => Ok(Arc::new(TgiGenerator::from_config(config))),
        other => Err(GenerationError::UnsupportedBackend(other.to_string())),
    }
}

/// Prompt plus continuation, unless the backend already echoed the prompt.
pub(crate) fn with_prompt(prompt: &str, output: String) -> String {
    if output.starts_with(prompt) {
        output
    } else {
        let mut full = String::with_capacity(prompt.len() + output.len());
        full.push_str(prompt);
        full.push_str(&output);
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_generator_by_backend() {
        let mut config = GenerationConfig::default();
        assert_eq!(create_generator(&config).unwrap().name(), "ollama");

        config.backend = "tgi".into();
        assert_eq!(create_generator(&config).unwrap().name(), "tgi");

        config.backend = "gpt".into();
        assert!(matches!(
            create_generator(&config),
            Err(GenerationError::UnsupportedBackend(b)) if b == "gpt"
        ));
    }

    #[test]
    fn test_with_prompt() {
        assert_eq!(with_prompt("p:", " more".into()), "p: more");
        assert_eq!(with_prompt("p:", "p: already".into()), "p: already");
    }
}
