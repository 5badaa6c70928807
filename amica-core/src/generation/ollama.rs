//! Ollama backend.
//!
//! Uses `/api/generate` in raw mode so the Llama-2 chat markup in the
//! transcript reaches the model untouched. A LoRA adapter is expected to be
//! baked into the served model tag (`ADAPTER` in the Modelfile).

use std::time::Duration;

use amica_common::config::GenerationConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{with_prompt, GenerationError, GenerationParams, Generator};

const BACKEND: &str = "ollama";

pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    top_k: u32,
    top_p: f64,
    temperature: f64,
    repeat_penalty: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        if config.adapter.is_some() {
            tracing::debug!(
                model = %config.model,
                "Ollama ignores generation.adapter; bake the adapter into the model tag"
            );
        }
        Self::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            raw: true,
            stream: false,
            options: OllamaOptions {
                top_k: params.top_k,
                top_p: params.top_p,
                temperature: params.temperature,
                repeat_penalty: params.repetition_penalty,
                num_predict: params.max_new_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request {
                backend: BACKEND,
                message: format!("{e}. Is Ollama running? (ollama serve)"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            });
        }

        let result: OllamaGenerateResponse =
            response.json().await.map_err(|e| GenerationError::Parse {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        if result.response.trim().is_empty() {
            return Err(GenerationError::Empty { backend: BACKEND });
        }

        Ok(with_prompt(prompt, result.response))
    }
}
