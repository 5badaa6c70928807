//! Hugging Face text-generation-inference backend.
//!
//! Serves the base model with LoRA adapters loaded side by side; the adapter
//! is chosen per request through `adapter_id`.

use std::time::Duration;

use amica_common::config::GenerationConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{with_prompt, GenerationError, GenerationParams, Generator};

const BACKEND: &str = "tgi";

pub struct TgiGenerator {
    base_url: String,
    adapter: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TgiRequest<'a> {
    inputs: &'a str,
    parameters: TgiParameters<'a>,
}

#[derive(Debug, Serialize)]
struct TgiParameters<'a> {
    top_k: u32,
    top_p: f64,
    temperature: f64,
    repetition_penalty: f64,
    max_new_tokens: u32,
    do_sample: bool,
    return_full_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    adapter_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TgiResponse {
    generated_text: String,
}

impl TgiGenerator {
    pub fn new(base_url: &str, adapter: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            adapter,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            &config.base_url,
            config.adapter.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Generator for TgiGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let request = TgiRequest {
            inputs: prompt,
            parameters: TgiParameters {
                top_k: params.top_k,
                top_p: params.top_p,
                temperature: params.temperature,
                repetition_penalty: params.repetition_penalty,
                max_new_tokens: params.max_new_tokens,
                do_sample: true,
                return_full_text: true,
                adapter_id: self.adapter.as_deref(),
            },
        };

        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request {
                backend: BACKEND,
                message: e.to_string(),
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

        let result: TgiResponse = response.json().await.map_err(|e| GenerationError::Parse {
            backend: BACKEND,
            message: e.to_string(),
        })?;

        if result.generated_text.trim().is_empty() {
            return Err(GenerationError::Empty { backend: BACKEND });
        }

        Ok(with_prompt(prompt, result.generated_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_with_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_partial_json(json!({
                "inputs": "User: hi [/INST]",
                "parameters": {
                    "top_k": 50,
                    "max_new_tokens": 128,
                    "do_sample": true,
                    "return_full_text": true,
                    "adapter_id": "ai-friend-lora"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generated_text": "User: hi [/INST] Friend: hello"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gen = TgiGenerator::new(
            &server.uri(),
            Some("ai-friend-lora".into()),
            Duration::from_secs(5),
        );
        let out = gen
            .generate("User: hi [/INST]", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out, "User: hi [/INST] Friend: hello");
    }

    #[tokio::test]
    async fn test_continuation_only_output_gets_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"generated_text": " Friend: yo"})),
            )
            .mount(&server)
            .await;

        let gen = TgiGenerator::new(&server.uri(), None, Duration::from_secs(5));
        let out = gen
            .generate("User: hi [/INST]", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out, "User: hi [/INST] Friend: yo");
    }

    #[tokio::test]
    async fn test_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let gen = TgiGenerator::new(&server.uri(), None, Duration::from_secs(5));
        let err = gen
            .generate("x", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let gen = TgiGenerator::new(&server.uri(), None, Duration::from_secs(5));
        let err = gen
            .generate("x", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 503, .. }));
    }
}
