//! Configuration validation.
//!
//! Catches settings that would make the bot misbehave at runtime (sampling
//! parameters out of range, persona thresholds in the wrong order, templates
//! that cannot wrap an utterance) before anything is started.

use thiserror::Error;

use crate::config::{
    Config, GenerationConfig, GenerationParams, ObservabilityConfig, PersonaConfig,
    TelegramConfig, TemplatesConfig,
};
use crate::util::placeholder_spans;

/// Backends the generation factory knows how to build.
pub const SUPPORTED_BACKENDS: &[&str] = &["ollama", "tgi"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration, collecting every failure.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 5] = [
            &self.observability,
            &self.generation,
            &self.persona,
            &self.templates,
            &self.telegram,
        ];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let levels = ["trace", "debug", "info", "warn", "error"];
        if !levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {}", levels.join(", ")),
            });
        }

        if self.log_format != "json" && self.log_format != "pretty" {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: "must be \"json\" or \"pretty\"".into(),
            });
        }

        Ok(())
    }
}

impl Validate for GenerationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !SUPPORTED_BACKENDS.contains(&self.backend.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "generation.backend".into(),
                reason: format!("must be one of {}", SUPPORTED_BACKENDS.join(", ")),
            });
        }

        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "generation.base_url".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "generation.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "generation.queue_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        self.params.validate()
    }
}

impl Validate for GenerationParams {
    fn validate(&self) -> ValidationResult<()> {
        let invalid = |field: &str, reason: &str| ValidationError::InvalidValue {
            field: format!("generation.params.{field}"),
            reason: reason.into(),
        };

        if self.top_k == 0 {
            return Err(invalid("top_k", "must be at least 1"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(invalid("top_p", "must be in (0, 1]"));
        }
        if self.temperature <= 0.0 {
            return Err(invalid("temperature", "must be greater than 0"));
        }
        if self.repetition_penalty < 1.0 {
            return Err(invalid("repetition_penalty", "must be at least 1.0"));
        }
        if self.max_new_tokens == 0 {
            return Err(invalid("max_new_tokens", "must be at least 1"));
        }
        if self.num_return_sequences != 1 {
            return Err(invalid("num_return_sequences", "only 1 is supported"));
        }

        Ok(())
    }
}

impl Validate for PersonaConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.familiar_after >= self.intimate_after {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "persona.familiar_after ({}) must be lower than persona.intimate_after ({})",
                    self.familiar_after, self.intimate_after
                ),
            });
        }

        let overrides = [
            ("initial", &self.preambles.initial),
            ("familiar", &self.preambles.familiar),
            ("intimate", &self.preambles.intimate),
        ];
        for (name, text) in overrides {
            if text.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(ValidationError::InvalidValue {
                    field: format!("persona.preambles.{name}"),
                    reason: "must not be blank".into(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for TemplatesConfig {
    fn validate(&self) -> ValidationResult<()> {
        for (field, template) in [
            ("templates.user_turn", &self.user_turn),
            ("templates.model_turn", &self.model_turn),
        ] {
            let count = placeholder_spans(template).len();
            if count != 1 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: format!("must contain exactly one {{placeholder}}, found {count}"),
                });
            }
        }

        Ok(())
    }
}

impl Validate for TelegramConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.enabled && self.bot_token.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingField {
                field: "telegram.bot_token (or BOT_TOKEN)".into(),
            });
        }

        Ok(())
    }
}
