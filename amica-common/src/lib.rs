//! Amica Common - Shared configuration, logging and error types.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small string helpers used by the core and the channels

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, GenerationConfig, GenerationParams, ObservabilityConfig, PersonaConfig,
    PreambleOverrides, StorageConfig, TelegramConfig, TemplatesConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};
