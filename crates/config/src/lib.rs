//! Configuration loading, validation and env substitution.
//!
//! Config files: `switchboard.toml`, `switchboard.yaml`, or `switchboard.json`
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution anywhere in the file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, discover_config,
        load_config, state_db_path,
    },
    schema::{
        AccessConfig, LogConfig, RateLimitSettings, StateBackend, StateConfig,
        SwitchboardConfig, TelegramConfig, UpdateMode, UpdatesConfig, WebhookConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
