//! Configuration for the Quill runtime.
//!
//! Settings are layered with figment (defaults, config file, `QUILL_`
//! environment variables, programmatic overrides) and validated once after
//! extraction.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotSettings, DEFAULT_MESSAGE_AGE_LIMIT_SECS, LogFormat, LogLevel, LogOutput, LoggingConfig,
    QuillConfig, SpanEventConfig,
};
pub use validation::{validate_bot_settings, validate_config};
