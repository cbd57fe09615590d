//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! username = "notesbot"
//! org_id = "0123abcd"
//! db_channel = "NOTES_DB"
//! prefetch_keys = ["note"]
//! message_age_limit = 120
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use quill_core::{DEFAULT_DB_CHANNEL, StoreSettings};

/// Default age limit for incoming messages, in seconds.
pub const DEFAULT_MESSAGE_AGE_LIMIT_SECS: u64 = 120;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Bot identity and store settings.
    #[serde(default)]
    pub bot: BotSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Settings of one bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Username, used for `@` mentions. Required.
    #[serde(default)]
    pub username: String,

    /// Org the bot works in and keeps its database channel in. Required.
    #[serde(default)]
    pub org_id: String,

    /// Name of the database channel.
    #[serde(default = "default_db_channel")]
    pub db_channel: String,

    /// Keys loaded into the store cache at startup.
    ///
    /// Accepts a list or a comma-separated string, so that
    /// `QUILL_BOT__PREFETCH_KEYS=note,score` works.
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub prefetch_keys: Vec<String>,

    /// Messages older than this many seconds never trigger a command.
    #[serde(default = "default_message_age_limit")]
    pub message_age_limit: u64,

    /// Cache the result of store lookups that missed the cache.
    #[serde(default)]
    pub cache_search_results: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            org_id: String::new(),
            db_channel: default_db_channel(),
            prefetch_keys: Vec::new(),
            message_age_limit: default_message_age_limit(),
            cache_search_results: false,
        }
    }
}

impl BotSettings {
    /// Creates settings with the required fields and defaults elsewhere.
    pub fn new(username: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            org_id: org_id.into(),
            ..Self::default()
        }
    }

    /// The age limit as a duration.
    pub fn message_age_limit(&self) -> Duration {
        Duration::from_secs(self.message_age_limit)
    }

    /// Channel store settings derived from these settings.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings::new(&self.org_id)
            .with_db_channel(&self.db_channel)
            .with_prefetch_keys(self.prefetch_keys.iter().cloned())
            .with_search_caching(self.cache_search_results)
    }
}

fn default_db_channel() -> String {
    DEFAULT_DB_CHANNEL.to_string()
}

fn default_message_age_limit() -> u64 {
    DEFAULT_MESSAGE_AGE_LIMIT_SECS
}

fn deserialize_key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeyList {
        List(Vec<String>),
        Joined(String),
    }

    let keys = match KeyList::deserialize(deserializer)? {
        KeyList::List(keys) => keys,
        KeyList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };

    Ok(keys
        .into_iter()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect())
}

// =============================================================================
// Logging
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `quill_core = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a tracing level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::{Format, Serialized, Toml};

    #[test]
    fn test_bot_defaults() {
        let settings = BotSettings::default();
        assert_eq!(settings.db_channel, "QUILL_DB_CHANNEL");
        assert_eq!(settings.message_age_limit(), Duration::from_secs(120));
        assert!(settings.prefetch_keys.is_empty());
        assert!(!settings.cache_search_results);
    }

    #[test]
    fn test_prefetch_keys_accept_list_or_joined_string() {
        let from_list: QuillConfig = Figment::new()
            .merge(Toml::string("[bot]\nprefetch_keys = [\"note\", \"score\"]"))
            .extract()
            .unwrap();
        assert_eq!(from_list.bot.prefetch_keys, vec!["note", "score"]);

        let from_string: QuillConfig = Figment::new()
            .merge(Toml::string("[bot]\nprefetch_keys = \"note, score,,\""))
            .extract()
            .unwrap();
        assert_eq!(from_string.bot.prefetch_keys, vec!["note", "score"]);
    }

    #[test]
    fn test_store_settings_mapping() {
        let mut settings = BotSettings::new("notesbot", "org-1");
        settings.db_channel = "NOTES_DB".into();
        settings.prefetch_keys = vec!["note".into()];
        settings.cache_search_results = true;

        let store = settings.store_settings();
        assert_eq!(store.org_id, "org-1");
        assert_eq!(store.db_channel, "NOTES_DB");
        assert_eq!(store.prefetch_keys, vec!["note"]);
        assert!(store.cache_search_results);
    }

    #[test]
    fn test_defaults_survive_serialized_round() {
        let config: QuillConfig = Figment::from(Serialized::defaults(QuillConfig::default()))
            .extract()
            .unwrap();
        assert_eq!(config.bot, BotSettings::default());
        assert_eq!(config.logging.level, LogLevel::Info);
    }
}
