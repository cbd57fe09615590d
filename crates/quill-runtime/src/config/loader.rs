//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`quill.{profile}.toml`)
//! 3. Main config file (`quill.toml`, then `config.toml`)
//! 4. Environment variables (`QUILL_*`)
//! 5. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `QUILL_` prefix with `__` as separator:
//!
//! - `QUILL_BOT__USERNAME=notesbot` → `bot.username = "notesbot"`
//! - `QUILL_BOT__PREFETCH_KEYS=note,score` → `bot.prefetch_keys = ["note", "score"]`
//! - `QUILL_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./quill.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::QuillConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `QUILL_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("QUILL_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    /// Configuration profile.
    profile: Profile,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("quill")),
            None => self,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, on top of every other source.
    pub fn merge(mut self, config: QuillConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Sets a single value by dotted path, e.g. `("bot.username", "notesbot")`.
    pub fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<QuillConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: QuillConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            username = %config.bot.username,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(QuillConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with QUILL_ prefix");
            figment = figment.merge(Env::prefixed("QUILL_").ignore(&["PROFILE"]).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("quill"));
        }
        paths
    }

    /// Searches the search paths for `quill.toml` / `config.toml`.
    ///
    /// A profile-specific variant is merged before its base file. The first
    /// base file found ends the search.
    #[cfg(feature = "toml-config")]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for search_path in self.resolve_search_paths() {
            for stem in ["quill", "config"] {
                let profile_path = search_path.join(format!("{stem}.{}.toml", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = figment.merge(Toml::file(&profile_path));
                }

                let base_path = search_path.join(format!("{stem}.toml"));
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return figment.merge(Toml::file(&base_path));
                }
            }
        }

        warn!("No configuration file found, using defaults and environment");
        figment
    }

    #[cfg(not(feature = "toml-config"))]
    fn load_config_files(&self, figment: Figment) -> Figment {
        debug!(
            paths = self.resolve_search_paths().len(),
            "File configuration disabled, skipping search"
        );
        figment
    }
}

/// Loads the configuration from the default locations and the environment.
pub fn load_config() -> ConfigResult<QuillConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from a specific file and the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<QuillConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use figment::Jail;

    #[test]
    fn test_missing_username_is_rejected() {
        Jail::expect_with(|jail| {
            let err = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::Missing { ref key } if key == "bot.username"));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "quill.toml",
                r#"
                [bot]
                username = "notesbot"
                org_id = "org-from-file"
                prefetch_keys = ["note"]

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("QUILL_BOT__ORG_ID", "org-from-env");
            jail.set_env("QUILL_BOT__PREFETCH_KEYS", "note,score");
            jail.set_env("QUILL_BOT__MESSAGE_AGE_LIMIT", "30");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();

            assert_eq!(config.bot.username, "notesbot");
            assert_eq!(config.bot.org_id, "org-from-env");
            assert_eq!(config.bot.prefetch_keys, vec!["note", "score"]);
            assert_eq!(config.bot.message_age_limit, 30);
            assert_eq!(config.bot.db_channel, "QUILL_DB_CHANNEL");
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_non_integer_age_limit_is_a_parse_error() {
        Jail::expect_with(|jail| {
            jail.set_env("QUILL_BOT__USERNAME", "bot");
            jail.set_env("QUILL_BOT__ORG_ID", "org");
            jail.set_env("QUILL_BOT__MESSAGE_AGE_LIMIT", "two minutes");

            let err = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::Unreadable(_)));
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_and_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file("quill.toml", "[bot]\nusername = \"base\"\norg_id = \"org\"")?;
            jail.create_file("quill.production.toml", "[bot]\ndb_channel = \"PROD_DB\"")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .set("bot.username", "overridden")
                .load()
                .unwrap();

            assert_eq!(config.bot.db_channel, "PROD_DB");
            assert_eq!(config.bot.username, "overridden");
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let err = ConfigLoader::new()
            .file("/definitely/not/here/quill.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
