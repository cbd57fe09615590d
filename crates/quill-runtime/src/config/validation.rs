//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotSettings, LogOutput, LoggingConfig, QuillConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &QuillConfig) -> ConfigResult<()> {
    validate_bot_settings(&config.bot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the settings of one bot.
pub fn validate_bot_settings(bot: &BotSettings) -> ConfigResult<()> {
    if bot.username.is_empty() {
        return Err(ConfigError::missing("bot.username"));
    }

    if bot.username.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid("bot.username", "cannot contain whitespace"));
    }

    if bot.org_id.is_empty() {
        return Err(ConfigError::missing("bot.org_id"));
    }

    if bot.db_channel.trim().is_empty() {
        return Err(ConfigError::missing("bot.db_channel"));
    }

    if bot.message_age_limit == 0 {
        return Err(ConfigError::invalid("bot.message_age_limit", "must be greater than 0"));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::invalid(
            format!("logging.filters.{target}"),
            "a filter needs a target",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> QuillConfig {
        QuillConfig {
            bot: BotSettings::new("notesbot", "org-1"),
            ..QuillConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_required_fields() {
        let mut config = valid();
        config.bot.username.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Missing { ref key }) if key == "bot.username"
        ));

        let mut config = valid();
        config.bot.org_id.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Missing { ref key }) if key == "bot.org_id"
        ));

        let mut config = valid();
        config.bot.db_channel = "  ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Missing { ref key }) if key == "bot.db_channel"
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = valid();
        config.bot.username = "notes bot".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid { ref key, .. }) if key == "bot.username"
        ));

        let mut config = valid();
        config.bot.message_age_limit = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid { ref key, .. }) if key == "bot.message_age_limit"
        ));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("quill.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
