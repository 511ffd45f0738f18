//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for `audit.recent_limit`.
const MAX_RECENT_LIMIT: usize = 10_000;

/// Validate a merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::ValidationError`] found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_storage(config)?;
    validate_audit(config)?;
    validate_access(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let s = &config.storage;
    match s.backend.as_str() {
        "memory" => Ok(()),
        "surrealkv" => match s.path.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(()),
            _ => Err(invalid(
                "storage.path",
                "the surrealkv backend needs a data directory",
            )),
        },
        other => Err(invalid(
            "storage.backend",
            format!("unsupported backend '{other}'; expected one of: memory, surrealkv"),
        )),
    }
}

fn validate_audit(config: &Config) -> ConfigResult<()> {
    let a = &config.audit;
    if a.recent_limit == 0 || a.recent_limit > MAX_RECENT_LIMIT {
        return Err(invalid(
            "audit.recent_limit",
            format!("recent_limit must be between 1 and {MAX_RECENT_LIMIT}"),
        ));
    }
    if a.key_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(invalid("audit.key_path", "key_path must not be empty"));
    }
    Ok(())
}

fn validate_access(config: &Config) -> ConfigResult<()> {
    if config.access.draft_status.trim().is_empty() {
        return Err(invalid("access.draft_status", "draft_status must not be empty"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "postgres".to_owned();
        assert_eq!(field_of(validate(&config)), "storage.backend");
    }

    #[test]
    fn test_surrealkv_needs_path() {
        let mut config = Config::default();
        config.storage.backend = "surrealkv".to_owned();
        assert_eq!(field_of(validate(&config)), "storage.path");

        config.storage.path = Some("/var/lib/procura".to_owned());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_recent_limit_bounds() {
        let mut config = Config::default();
        config.audit.recent_limit = 0;
        assert_eq!(field_of(validate(&config)), "audit.recent_limit");
        config.audit.recent_limit = 10_001;
        assert_eq!(field_of(validate(&config)), "audit.recent_limit");
    }

    #[test]
    fn test_blank_draft_status() {
        let mut config = Config::default();
        config.access.draft_status = "  ".to_owned();
        assert_eq!(field_of(validate(&config)), "access.draft_status");
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }
}
