//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge `/etc/procura/config.toml`
//! 3. Merge `~/.procura/config.toml` (or `{home}/config.toml` when the home
//!    directory is overridden)
//! 4. Merge the explicit file, which must exist
//! 5. Apply `PROCURA_*` overrides
//! 6. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Options for [`load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// A file merged above the user layer. Missing is an error.
    pub explicit: Option<PathBuf>,
    /// Use this directory instead of `~/.procura`.
    pub home_override: Option<PathBuf>,
    /// Skip `/etc/procura/config.toml`.
    pub skip_system: bool,
}

/// Load the layered configuration, reading overrides from the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable, oversized or
/// malformed, or if the merged configuration fails validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    load_with_env(options, &collect_env_vars())
}

/// [`load`] with an explicit environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: ::std::hash::BuildHasher>(
    options: &LoadOptions,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    if !options.skip_system {
        let system_path = PathBuf::from("/etc/procura/config.toml");
        if let Some(overlay) = try_load_file(&system_path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::System, &mut field_sources);
            loaded_files.push(system_path.display().to_string());
            info!(path = %system_path.display(), "loaded system config");
        }
    }

    let user_path = match &options.home_override {
        Some(home) => home.join("config.toml"),
        None => home_directory()?.join(".procura").join("config.toml"),
    };
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::User, &mut field_sources);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    if let Some(path) = &options.explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        let layer = ConfigLayer::Explicit(path.display().to_string());
        deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_overrides(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment overrides");
    }

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a single file with no layering. Fields it omits take their
/// defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or
/// validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file, returning `None` if it does not exist.
///
/// One read, no separate existence check; the size limit is applied to
/// what was read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated(home: &Path) -> LoadOptions {
        LoadOptions {
            explicit: None,
            home_override: Some(home.to_path_buf()),
            skip_system: true,
        }
    }

    #[test]
    fn test_defaults_match_default_impl() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_layers_apply_in_order() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "[audit]\nrecent_limit = 20\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();
        let explicit = home.path().join("override.toml");
        std::fs::write(&explicit, "[logging]\nlevel = \"debug\"\n").unwrap();

        let mut options = isolated(home.path());
        options.explicit = Some(explicit);
        let env = HashMap::from([("PROCURA_DRAFT_STATUS".to_owned(), "Proposed".to_owned())]);
        let resolved = load_with_env(&options, &env).unwrap();

        assert_eq!(resolved.config.audit.recent_limit, 20);
        assert_eq!(resolved.config.logging.level, "debug");
        assert_eq!(resolved.config.access.draft_status, "Proposed");
        assert_eq!(resolved.config.storage.backend, "memory");
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(
            resolved.field_sources.get("audit.recent_limit"),
            Some(&ConfigLayer::User)
        );
        assert_eq!(
            resolved.field_sources.get("access.draft_status"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let mut options = isolated(home.path());
        options.explicit = Some(home.path().join("absent.toml"));
        let result = load_with_env(&options, &HashMap::<String, String>::new());
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_invalid_merged_value_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "[storage]\nbackend = \"surrealkv\"\n",
        )
        .unwrap();
        let result = load_with_env(&isolated(home.path()), &HashMap::<String, String>::new());
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "storage.path"
        ));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_load_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("procura.toml");
        std::fs::write(&file_path, "[access]\ndraft_status = \"Open\"\n").unwrap();
        let config = load_file(&file_path).unwrap();
        assert_eq!(config.access.draft_status, "Open");
        assert_eq!(config.audit.recent_limit, 100);
    }
}
