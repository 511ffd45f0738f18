//! `PROCURA_*` environment overrides.
//!
//! Environment variables are the last layer: a set variable wins over
//! every file.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "PROCURA_STORAGE_BACKEND",
        field_path: "storage.backend",
    },
    EnvMapping {
        var_name: "PROCURA_STORAGE_PATH",
        field_path: "storage.path",
    },
    EnvMapping {
        var_name: "PROCURA_AUDIT_KEY_PATH",
        field_path: "audit.key_path",
    },
    EnvMapping {
        var_name: "PROCURA_AUDIT_RECENT_LIMIT",
        field_path: "audit.recent_limit",
    },
    EnvMapping {
        var_name: "PROCURA_DRAFT_STATUS",
        field_path: "access.draft_status",
    },
    EnvMapping {
        var_name: "PROCURA_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "PROCURA_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Recognised variables and the field each one sets.
pub fn mappings() -> impl Iterator<Item = (&'static str, &'static str)> {
    ENV_MAPPINGS.iter().map(|m| (m.var_name, m.field_path))
}

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("PROCURA_"))
        .collect()
}

/// Apply every mapped variable present in `env_vars`. Returns how many
/// were applied.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var override"
            );
            set_field(merged, mapping.field_path, coerce(mapping.field_path, val));
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }
    count
}

/// Integer fields are parsed; anything unparsable stays a string and fails
/// deserialization with the field named.
fn coerce(path: &str, val: &str) -> toml::Value {
    if path == "audit.recent_limit"
        && let Ok(i) = val.parse::<i64>()
    {
        return toml::Value::Integer(i);
    }
    toml::Value::String(val.to_owned())
}

fn set_field(root: &mut toml::Value, path: &str, val: toml::Value) {
    let Some((section, leaf)) = path.split_once('.') else {
        return;
    };
    let Some(table) = root.as_table_mut() else {
        return;
    };
    let section = table
        .entry(section.to_owned())
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    if let Some(section) = section.as_table_mut() {
        section.insert(leaf.to_owned(), val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_file_value() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);
        let env = HashMap::from([("PROCURA_LOG_LEVEL".to_owned(), "debug".to_owned())]);

        assert_eq!(apply_env_overrides(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(sources.get("logging.level"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn test_integer_coercion_and_missing_section() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = HashMap::from([
            ("PROCURA_AUDIT_RECENT_LIMIT".to_owned(), "25".to_owned()),
            ("UNRELATED".to_owned(), "x".to_owned()),
        ]);
        assert_eq!(apply_env_overrides(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["audit"]["recent_limit"].as_integer(), Some(25));
    }
}
