//! Deep merge of TOML trees with per-field source tracking.
//!
//! Merging raw [`toml::Value`] trees instead of deserialized structs keeps
//! "absent" distinct from "default": a key missing from an overlay never
//! overrides the layer beneath it.

use std::collections::HashMap;

/// Which layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in `defaults.toml`.
    Defaults,
    /// `/etc/procura/config.toml`.
    System,
    /// `~/.procura/config.toml`.
    User,
    /// A file named on the command line.
    Explicit(String),
    /// A `PROCURA_*` environment variable.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::System => write!(f, "system (/etc/procura/config.toml)"),
            Self::User => write!(f, "user (~/.procura/config.toml)"),
            Self::Explicit(path) => write!(f, "file ({path})"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Dotted field path to the layer that set it.
pub type FieldSources = HashMap<String, ConfigLayer>;

/// Recursively merge `overlay` into `base`.
///
/// Tables merge per key. Scalars and arrays from the overlay replace the
/// base value.
pub fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

/// [`deep_merge`], recording `layer` as the source of every leaf the
/// overlay sets.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Record every leaf under `val` as set by `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_absent_keys_do_not_override() {
        let mut base = parse("[storage]\nbackend = \"memory\"\npath = \"/a\"");
        deep_merge(&mut base, &parse("[storage]\nbackend = \"surrealkv\""));
        assert_eq!(base["storage"]["backend"].as_str(), Some("surrealkv"));
        assert_eq!(base["storage"]["path"].as_str(), Some("/a"));
    }

    #[test]
    fn test_arrays_replace() {
        let mut base = parse("[logging]\ndirectives = [\"a=debug\", \"b=warn\"]");
        deep_merge(&mut base, &parse("[logging]\ndirectives = [\"c=trace\"]"));
        let directives = base["logging"]["directives"].as_array().unwrap();
        assert_eq!(directives.len(), 1);
    }

    #[test]
    fn test_tracking_records_layer() {
        let mut base = parse("[audit]\nrecent_limit = 100");
        let mut sources = FieldSources::new();
        record_leaves(&base, "", &ConfigLayer::Defaults, &mut sources);
        deep_merge_tracking(
            &mut base,
            &parse("[audit]\nrecent_limit = 20\nkey_path = \"/k\""),
            "",
            &ConfigLayer::User,
            &mut sources,
        );
        assert_eq!(sources.get("audit.recent_limit"), Some(&ConfigLayer::User));
        assert_eq!(sources.get("audit.key_path"), Some(&ConfigLayer::User));
    }
}
