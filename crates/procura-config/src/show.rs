//! Source-annotated display for `config show`.

use std::fmt::{self, Write as _};

use crate::merge::FieldSources;
use crate::types::Config;

/// A loaded configuration with the layer that set each field.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The merged configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Files that were merged, lowest precedence first.
    pub loaded_files: Vec<String>,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with a source comment on each value.
    Toml,
    /// JSON.
    Json,
}

impl ResolvedConfig {
    /// Render the configuration, optionally limited to one section.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or `section` does not exist.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(section),
            ShowFormat::Json => self.show_json(section),
        }
    }

    fn section_value(&self, name: &str) -> Result<toml::Value, fmt::Error> {
        let val = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        val.as_table()
            .and_then(|t| t.get(name))
            .cloned()
            .ok_or(fmt::Error)
    }

    fn show_toml(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let body = match section {
            Some(name) => toml::to_string_pretty(&self.section_value(name)?),
            None => toml::to_string_pretty(&self.config),
        }
        .map_err(|_| fmt::Error)?;

        let mut output = String::from("# Resolved Procura configuration\n");
        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (lowest precedence first):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        let mut current = section.unwrap_or("").to_owned();
        for line in body.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                header.clone_into(&mut current);
            }
            match self.annotate(trimmed, &current) {
                Some(layer) => writeln!(output, "{line}  # [{layer}]")?,
                None => writeln!(output, "{line}")?,
            }
        }
        Ok(output)
    }

    fn show_json(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        match section {
            Some(name) => serde_json::to_string_pretty(&self.section_value(name)?),
            None => serde_json::to_string_pretty(&self.config),
        }
        .map_err(|_| fmt::Error)
    }

    fn annotate(&self, trimmed: &str, section: &str) -> Option<String> {
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let key = trimmed.split('=').next()?.trim();
        let path = if section.is_empty() {
            key.to_owned()
        } else {
            format!("{section}.{key}")
        };
        self.field_sources.get(&path).map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    fn resolved() -> ResolvedConfig {
        let mut field_sources = FieldSources::new();
        field_sources.insert("logging.level".to_owned(), ConfigLayer::Environment);
        field_sources.insert("storage.backend".to_owned(), ConfigLayer::Defaults);
        ResolvedConfig {
            config: Config::default(),
            field_sources,
            loaded_files: vec!["/tmp/procura.toml".to_owned()],
        }
    }

    #[test]
    fn test_show_toml_annotates_sources() {
        let out = resolved().show(ShowFormat::Toml, None).unwrap();
        assert!(out.contains("/tmp/procura.toml"));
        assert!(out.contains("level = \"info\"  # [environment variable]"));
        assert!(out.contains("backend = \"memory\"  # [defaults]"));
    }

    #[test]
    fn test_show_json_section() {
        let out = resolved().show(ShowFormat::Json, Some("access")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["draft_status"], "Draft");
    }

    #[test]
    fn test_unknown_section() {
        assert!(resolved().show(ShowFormat::Toml, Some("nope")).is_err());
    }
}
