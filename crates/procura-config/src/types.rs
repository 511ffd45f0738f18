//! Configuration types.
//!
//! Every struct implements [`Default`] matching `defaults.toml`, so a bare
//! `[section]` header produces a working configuration. Conversion to
//! engine types happens in the binary.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where records, grants and the audit log live.
    pub storage: StorageSection,
    /// Audit signing and query defaults.
    pub audit: AuditSection,
    /// Access policy knobs.
    pub access: AccessSection,
    /// Log level, format and per-crate directives.
    pub logging: LoggingSection,
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// `"memory"` or `"surrealkv"`.
    pub backend: String,
    /// Data directory. Required for `surrealkv`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            path: None,
        }
    }
}

impl StorageSection {
    /// Whether data survives a restart.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.backend == "surrealkv"
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Ed25519 signing key file. Generated on first use when absent. With
    /// no path an ephemeral key is used, which makes signatures
    /// unverifiable after restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// Entries returned by a global listing with no explicit limit.
    pub recent_limit: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            key_path: None,
            recent_limit: 100,
        }
    }
}

/// Access policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSection {
    /// Status a business case starts in. Its creator keeps Write only
    /// while it stays in this status.
    pub draft_status: String,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            draft_status: "Draft".to_owned(),
        }
    }
}

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate directives, e.g. `["procura_access=debug"]`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
