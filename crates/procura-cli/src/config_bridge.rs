//! Bridge from `procura_config::Config` to engine types.
//!
//! The config crate knows nothing about the engine, so every conversion
//! from a config section to a runtime value lives here.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use procura_access::PolicyTable;
use procura_config::Config;
use procura_crypto::KeyPair;
use procura_pipeline::Engine;
use procura_storage::{KvStore, MemoryKvStore};
use procura_telemetry::{LogConfig, LogFormat};
use tracing::{debug, warn};

/// Default signing key location under the home directory.
const DEFAULT_KEY_FILE: &str = ".procura/keys/audit.key";

/// Convert the logging section to a [`LogConfig`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Convert the access section to a [`PolicyTable`].
pub(crate) fn to_policy(cfg: &Config) -> PolicyTable {
    PolicyTable::new(cfg.access.draft_status.trim())
}

/// Where the audit signing key lives.
pub(crate) fn key_path(cfg: &Config) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cfg.audit.key_path {
        return Ok(PathBuf::from(path));
    }
    let home = directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .context("could not determine home directory for the signing key")?;
    Ok(home.join(DEFAULT_KEY_FILE))
}

/// Open the configured store.
pub(crate) fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn KvStore>> {
    match cfg.storage.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory backend; nothing persists past this command");
            Ok(Arc::new(MemoryKvStore::new()))
        },
        "surrealkv" => open_persistent(cfg),
        other => bail!("unknown storage backend: {other}"),
    }
}

#[cfg(feature = "kv")]
fn open_persistent(cfg: &Config) -> anyhow::Result<Arc<dyn KvStore>> {
    let path = cfg
        .storage
        .path
        .as_deref()
        .context("storage.path is required for the surrealkv backend")?;
    let store = procura_storage::SurrealKvStore::open(path)
        .with_context(|| format!("failed to open store at {path}"))?;
    debug!(path, "Opened persistent store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "kv"))]
fn open_persistent(_cfg: &Config) -> anyhow::Result<Arc<dyn KvStore>> {
    bail!("this build has no persistent storage; rebuild with the `kv` feature")
}

/// Build an engine over the configured store and signing key.
pub(crate) fn build_engine(cfg: &Config) -> anyhow::Result<Engine> {
    let store = open_store(cfg)?;
    let key_path = key_path(cfg)?;
    let signer = KeyPair::load_or_generate(&key_path)
        .with_context(|| format!("failed to load signing key {}", key_path.display()))?;
    Ok(Engine::new(store, Arc::new(signer), to_policy(cfg)).with_recent_limit(cfg.audit.recent_limit))
}
