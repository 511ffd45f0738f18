//! Procura Config - Layered TOML configuration.
//!
//! This crate provides a single [`Config`] type loaded from, lowest
//! precedence first:
//!
//! 1. Embedded defaults (`defaults.toml`)
//! 2. System (`/etc/procura/config.toml`)
//! 3. User (`~/.procura/config.toml`)
//! 4. An explicit file passed by the caller
//! 5. `PROCURA_*` environment variables
//!
//! Layers are deep-merged as TOML trees, so a layer only changes the keys it
//! names. Files over 1 MiB are rejected. The crate has no dependencies on
//! other procura crates; the binary converts sections into engine types.
//!
//! # Example
//!
//! ```rust,no_run
//! use procura_config::{Config, LoadOptions};
//!
//! let resolved = Config::load(&LoadOptions::default()).unwrap();
//! println!("storage backend: {}", resolved.config.storage.backend);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Deep merge with source tracking.
pub mod merge;
/// Annotated display.
pub mod show;
/// Configuration structs.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadOptions;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load with the full layer chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the result fails
    /// validation.
    pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        loader::load(options)
    }

    /// Load one file with no layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
