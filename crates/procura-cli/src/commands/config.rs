//! CLI handlers for the `procura config` subcommand.

use anyhow::Result;
use procura_config::{Config, LoadOptions, ShowFormat};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(options: &LoadOptions, format: &str, section: Option<&str>) -> Result<()> {
    let resolved = Config::load(options)?;

    let show_format = match format {
        "json" => ShowFormat::Json,
        _ => ShowFormat::Toml,
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Validate the current configuration. Exits non-zero when invalid.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config(options: &LoadOptions) -> Result<()> {
    match Config::load(options) {
        Ok(resolved) => {
            println!("{}", Theme::success("Configuration is valid"));
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            Ok(())
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            std::process::exit(1);
        },
    }
}

/// Show the config files and variables that are consulted.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn show_paths(options: &LoadOptions) -> Result<()> {
    let mut paths = vec![std::path::PathBuf::from("/etc/procura/config.toml")];
    let user_dir = options.home_override.clone().or_else(|| {
        directories::BaseDirs::new().map(|d| d.home_dir().join(".procura"))
    });
    if let Some(dir) = user_dir {
        paths.push(dir.join("config.toml"));
    }
    if let Some(explicit) = &options.explicit {
        paths.push(explicit.clone());
    }

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in paths.iter().enumerate() {
        let status = if path.exists() { "found" } else { "not found" };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\nEnvironment overrides:");
    for (var, field) in procura_config::env::mappings() {
        println!("  {var:<28} -> {field}");
    }

    Ok(())
}
