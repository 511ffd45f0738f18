//! Procura CLI - operator tooling for the access and audit engine.
//!
//! Reads the layered configuration, opens the configured store and signing
//! key, and exposes read-only views of the audit trail and grants alongside
//! configuration and key inspection.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use procura_config::{Config, LoadOptions};

mod commands;
mod config_bridge;
mod theme;

use commands::{audit, config, grants, keys};

/// Procura - access control and audit trail engine
#[derive(Parser)]
#[command(name = "procura")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extra configuration file, merged above the user config
    #[arg(short, long, global = true, env = "PROCURA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View and verify the audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect the audit signing key
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Inspect record grants
    Grants {
        #[command(subcommand)]
        command: GrantCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// List the newest entries across all records
    List {
        /// Maximum entries to show (defaults to audit.recent_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show one record's history
    History {
        /// Entity type or table name (e.g. `PurchaseOrder`, `user_group`)
        table: String,
        /// Record id
        id: u64,
    },
    /// Show field-level changes for one record
    Diff {
        /// Entity type or table name
        table: String,
        /// Record id
        id: u64,
    },
    /// Verify hash chains and signatures
    Verify {
        /// Entity type or table name (omit to verify everything)
        table: Option<String>,
        /// Record id
        #[arg(requires = "table")]
        id: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,

        /// Show only a specific section (e.g. storage, audit, access)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
    /// Show config file paths being checked
    Paths,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Show the signing key (public key and key ID)
    Show,
}

#[derive(Subcommand)]
enum GrantCommands {
    /// List the grants on a record
    List {
        /// Entity type (e.g. `BusinessCase`, `asset`)
        entity: String,
        /// Record id
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        explicit: cli.config.clone(),
        ..LoadOptions::default()
    };

    // Config commands report load errors themselves.
    if let Commands::Config { command } = &cli.command {
        init_logging(None, cli.verbose);
        return handle_config(command, &options);
    }

    let cfg = Config::load(&options)?.config;
    init_logging(Some(&cfg), cli.verbose);

    match cli.command {
        Commands::Audit { command } => handle_audit(command, &cfg).await,
        Commands::Keys { command } => handle_keys(&command, &cfg),
        Commands::Grants { command } => handle_grants(command, &cfg).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Set up logging from config, with `--verbose` overriding the level.
fn init_logging(cfg: Option<&Config>, verbose: bool) {
    let mut log_config = cfg.map_or_else(
        || {
            procura_telemetry::LogConfig::new("warn")
                .with_format(procura_telemetry::LogFormat::Compact)
        },
        config_bridge::to_log_config,
    );
    if verbose {
        "debug".clone_into(&mut log_config.level);
    }

    if let Err(e) = procura_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

async fn handle_audit(command: AuditCommands, cfg: &Config) -> Result<()> {
    let engine = config_bridge::build_engine(cfg)?;

    match command {
        AuditCommands::List { limit } => audit::list_recent(&engine, limit).await,
        AuditCommands::History { table, id } => audit::show_history(&engine, &table, id).await,
        AuditCommands::Diff { table, id } => audit::show_diff(&engine, &table, id).await,
        AuditCommands::Verify { table, id } => match (table.as_deref(), id) {
            (Some(table), Some(id)) => audit::verify(&engine, Some((table, id))).await,
            (Some(_), None) => anyhow::bail!("a record id is required when a table is given"),
            _ => audit::verify(&engine, None).await,
        },
    }
}

fn handle_config(command: &ConfigCommands, options: &LoadOptions) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            config::show_config(options, format, section.as_deref())
        },
        ConfigCommands::Validate => config::validate_config(options),
        ConfigCommands::Paths => config::show_paths(options),
    }
}

fn handle_keys(command: &KeyCommands, cfg: &Config) -> Result<()> {
    match command {
        KeyCommands::Show => keys::show_key(cfg),
    }
}

async fn handle_grants(command: GrantCommands, cfg: &Config) -> Result<()> {
    let engine = config_bridge::build_engine(cfg)?;

    match command {
        GrantCommands::List { entity, id } => grants::list_grants(&engine, &entity, id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_id_requires_table() {
        let cli = Cli::try_parse_from(["procura", "audit", "verify", "purchase_order", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit {
                command: AuditCommands::Verify {
                    table: Some(_),
                    id: Some(7)
                }
            }
        ));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["procura", "keys", "show", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
    }
}
