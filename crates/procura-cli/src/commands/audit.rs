//! Audit command - view, diff and verify the audit trail.

use colored::Colorize;
use procura_audit::{AuditEntry, ChangeKind, entry_diff};
use procura_pipeline::Engine;

use super::{operator, resolve_table};
use crate::theme::Theme;

fn print_entries(entries: &[AuditEntry]) {
    println!(
        "{:>19} {:>8} {:<32} {:>10} {}",
        "TIMESTAMP".dimmed(),
        "ACTION".dimmed(),
        "RECORD".dimmed(),
        "ACTOR".dimmed(),
        "CLIENT".dimmed()
    );
    println!("{}", Theme::separator());

    for entry in entries {
        println!(
            "{:>19} {:>8} {:<32} {:>10} {}",
            Theme::timestamp(&entry.timestamp),
            Theme::action(entry.action),
            format!("{}:{}", entry.table_name, entry.record_id),
            entry.actor_id.to_string(),
            entry.client_ip.as_deref().unwrap_or("-")
        );
    }
}

/// List the newest entries across all records.
pub(crate) async fn list_recent(engine: &Engine, limit: Option<usize>) -> anyhow::Result<()> {
    let entries = engine.audit_recent(&operator(), limit).await?;

    if entries.is_empty() {
        println!("{}", Theme::info("No audit entries"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Recent Audit Entries"));
    print_entries(&entries);
    println!();
    Ok(())
}

/// Show one record's history, oldest first.
pub(crate) async fn show_history(engine: &Engine, table: &str, id: u64) -> anyhow::Result<()> {
    let table = resolve_table(table);
    let entries = engine.audit_history(&operator(), &table, id).await?;

    if entries.is_empty() {
        println!("{}", Theme::info(&format!("No entries for {table}:{id}")));
        return Ok(());
    }

    println!("\n{}", Theme::header(&format!("History of {table}:{id}")));
    print_entries(&entries);
    println!();
    Ok(())
}

/// Show the field-level changes of each entry in a record's history.
pub(crate) async fn show_diff(engine: &Engine, table: &str, id: u64) -> anyhow::Result<()> {
    let table = resolve_table(table);
    let entries = engine.audit_history(&operator(), &table, id).await?;

    if entries.is_empty() {
        println!("{}", Theme::info(&format!("No entries for {table}:{id}")));
        return Ok(());
    }

    println!("\n{}", Theme::header(&format!("Changes to {table}:{id}")));
    for entry in &entries {
        println!(
            "\n{} {} by {}",
            Theme::timestamp(&entry.timestamp),
            Theme::action(entry.action),
            entry.actor_id
        );
        let changes = entry_diff(entry);
        if changes.is_empty() {
            println!("  {}", Theme::dimmed("(no field changes)"));
        }
        for change in changes {
            let path = if change.path.is_empty() {
                "<record>".to_string()
            } else {
                change.path
            };
            let render = |v: Option<serde_json::Value>| {
                v.map_or_else(|| "-".to_string(), |v| v.to_string())
            };
            match change.kind {
                ChangeKind::Added => {
                    println!("  {} {path} = {}", "+".green(), render(change.new));
                },
                ChangeKind::Removed => {
                    println!("  {} {path} = {}", "-".red(), render(change.old));
                },
                ChangeKind::Modified => println!(
                    "  {} {path}: {} -> {}",
                    "~".yellow(),
                    render(change.old),
                    render(change.new)
                ),
            }
        }
    }
    println!();
    Ok(())
}

/// Verify one record's chain, or every chain.
pub(crate) async fn verify(engine: &Engine, target: Option<(&str, u64)>) -> anyhow::Result<()> {
    let actor = operator();

    if let Some((table, id)) = target {
        let table = resolve_table(table);
        let result = engine.verify_audit_chain(&actor, &table, id).await?;

        if result.valid {
            println!(
                "{}",
                Theme::success(&format!(
                    "{table}:{id} verified: {} entries, no issues",
                    result.entries_verified
                ))
            );
        } else {
            println!(
                "{}",
                Theme::error(&format!("{table}:{id} has {} issues:", result.issues.len()))
            );
            for issue in &result.issues {
                println!("  - {issue}");
            }
        }
        return Ok(());
    }

    let results = engine.verify_audit_log(&actor).await?;
    let valid_count = results.iter().filter(|(_, r)| r.valid).count();
    let total_count = results.len();

    if valid_count == total_count {
        println!(
            "{}",
            Theme::success(&format!("All {total_count} audit streams verified"))
        );
        return Ok(());
    }

    println!(
        "{}",
        Theme::warning(&format!("{valid_count}/{total_count} audit streams valid"))
    );
    for (stream, result) in &results {
        if !result.valid {
            println!(
                "\n{}",
                Theme::error(&format!("{stream} has {} issues:", result.issues.len()))
            );
            for issue in &result.issues {
                println!("  - {issue}");
            }
        }
    }

    Ok(())
}
