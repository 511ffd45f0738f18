//! Grants command - inspect the grants on a record.

use colored::Colorize;
use procura_core::{EntityType, RecordId, RecordRef};
use procura_pipeline::Engine;

use super::operator;
use crate::theme::Theme;

/// List the grants targeting one record.
pub(crate) async fn list_grants(engine: &Engine, entity: &str, id: u64) -> anyhow::Result<()> {
    let entity_type: EntityType = entity.parse()?;
    let target = RecordRef::new(entity_type, RecordId::new(id));
    let grants = engine.grants_for(&operator(), target).await?;

    if grants.is_empty() {
        println!("{}", Theme::info(&format!("No grants on {target}")));
        return Ok(());
    }

    println!("\n{}", Theme::header(&format!("Grants on {target}")));
    println!(
        "{:>12} {:<16} {:>6} {:>12} {}",
        "ID".dimmed(),
        "SUBJECT".dimmed(),
        "LEVEL".dimmed(),
        "GRANTED BY".dimmed(),
        "EXPIRES".dimmed()
    );
    println!("{}", Theme::separator());

    for grant in grants {
        let expires = grant
            .expires_at
            .as_ref()
            .map_or_else(|| Theme::dimmed("never"), Theme::timestamp);
        println!(
            "{:>12} {:<16} {:>6} {:>12} {expires}",
            grant.id.to_string(),
            grant.subject.to_string(),
            grant.access_level.to_string(),
            grant.granted_by.to_string()
        );
    }

    println!();
    Ok(())
}
