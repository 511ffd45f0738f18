//! CLI theme and styling.

use colored::Colorize;
use procura_audit::AuditAction;
use procura_core::Timestamp;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Format a timestamp in local-independent short form.
    pub(crate) fn timestamp(ts: &Timestamp) -> String {
        ts.0.format("%Y-%m-%d %H:%M:%S").to_string().dimmed().to_string()
    }

    /// Colour an audit action by how destructive it is.
    pub(crate) fn action(action: AuditAction) -> String {
        let label = action.to_string();
        match action {
            AuditAction::Create => label.green().to_string(),
            AuditAction::Update => label.yellow().to_string(),
            AuditAction::Delete => label.red().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        colored::control::set_override(false);
        let ts = Timestamp(
            chrono::DateTime::parse_from_rfc3339("2024-03-01T09:30:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        );
        assert_eq!(Theme::timestamp(&ts), "2024-03-01 09:30:00");
    }

    #[test]
    fn test_action_labels() {
        colored::control::set_override(false);
        assert_eq!(Theme::action(AuditAction::Delete), AuditAction::Delete.to_string());
    }
}
