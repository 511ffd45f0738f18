//! Post-processing over stored entries: structural diffs and replay.
//!
//! Entries store full states; field-level changes are derived here on
//! demand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

/// How a field changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the new state.
    Added,
    /// Present only in the old state.
    Removed,
    /// Present in both with different values.
    Modified,
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Dotted path from the root, e.g. `fields.amount`. Empty for the root.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Old value, absent for additions.
    pub old: Option<Value>,
    /// New value, absent for removals.
    pub new: Option<Value>,
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn walk(prefix: &str, old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                let path = join(prefix, key);
                match b.get(key) {
                    Some(new_value) => walk(&path, old_value, new_value, out),
                    None => out.push(FieldChange {
                        path,
                        kind: ChangeKind::Removed,
                        old: Some(old_value.clone()),
                        new: None,
                    }),
                }
            }
            for (key, new_value) in b {
                if !a.contains_key(key) {
                    out.push(FieldChange {
                        path: join(prefix, key),
                        kind: ChangeKind::Added,
                        old: None,
                        new: Some(new_value.clone()),
                    });
                }
            }
        },
        _ if old != new => out.push(FieldChange {
            path: prefix.to_string(),
            kind: ChangeKind::Modified,
            old: Some(old.clone()),
            new: Some(new.clone()),
        }),
        _ => {},
    }
}

/// Field-level changes between two states. Objects are compared key by key;
/// arrays and scalars as whole values.
#[must_use]
pub fn diff(old: Option<&Value>, new: Option<&Value>) -> Vec<FieldChange> {
    let mut out = Vec::new();
    match (old, new) {
        (Some(old), Some(new)) => walk("", old, new, &mut out),
        (None, Some(new)) => walk("", &Value::Object(serde_json::Map::new()), new, &mut out),
        (Some(old), None) => walk("", old, &Value::Object(serde_json::Map::new()), &mut out),
        (None, None) => {},
    }
    out
}

/// Changes recorded by a single entry.
#[must_use]
pub fn entry_diff(entry: &AuditEntry) -> Vec<FieldChange> {
    diff(entry.old_state.as_ref(), entry.new_state.as_ref())
}

/// Rebuild a row's final state from its entries, oldest first.
///
/// Returns `None` if the row was deleted.
///
/// # Errors
///
/// Returns [`AuditError::IntegrityViolation`] if an entry's old state does
/// not equal the state reached so far.
pub fn replay(entries: &[AuditEntry]) -> AuditResult<Option<Value>> {
    let mut current: Option<Value> = None;
    for entry in entries {
        if entry.old_state != current {
            return Err(AuditError::IntegrityViolation {
                entry_id: entry.id.to_string(),
                reason: "old state does not match the replayed state".to_string(),
            });
        }
        current.clone_from(&entry.new_state);
    }
    Ok(current)
}
