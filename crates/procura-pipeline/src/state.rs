//! Pipeline states and the per-run transaction.

use std::fmt;
use std::sync::Arc;

use procura_audit::AuditEntry;
use procura_storage::{KvStore, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{PipelineError, PipelineResult};

/// Stage of a mutation.
///
/// Every run starts in `Authorizing` and ends in `Committed` or `Rejected`.
/// `Inheriting` appears only when a child record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Checking the actor's privilege.
    Authorizing,
    /// Resolving the parent and copying its owner group.
    Inheriting,
    /// Capturing the pre-mutation state.
    Snapshotting,
    /// Staging the data change.
    Mutating,
    /// Staging the audit entry.
    Auditing,
    /// Data and audit entry are durable.
    Committed,
    /// Nothing was written.
    Rejected,
}

impl PipelineState {
    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authorizing => "authorizing",
            Self::Inheriting => "inheriting",
            Self::Snapshotting => "snapshotting",
            Self::Mutating => "mutating",
            Self::Auditing => "auditing",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Result of a committed mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    /// The row as written (for deletes, as it was before removal).
    pub value: T,
    /// The audit entry committed with it.
    pub entry: AuditEntry,
    /// States the run went through, ending in [`PipelineState::Committed`].
    pub trace: Vec<PipelineState>,
}

/// One pipeline run: a transaction plus the states visited so far.
pub(crate) struct Run {
    pub(crate) tx: Transaction,
    trace: Vec<PipelineState>,
}

impl Run {
    pub(crate) fn begin(store: &Arc<dyn KvStore>) -> Self {
        trace!(state = %PipelineState::Authorizing, "Pipeline started");
        Self {
            tx: Transaction::begin(Arc::clone(store)),
            trace: vec![PipelineState::Authorizing],
        }
    }

    pub(crate) fn enter(&mut self, state: PipelineState) {
        trace!(%state, "Pipeline state");
        self.trace.push(state);
    }

    fn current(&self) -> PipelineState {
        self.trace
            .last()
            .copied()
            .unwrap_or(PipelineState::Authorizing)
    }

    /// Roll back and return `error`.
    pub(crate) fn reject<T>(mut self, error: PipelineError) -> PipelineResult<T> {
        let stage = self.current();
        self.trace.push(PipelineState::Rejected);
        warn!(%stage, %error, trace = ?self.trace, "Mutation rejected");
        self.tx.rollback();
        Err(error)
    }

    /// Commit the staged steps' result, or roll back on their error.
    pub(crate) async fn finish<T>(
        self,
        result: PipelineResult<(T, AuditEntry)>,
    ) -> PipelineResult<MutationOutcome<T>> {
        match result {
            Ok((value, entry)) => self.commit(value, entry).await,
            Err(error) => self.reject(error),
        }
    }

    async fn commit<T>(
        mut self,
        value: T,
        entry: AuditEntry,
    ) -> PipelineResult<MutationOutcome<T>> {
        let stage = self.current();
        match self.tx.commit().await {
            Ok(()) => {
                self.trace.push(PipelineState::Committed);
                Ok(MutationOutcome {
                    value,
                    entry,
                    trace: self.trace,
                })
            },
            Err(e) => {
                let error = PipelineError::from(e);
                self.trace.push(PipelineState::Rejected);
                warn!(%stage, %error, trace = ?self.trace, "Commit failed, nothing written");
                Err(error)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Committed.is_terminal());
        assert!(PipelineState::Rejected.is_terminal());
        assert!(!PipelineState::Auditing.is_terminal());
        assert_eq!(PipelineState::Inheriting.to_string(), "inheriting");
    }
}
