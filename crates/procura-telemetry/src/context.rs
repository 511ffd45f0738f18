//! Per-call context for correlating log lines.

use chrono::{DateTime, Utc};
use procura_core::{ActorId, ClientInfo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one engine call.
///
/// The engine opens [`RequestContext::span`] around every operation so
/// that decisions, rollbacks and audit writes logged inside it share the
/// same `request_id`, actor and client address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique per call.
    pub request_id: Uuid,
    /// Component that opened the context, e.g. `pipeline`.
    pub component: String,
    /// Operation name, e.g. `create` or `revoke_grant`.
    pub operation: String,
    /// Acting actor, when known.
    pub actor: Option<ActorId>,
    /// Caller provenance.
    #[serde(default)]
    pub client: ClientInfo,
    /// When the call started.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Open a context for `operation` in `component`.
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            actor: None,
            client: ClientInfo::default(),
            started_at: Utc::now(),
        }
    }

    /// Set the acting actor.
    #[must_use]
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the caller provenance.
    #[must_use]
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Milliseconds since the context was opened.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// First eight characters of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.request_id.simple().to_string().chars().take(8).collect()
    }

    /// A span carrying the context's fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            component = %self.component,
            operation = %self.operation,
            actor_id = self.actor.map(ActorId::get),
            client_ip = self.client.ip.as_deref(),
        )
    }
}

/// Enters a context's span and logs the call's duration when dropped.
///
/// Only for synchronous sections; async code should use
/// `tracing::Instrument::instrument(fut, ctx.span())` instead.
pub struct RequestGuard {
    context: RequestContext,
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl RequestGuard {
    /// Enter `context`'s span.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("Request started");
        Self { context, span }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "Request completed");
    }
}
