//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_pipeline::prelude::*;` to import all essential types.

// Errors
pub use crate::{PipelineError, PipelineResult};

// Engine
pub use crate::{DEFAULT_RECENT_LIMIT, Engine, MutationOutcome, PipelineState};

// Audit tables
pub use crate::{ACTOR_TABLE, GRANT_TABLE, GROUP_TABLE, MEMBERSHIP_TABLE};
