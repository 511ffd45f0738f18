//! Procura Pipeline - The audited write path and access-check facade.
//!
//! This crate provides:
//! - [`Engine`], the single entry point for access checks, listings and
//!   mutations over one key-value store
//! - The mutation pipeline: every create, update and delete runs
//!   `Authorizing -> [Inheriting] -> Snapshotting -> Mutating -> Auditing`
//!   inside one transaction and ends `Committed` or `Rejected`
//! - Audited administration of grants, groups, memberships and actors
//!
//! A mutation either commits its row changes together with a signed audit
//! entry, or commits nothing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use procura_access::PolicyTable;
//! use procura_core::{AccessLevel, Actor, ActorId, ClientInfo, EntityType, RecordDraft, Role};
//! use procura_crypto::KeyPair;
//! use procura_pipeline::{Engine, PipelineState};
//! use procura_storage::MemoryKvStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), procura_pipeline::PipelineError> {
//! let engine = Engine::new(
//!     Arc::new(MemoryKvStore::new()),
//!     Arc::new(KeyPair::generate()),
//!     PolicyTable::default(),
//! );
//! let client = ClientInfo::default();
//! let bootstrap = Actor::new(ActorId::new(0), "bootstrap", Role::Admin);
//! let user = engine
//!     .provision_actor(&bootstrap, "dana", Role::User, &client)
//!     .await?
//!     .value;
//!
//! let created = engine
//!     .create(&user, EntityType::BusinessCase, RecordDraft::new(), &client)
//!     .await?;
//! assert_eq!(created.trace.last(), Some(&PipelineState::Committed));
//!
//! let decision = engine
//!     .check_access(&user, EntityType::BusinessCase, created.value.id, AccessLevel::Write)
//!     .await?;
//! assert!(decision.is_allowed());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod directory;
mod engine;
mod error;
mod grants;
mod records;
mod state;

pub use directory::{ACTOR_TABLE, GROUP_TABLE, MEMBERSHIP_TABLE};
pub use engine::{DEFAULT_RECENT_LIMIT, Engine};
pub use error::{PipelineError, PipelineResult};
pub use grants::GRANT_TABLE;
pub use state::{MutationOutcome, PipelineState};
