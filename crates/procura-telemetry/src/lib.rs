//! Procura Telemetry - Logging and request context for the Procura engine.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`]: a `tracing-subscriber` stack with
//!   pretty, compact, full or JSON output to stdout, stderr or rolling files
//! - [`RequestContext`]: the actor, client and operation of one engine call,
//!   carried as a tracing span
//!
//! # Example
//!
//! ```rust,no_run
//! use procura_core::{ActorId, ClientInfo};
//! use procura_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), procura_telemetry::TelemetryError> {
//! setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Json)
//!         .with_directive("procura_access=debug"),
//! )?;
//!
//! let ctx = RequestContext::new("pipeline", "create")
//!     .with_actor(ActorId::new(7))
//!     .with_client(ClientInfo::from_ip("10.0.0.4"));
//! let _guard = ctx.span().entered();
//! tracing::info!("Handling request");
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

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
