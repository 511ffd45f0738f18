//! Procura Test - Shared test utilities.
//!
//! This crate provides fixtures, a seeded [`TestWorld`] and failure-injecting
//! mocks for use as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! procura-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use procura_core::{EntityType, Role};
//! use procura_test::TestWorld;
//!
//! #[tokio::test]
//! async fn test_chain_inherits() {
//!     let world = TestWorld::new().await.unwrap();
//!     let group = world.group("plant").await.unwrap();
//!     let chain = world.chain(&world.admin, group).await.unwrap();
//!     assert_eq!(chain.purchase_order.owner_group, Some(group));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;
pub mod world;

pub use fixtures::*;
pub use mocks::*;
pub use world::*;
