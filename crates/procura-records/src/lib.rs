//! Procura Records - Owned record storage and owner-group inheritance.
//!
//! This crate provides:
//! - [`RecordStore`], transactional persistence for owned records with
//!   creator, owner-group and reference indexes
//! - [`InheritanceResolver`], which copies a parent's owner group onto a new
//!   child using the declared [`PARENT_TABLE`]
//!
//! # Example
//!
//! ```
//! use procura_core::EntityType;
//! use procura_records::{is_root, parent_type};
//!
//! assert_eq!(parent_type(EntityType::PurchaseOrder), Some(EntityType::Asset));
//! assert!(is_root(EntityType::LineItem));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod inheritance;
mod store;

pub use error::{RecordError, RecordResult};
pub use inheritance::{
    InheritanceResolver, Inherited, LINK_TABLE, PARENT_TABLE, has_owner_group, is_root,
    parent_type,
};
pub use store::RecordStore;
