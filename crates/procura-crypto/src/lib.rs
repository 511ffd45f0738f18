//! Procura Crypto - Hashing and signing for the audit trail.
//!
//! This crate provides:
//! - [`ContentHash`], BLAKE3 digests that link each audit entry to the previous one
//! - [`KeyPair`], the engine's Ed25519 signing key with on-disk persistence
//! - [`PublicKey`] and [`Signature`] for verifying entries after the fact
//!
//! # Example
//!
//! ```
//! use procura_crypto::{ContentHash, KeyPair};
//!
//! let key = KeyPair::generate();
//! let digest = ContentHash::hash(b"entry");
//! let signature = key.sign(digest.as_bytes());
//! assert!(key.public_key().verify(digest.as_bytes(), &signature).is_ok());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keypair;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
