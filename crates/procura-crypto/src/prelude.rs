//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_crypto::prelude::*;` to import all essential types.

pub use crate::{ContentHash, CryptoError, CryptoResult, KeyPair, PublicKey, Signature};
