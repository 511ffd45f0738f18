//! Ed25519 signatures over audit entries.

use std::fmt;

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, CryptoResult};

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Wrap raw signature bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed hex or a length other than 64 bytes.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let raw: [u8; 64] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidSignatureLength {
                    expected: 64,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Check this signature against `message` and a raw public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the key bytes are not a
    /// curve point and [`CryptoError::SignatureVerificationFailed`] on mismatch.
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> CryptoResult<()> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        key.verify(message, &DalekSignature::from_bytes(&self.0))
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl From<DalekSignature> for Signature {
    fn from(sig: DalekSignature) -> Self {
        Self(sig.to_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}..)", hex.get(..12).unwrap_or(&hex))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
