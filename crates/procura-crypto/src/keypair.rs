//! The engine's audit signing key.

use std::fmt;
use std::io::Write;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::signature::Signature;

/// An Ed25519 signing key. The secret half is wiped on drop.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a key from its 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] unless `secret` is 32 bytes.
    pub fn from_secret_key(secret: &[u8]) -> CryptoResult<Self> {
        let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(secret.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: secret.len(),
            }
        })?);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Sign `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from(self.signing_key.sign(message))
    }

    /// The shareable half of this key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Load the key stored at `path`, creating one if the file is absent.
    ///
    /// New key files are created exclusively with mode `0o600` on Unix.
    /// Symlinked key files are refused.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] on filesystem failures and
    /// [`CryptoError::InvalidKeyLength`] if the file does not hold 32 bytes.
    pub fn load_or_generate(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let io = |e: std::io::Error| CryptoError::IoError(e.to_string());

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        match options.open(path) {
            Ok(mut file) => {
                let key = Self::generate();
                let secret = Zeroizing::new(key.signing_key.to_bytes());
                file.write_all(secret.as_slice()).map_err(io)?;
                return Ok(key);
            },
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {},
            Err(e) => return Err(io(e)),
        }

        if std::fs::symlink_metadata(path)
            .map_err(io)?
            .file_type()
            .is_symlink()
        {
            return Err(CryptoError::IoError(format!(
                "refusing to read symlinked key file {}",
                path.display()
            )));
        }
        let secret = Zeroizing::new(std::fs::read(path).map_err(io)?);
        Self::from_secret_key(&secret)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.public_key().key_id())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key, stored on each audit entry so the chain can be
/// verified without the secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short identifier for logs: the first 8 bytes in hex.
    #[must_use]
    pub fn key_id(&self) -> String {
        hex::encode(&self.0[..8])
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
    /// Returns an error for malformed hex or a length other than 32 bytes.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let raw: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Verify `signature` over `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] on mismatch.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        signature.verify(message, &self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = KeyPair::generate();
        let sig = key.sign(b"entry bytes");
        assert!(key.public_key().verify(b"entry bytes", &sig).is_ok());
        assert!(matches!(
            key.public_key().verify(b"tampered", &sig),
            Err(CryptoError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_other_key_rejects() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let sig = a.sign(b"msg");
        assert!(b.public_key().verify(b"msg", &sig).is_err());
    }

    #[test]
    fn test_secret_key_length() {
        assert!(matches!(
            KeyPair::from_secret_key(&[1u8; 31]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 31
            })
        ));
        assert!(KeyPair::from_secret_key(&[1u8; 32]).is_ok());
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("audit.key");

        let first = KeyPair::load_or_generate(&path).unwrap();
        let second = KeyPair::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_or_generate_refuses_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.key");
        std::fs::write(&real, [7u8; 32]).unwrap();
        let link = dir.path().join("link.key");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(matches!(
            KeyPair::load_or_generate(&link),
            Err(CryptoError::IoError(_))
        ));
    }

    #[test]
    fn test_public_key_serde() {
        let key = KeyPair::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert_eq!(key.key_id().len(), 16);
    }
}
