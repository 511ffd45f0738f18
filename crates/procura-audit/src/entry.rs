//! Audit entry types.
//!
//! Every mutation of an access-controlled row is recorded as one entry
//! holding the full JSON state before and after. Entries of the same
//! `(table, record)` stream are chain-linked (each carries the hash of its
//! predecessor) and signed by the engine.

use std::fmt;
use std::str::FromStr;

use procura_core::{ActorId, ClientInfo, Timestamp};
use procura_crypto::{ContentHash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

const ENTRY_DOMAIN: &str = "procura audit entry v1";

/// Unique identifier of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuditEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    /// Row inserted. `old_state` is null.
    Create,
    /// Row changed. Both states are present.
    Update,
    /// Row removed. `new_state` is null.
    Delete,
}

impl AuditAction {
    /// Check that the states fit the action.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidStates`] when a state that must be null
    /// is present or one that must be present is null.
    pub fn check_states(self, old_state: Option<&Value>, new_state: Option<&Value>) -> AuditResult<()> {
        let reason = match (self, old_state.is_some(), new_state.is_some()) {
            (Self::Create, false, true) | (Self::Update, true, true) | (Self::Delete, true, false) => {
                return Ok(());
            },
            (Self::Create, true, _) => "CREATE must not carry an old state",
            (Self::Delete, _, true) => "DELETE must not carry a new state",
            (Self::Update | Self::Delete, false, _) => "missing old state",
            (Self::Create | Self::Update, _, false) => "missing new state",
        };
        Err(AuditError::InvalidStates {
            action: self.to_string(),
            reason,
        })
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Create => 1,
            Self::Update => 2,
            Self::Delete => 3,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// What an entry is about, before it is chained and signed.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Kind of mutation.
    pub action: AuditAction,
    /// Table the row lives in.
    pub table_name: String,
    /// Row identifier.
    pub record_id: u64,
    /// Full state before, null for CREATE.
    pub old_state: Option<Value>,
    /// Full state after, null for DELETE.
    pub new_state: Option<Value>,
    /// Acting actor.
    pub actor_id: ActorId,
    /// Request origin.
    pub client: ClientInfo,
}

/// A single, write-once audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: AuditEntryId,
    /// Table the audited row lives in.
    pub table_name: String,
    /// Identifier of the audited row.
    pub record_id: u64,
    /// Kind of mutation.
    pub action: AuditAction,
    /// Full state before the mutation.
    pub old_state: Option<Value>,
    /// Full state after the mutation.
    pub new_state: Option<Value>,
    /// Acting actor.
    pub actor_id: ActorId,
    /// When the entry was created.
    pub timestamp: Timestamp,
    /// Request origin address.
    pub client_ip: Option<String>,
    /// Request origin user agent.
    pub user_agent: Option<String>,
    /// Hash of the previous entry in the same stream (chain linking).
    pub previous_hash: ContentHash,
    /// Key that signed this entry.
    pub signer: PublicKey,
    /// Signature over entry contents.
    pub signature: Signature,
}

fn push_str(data: &mut Vec<u8>, s: &str) {
    data.extend_from_slice(&u64::try_from(s.len()).unwrap_or(u64::MAX).to_le_bytes());
    data.extend_from_slice(s.as_bytes());
}

fn push_opt_str(data: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            data.push(1);
            push_str(data, s);
        },
        None => data.push(0),
    }
}

fn push_state(data: &mut Vec<u8>, state: Option<&Value>) {
    // Value serialization cannot fail; an empty body still differs from null.
    let json = state.map(|v| serde_json::to_string(v).unwrap_or_default());
    push_opt_str(data, json.as_deref());
}

impl AuditEntry {
    /// Chain, stamp and sign a mutation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidStates`] if the states do not fit the
    /// action.
    pub fn create(
        mutation: MutationRecord,
        previous_hash: ContentHash,
        signer: &KeyPair,
    ) -> AuditResult<Self> {
        mutation
            .action
            .check_states(mutation.old_state.as_ref(), mutation.new_state.as_ref())?;

        let mut entry = Self {
            id: AuditEntryId::new(),
            table_name: mutation.table_name,
            record_id: mutation.record_id,
            action: mutation.action,
            old_state: mutation.old_state,
            new_state: mutation.new_state,
            actor_id: mutation.actor_id,
            timestamp: Timestamp::now(),
            client_ip: mutation.client.ip,
            user_agent: mutation.client.user_agent,
            previous_hash,
            signer: signer.public_key(),
            signature: Signature::from_bytes([0u8; 64]),
        };
        entry.signature = signer.sign(&entry.signing_data());
        Ok(entry)
    }

    /// The bytes covered by the signature and the content hash.
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(self.id.0.as_bytes());
        push_str(&mut data, &self.table_name);
        data.extend_from_slice(&self.record_id.to_le_bytes());
        data.push(self.action.tag());
        push_state(&mut data, self.old_state.as_ref());
        push_state(&mut data, self.new_state.as_ref());
        data.extend_from_slice(&self.actor_id.get().to_le_bytes());
        data.extend_from_slice(&self.timestamp.0.timestamp().to_le_bytes());
        data.extend_from_slice(&self.timestamp.0.timestamp_subsec_nanos().to_le_bytes());
        push_opt_str(&mut data, self.client_ip.as_deref());
        push_opt_str(&mut data, self.user_agent.as_deref());
        data.extend_from_slice(self.previous_hash.as_bytes());
        data.extend_from_slice(self.signer.as_bytes());
        data
    }

    /// Compute the content hash of this entry.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::hash_with_domain(ENTRY_DOMAIN, &self.signing_data())
    }

    /// Verify the entry's signature.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidSignature`] if the signature does not
    /// match the entry contents.
    pub fn verify_signature(&self) -> AuditResult<()> {
        self.signer
            .verify(&self.signing_data(), &self.signature)
            .map_err(|_| AuditError::InvalidSignature {
                entry_id: self.id.to_string(),
            })
    }

    /// Check if this entry follows another (chain linking).
    #[must_use]
    pub fn follows(&self, previous: &Self) -> bool {
        self.previous_hash == previous.content_hash()
    }

    /// The stream this entry belongs to.
    #[must_use]
    pub fn stream(&self) -> StreamKey {
        StreamKey::new(&self.table_name, self.record_id)
    }
}

/// Identifies the entry stream of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    /// Table name.
    pub table_name: String,
    /// Row identifier.
    pub record_id: u64,
}

impl StreamKey {
    /// Build a stream key.
    #[must_use]
    pub fn new(table_name: &str, record_id: u64) -> Self {
        Self {
            table_name: table_name.to_string(),
            record_id,
        }
    }

    pub(crate) fn storage_key(&self) -> String {
        format!("{}:{:020}", self.table_name, self.record_id)
    }

    pub(crate) fn from_storage_key(key: &str) -> Option<Self> {
        let (table, id) = key.rsplit_once(':')?;
        Some(Self::new(table, id.parse().ok()?))
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_name, self.record_id)
    }
}
