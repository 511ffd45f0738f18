//! Numeric identifiers.
//!
//! Every persisted row is keyed by a store-assigned `u64`. Each kind of row
//! gets its own newtype so an actor id can never be passed where a group id
//! is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Fixed-width key form, so lexical key order matches numeric order.
            #[must_use]
            pub fn storage_key(self) -> String {
                format!("{:020}", self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            /// Accepts both `42` and the display form `prefix:42`.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .strip_prefix(concat!($prefix, ":"))
                    .unwrap_or(s)
                    .trim();
                digits
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| CoreError::InvalidId(s.to_string()))
            }
        }
    };
}

numeric_id!(
    /// Identifier of an actor (a user account).
    ActorId,
    "actor"
);

numeric_id!(
    /// Identifier of a group.
    GroupId,
    "group"
);

numeric_id!(
    /// Identifier of an owned record. Unique per entity type.
    RecordId,
    "record"
);

numeric_id!(
    /// Identifier of an explicit access grant.
    GrantId,
    "grant"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        assert_eq!(ActorId::new(7).to_string(), "actor:7");
        assert_eq!(GroupId::new(3).to_string(), "group:3");
        assert_eq!(GrantId::new(11).to_string(), "grant:11");
    }

    #[test]
    fn test_parse_accepts_both_forms() {
        assert_eq!("42".parse::<RecordId>().unwrap(), RecordId::new(42));
        assert_eq!("record:42".parse::<RecordId>().unwrap(), RecordId::new(42));
        assert!("group:42".parse::<RecordId>().is_err());
        assert!("abc".parse::<ActorId>().is_err());
    }

    #[test]
    fn test_storage_key_sorts_numerically() {
        let small = RecordId::new(9).storage_key();
        let large = RecordId::new(10).storage_key();
        assert!(small < large);
        assert_eq!(small.len(), 20);
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&GroupId::new(5)).unwrap();
        assert_eq!(json, "5");
        let back: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GroupId::new(5));
    }
}
