//! Ordered enums and timestamps shared by every component.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing `DateTime`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Whether this instant has already passed.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 <= Utc::now()
    }

    /// Whether this instant is still ahead.
    #[must_use]
    pub fn is_future(&self) -> bool {
        self.0 > Utc::now()
    }

    /// This instant shifted by `delta`. Saturates at the representable range.
    #[must_use]
    pub fn offset(&self, delta: Duration) -> Self {
        Self(self.0.checked_add_signed(delta).unwrap_or(self.0))
    }

    /// Consume and return the inner `DateTime`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// Actor role. Totally ordered: `Viewer < User < Manager < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Read-only account.
    Viewer,
    /// Regular contributor.
    User,
    /// Sees and manages everything; administers groups.
    Manager,
    /// Full administrative control, including actor administration.
    Admin,
}

impl Role {
    /// Managers and admins bypass record-level checks.
    #[must_use]
    pub fn is_privileged(self) -> bool {
        self >= Self::Manager
    }

    /// Whether this role is at least `required`.
    #[must_use]
    pub fn at_least(self, required: Self) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewer => write!(f, "Viewer"),
            Self::User => write!(f, "User"),
            Self::Manager => write!(f, "Manager"),
            Self::Admin => write!(f, "Admin"),
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "user" => Ok(Self::User),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

/// Record access level. Totally ordered: `Read < Write < Full`.
///
/// `Full` covers deletion and re-granting access to others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    /// View the record.
    Read,
    /// Modify the record.
    Write,
    /// Delete the record and share it.
    Full,
}

impl AccessLevel {
    /// Whether holding `self` satisfies a request for `requested`.
    #[must_use]
    pub fn satisfies(self, requested: Self) -> bool {
        self >= requested
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
            Self::Full => write!(f, "Full"),
        }
    }
}

impl FromStr for AccessLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "full" => Ok(Self::Full),
            _ => Err(CoreError::UnknownAccessLevel(s.to_string())),
        }
    }
}

/// The kinds of access-controlled records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    /// A budget source with a directly assigned owner group.
    BudgetItem,
    /// A business case. Access is aggregated through its line items.
    BusinessCase,
    /// A line of a business case; root of the ownership chain.
    LineItem,
    /// A work breakdown structure element under a line item.
    WorkBreakdown,
    /// An asset under a work breakdown element.
    Asset,
    /// A purchase order raised for an asset.
    PurchaseOrder,
    /// Goods received against a purchase order.
    GoodsReceipt,
    /// A resource allocation against a purchase order.
    Allocation,
}

impl EntityType {
    /// All entity types.
    pub const ALL: [Self; 8] = [
        Self::BudgetItem,
        Self::BusinessCase,
        Self::LineItem,
        Self::WorkBreakdown,
        Self::Asset,
        Self::PurchaseOrder,
        Self::GoodsReceipt,
        Self::Allocation,
    ];

    /// Table name used in audit entries.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::BudgetItem => "budget_item",
            Self::BusinessCase => "business_case",
            Self::LineItem => "business_case_line_item",
            Self::WorkBreakdown => "wbs",
            Self::Asset => "asset",
            Self::PurchaseOrder => "purchase_order",
            Self::GoodsReceipt => "goods_receipt",
            Self::Allocation => "resource_po_allocation",
        }
    }

    /// Look up an entity type by its audit table name.
    #[must_use]
    pub fn from_table_name(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.table_name() == table)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BudgetItem => "BudgetItem",
            Self::BusinessCase => "BusinessCase",
            Self::LineItem => "LineItem",
            Self::WorkBreakdown => "WorkBreakdown",
            Self::Asset => "Asset",
            Self::PurchaseOrder => "PurchaseOrder",
            Self::GoodsReceipt => "GoodsReceipt",
            Self::Allocation => "Allocation",
        };
        f.write_str(name)
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    /// Accepts the display name (`PurchaseOrder`) or the table name (`purchase_order`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.to_string().eq_ignore_ascii_case(s) || ty.table_name() == s)
            .ok_or_else(|| CoreError::UnknownEntityType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::User);
        assert!(Role::User < Role::Manager);
        assert!(Role::Manager < Role::Admin);
        assert!(Role::Manager.is_privileged());
        assert!(!Role::User.is_privileged());
    }

    #[test]
    fn test_access_level_satisfies() {
        assert!(AccessLevel::Full.satisfies(AccessLevel::Write));
        assert!(AccessLevel::Write.satisfies(AccessLevel::Write));
        assert!(!AccessLevel::Read.satisfies(AccessLevel::Write));
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_entity_type_names_round_trip() {
        for ty in EntityType::ALL {
            assert_eq!(ty.to_string().parse::<EntityType>().unwrap(), ty);
            assert_eq!(EntityType::from_table_name(ty.table_name()), Some(ty));
        }
        assert_eq!(
            "purchase_order".parse::<EntityType>().unwrap(),
            EntityType::PurchaseOrder
        );
    }

    #[test]
    fn test_timestamp_offset() {
        let now = Timestamp::now();
        assert!(now.offset(Duration::hours(1)).is_future());
        assert!(now.offset(Duration::hours(-1)).is_past());
    }
}
