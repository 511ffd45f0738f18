//! Subcommand handlers.

pub(crate) mod audit;
pub(crate) mod config;
pub(crate) mod grants;
pub(crate) mod keys;

use procura_core::{Actor, ActorId, EntityType, Role};

/// The actor CLI commands run as. Anyone holding the store and the signing
/// key already has full access, so the operator is an Admin.
pub(crate) fn operator() -> Actor {
    Actor::new(ActorId::new(0), "operator", Role::Admin)
}

/// Map a table argument to a table name. Entity names such as
/// `PurchaseOrder` map to their table; anything else is taken as-is.
pub(crate) fn resolve_table(arg: &str) -> String {
    arg.parse::<EntityType>()
        .map_or_else(|_| arg.to_string(), |ty| ty.table_name().to_string())
}
