use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unitforge_core::{RecordId, TenantId, UserId, ValueObject};

use crate::error::UomError;

/// Entity kinds allowed to own custom units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Tenant,
    User,
    InventoryItem,
    Product,
    Party,
}

impl OwnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Tenant => "tenant",
            OwnerKind::User => "user",
            OwnerKind::InventoryItem => "inventory_item",
            OwnerKind::Product => "product",
            OwnerKind::Party => "party",
        }
    }
}

impl FromStr for OwnerKind {
    type Err = UomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(OwnerKind::Tenant),
            "user" => Ok(OwnerKind::User),
            "inventory_item" => Ok(OwnerKind::InventoryItem),
            "product" => Ok(OwnerKind::Product),
            "party" => Ok(OwnerKind::Party),
            other => Err(UomError::invalid_value(format!("unknown owner kind '{other}'"))),
        }
    }
}

/// Scope a custom unit belongs to. `None` in an `Option<Owner>` is the global
/// scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: Uuid,
}

impl ValueObject for Owner {}

impl Owner {
    pub fn new(kind: OwnerKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn tenant(tenant_id: TenantId) -> Self {
        Self::new(OwnerKind::Tenant, tenant_id.get())
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(OwnerKind::User, user_id.get())
    }

    pub fn record(kind: OwnerKind, record_id: RecordId) -> Self {
        Self::new(kind, record_id.get())
    }

    /// The tenant this owner *is*, when it is one.
    pub fn tenant_id(&self) -> Option<TenantId> {
        (self.kind == OwnerKind::Tenant).then(|| TenantId::from_uuid(self.id))
    }
}

impl core::fmt::Display for Owner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Human-readable scope label used in errors and logs.
pub fn scope_label(owner: Option<&Owner>) -> String {
    owner.map_or_else(|| "global".to_string(), Owner::to_string)
}
