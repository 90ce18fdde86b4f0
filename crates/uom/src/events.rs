//! Facts published by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use unitforge_core::TenantId;
use unitforge_events::Event;

use crate::custom::{CustomUnit, Owner};
use crate::model::{CustomUnitId, UnitTypeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UomEvent {
    CustomUnitRegistered(CustomUnitRegistered),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomUnitRegistered {
    pub unit_id: CustomUnitId,
    pub code: String,
    pub owner: Option<Owner>,
    pub type_id: UnitTypeId,
    pub conversion_factor: Decimal,
    pub conversion_count: usize,
    pub occurred_at: DateTime<Utc>,
}

impl CustomUnitRegistered {
    pub fn from_unit(unit: &CustomUnit, conversion_count: usize) -> Self {
        Self {
            unit_id: unit.id,
            code: unit.code.clone(),
            owner: unit.owner,
            type_id: unit.type_id,
            conversion_factor: unit.conversion_factor,
            conversion_count,
            occurred_at: unit.created_at,
        }
    }
}

impl UomEvent {
    /// Tenant scope of the fact, when the owner is a tenant.
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            UomEvent::CustomUnitRegistered(e) => e.owner.as_ref().and_then(Owner::tenant_id),
        }
    }
}

impl Event for UomEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UomEvent::CustomUnitRegistered(_) => "uom.custom_unit.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UomEvent::CustomUnitRegistered(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitforge_events::EventEnvelope;

    fn registered(owner: Option<Owner>) -> UomEvent {
        UomEvent::CustomUnitRegistered(CustomUnitRegistered {
            unit_id: CustomUnitId(1),
            code: "PALLET".to_string(),
            owner,
            type_id: UnitTypeId(1),
            conversion_factor: Decimal::new(4, 0),
            conversion_count: 0,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn envelope_copies_type_and_tenant() {
        let tenant = TenantId::new();
        let event = registered(Some(Owner::tenant(tenant)));
        let envelope = EventEnvelope::wrap(event.tenant_id(), event);
        assert_eq!(envelope.event_type(), "uom.custom_unit.registered");
        assert_eq!(envelope.event_version(), 1);
        assert_eq!(envelope.tenant_id(), Some(tenant));
    }

    #[test]
    fn global_units_have_no_tenant() {
        assert_eq!(registered(None).tenant_id(), None);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(registered(None)).unwrap();
        assert_eq!(json["type"], "custom_unit_registered");
        assert_eq!(json["code"], "PALLET");
    }
}
