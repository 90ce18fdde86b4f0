use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unitforge_core::TenantId;

use crate::event::Event;

/// Envelope for a published event.
///
/// Notes:
/// - `tenant_id` is `None` for facts about global reference data.
/// - `event_type`/`event_version` are copied from the payload so consumers can
///   route without deserializing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: Option<TenantId>,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, assigning a fresh time-ordered event id.
    pub fn wrap(tenant_id: Option<TenantId>, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            event_type: payload.event_type().to_string(),
            event_version: payload.version(),
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Convert the payload into JSON for transports that are payload-agnostic.
    pub fn to_json(&self) -> Result<EventEnvelope<serde_json::Value>, serde_json::Error>
    where
        E: Serialize,
    {
        Ok(EventEnvelope {
            event_id: self.event_id,
            tenant_id: self.tenant_id,
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}
