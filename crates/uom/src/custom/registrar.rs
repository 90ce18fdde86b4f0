use rust_decimal::Decimal;
use tracing::instrument;

use unitforge_events::{EventBus, EventEnvelope};

use crate::alias::AliasResolver;
use crate::decimal::{STORED_FACTOR_SCALE, ensure_positive, to_fixed_scale};
use crate::error::{UomError, UomResult};
use crate::events::{CustomUnitRegistered, UomEvent};
use crate::model::{UnitId, UnitRef, UnitTypeId};
use crate::registry::{UnitRegistry, normalize};

use super::owner::{Owner, scope_label};
use super::store::CustomUnitStore;
use super::{CustomConversionInput, CustomUnit, NewCustomUnit};

/// Conversion target as far as the registry can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedTarget {
    /// Registry unit, already type-checked.
    Unit(UnitId),
    /// Not a registry unit; the store resolves it among custom units.
    Custom { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedConversion {
    pub target: PlannedTarget,
    pub factor: Decimal,
    pub is_linear: bool,
}

/// A validated registration, ready to be persisted in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPlan {
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub owner: Option<Owner>,
    pub type_id: UnitTypeId,
    pub conversion_factor: Decimal,
    pub conversions: Vec<PlannedConversion>,
}

impl RegistrationPlan {
    pub fn scope(&self) -> String {
        scope_label(self.owner.as_ref())
    }
}

/// Registers owner-scoped custom units.
pub struct CustomUnitRegistrar<'r, S> {
    registry: &'r UnitRegistry,
    store: S,
    factor_scale: u32,
}

impl<'r, S> CustomUnitRegistrar<'r, S>
where
    S: CustomUnitStore,
{
    pub fn new(registry: &'r UnitRegistry, store: S) -> Self {
        Self {
            registry,
            store,
            factor_scale: STORED_FACTOR_SCALE,
        }
    }

    /// Fractional digits kept when storing factors.
    pub fn with_factor_scale(mut self, factor_scale: u32) -> Self {
        self.factor_scale = factor_scale;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate a registration against the registry without persisting it.
    ///
    /// Custom unit codes may not shadow a registry code or alias, since
    /// lookups always try the registry first.
    pub fn plan(
        &self,
        attributes: NewCustomUnit,
        owner: Option<Owner>,
        conversions: Vec<CustomConversionInput>,
    ) -> UomResult<RegistrationPlan> {
        let code = attributes.code.trim().to_string();
        if code.is_empty() {
            return Err(UomError::invalid_value("custom unit code must not be empty"));
        }
        let name = attributes.name.trim().to_string();
        if name.is_empty() {
            return Err(UomError::invalid_value("custom unit name must not be empty"));
        }

        if AliasResolver::new(self.registry).resolve(&code).is_some() {
            return Err(UomError::DuplicateUnitCode {
                code,
                scope: "registry".to_string(),
            });
        }

        let unit_type = self.registry.resolve_type(&attributes.unit_type)?;
        let conversion_factor = self.stored_factor(
            attributes.conversion_factor.to_decimal()?,
            "conversion factor",
        )?;

        let planned = conversions
            .into_iter()
            .map(|input| self.plan_conversion(&code, unit_type.id, input))
            .collect::<UomResult<Vec<_>>>()?;

        Ok(RegistrationPlan {
            code,
            name,
            symbol: attributes.symbol,
            description: attributes.description,
            owner,
            type_id: unit_type.id,
            conversion_factor,
            conversions: planned,
        })
    }

    fn plan_conversion(
        &self,
        code: &str,
        type_id: UnitTypeId,
        input: CustomConversionInput,
    ) -> UomResult<PlannedConversion> {
        let target = input.target.trim().to_string();
        let invalid = |reason: String| UomError::InvalidConversionTarget {
            target: target.clone(),
            reason,
        };

        if target.is_empty() {
            return Err(invalid("target is empty".to_string()));
        }
        if normalize(&target) == normalize(code) {
            return Err(invalid("a unit cannot convert to itself".to_string()));
        }

        let factor = self.stored_factor(input.factor.to_decimal()?, "conversion factor")?;

        let planned_target = match self.registry.get_unit(&UnitRef::from(target.as_str())) {
            Ok(unit) if unit.type_id != type_id => {
                return Err(invalid(format!(
                    "{} is {}, expected {}",
                    unit.code,
                    self.registry.type_label(unit.type_id),
                    self.registry.type_label(type_id)
                )));
            }
            Ok(unit) => PlannedTarget::Unit(unit.id),
            Err(_) => PlannedTarget::Custom { code: target.clone() },
        };

        Ok(PlannedConversion {
            target: planned_target,
            factor,
            is_linear: input.is_linear,
        })
    }

    fn stored_factor(&self, factor: Decimal, what: &str) -> UomResult<Decimal> {
        let factor = ensure_positive(factor, what)?;
        let stored = to_fixed_scale(factor, self.factor_scale)?;
        if stored.is_zero() {
            return Err(UomError::invalid_value(format!(
                "{what} {factor} rounds to zero at {} fractional digits",
                self.factor_scale
            )));
        }
        Ok(stored)
    }

    /// Validate and persist a custom unit with its conversions, all or
    /// nothing.
    #[instrument(
        skip(self, attributes, conversions),
        fields(code = %attributes.code, scope = %scope_label(owner.as_ref())),
        err
    )]
    pub fn register(
        &self,
        attributes: NewCustomUnit,
        owner: Option<Owner>,
        conversions: Vec<CustomConversionInput>,
    ) -> UomResult<CustomUnit> {
        self.register_inner(attributes, owner, conversions)
            .map(|(unit, _)| unit)
    }

    /// [`register`](Self::register), then publish
    /// [`UomEvent::CustomUnitRegistered`]. The unit is already persisted when
    /// publishing, so a bus failure is traced and the unit still returned.
    #[instrument(
        skip(self, attributes, conversions, bus),
        fields(code = %attributes.code, scope = %scope_label(owner.as_ref())),
        err
    )]
    pub fn register_and_publish<B>(
        &self,
        attributes: NewCustomUnit,
        owner: Option<Owner>,
        conversions: Vec<CustomConversionInput>,
        bus: &B,
    ) -> UomResult<CustomUnit>
    where
        B: EventBus<EventEnvelope<UomEvent>>,
    {
        let (unit, conversion_count) = self.register_inner(attributes, owner, conversions)?;

        let event = UomEvent::CustomUnitRegistered(CustomUnitRegistered::from_unit(&unit, conversion_count));
        let envelope = EventEnvelope::wrap(event.tenant_id(), event);
        if let Err(err) = bus.publish(envelope) {
            tracing::warn!(unit_id = %unit.id, error = ?err, "failed to publish custom unit registration");
        }

        Ok(unit)
    }

    fn register_inner(
        &self,
        attributes: NewCustomUnit,
        owner: Option<Owner>,
        conversions: Vec<CustomConversionInput>,
    ) -> UomResult<(CustomUnit, usize)> {
        let plan = self.plan(attributes, owner, conversions)?;
        let (unit, conversions) = self.store.insert(&plan)?;

        tracing::info!(
            unit_id = %unit.id,
            code = %unit.code,
            scope = %plan.scope(),
            conversions = conversions.len(),
            "custom unit registered"
        );

        Ok((unit, conversions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{ConversionTarget, InMemoryCustomUnitStore, OwnerKind};
    use crate::seed;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use unitforge_core::TenantId;
    use unitforge_events::InMemoryEventBus;
    use uuid::Uuid;

    fn inventory_item(id: u128) -> Owner {
        Owner::new(OwnerKind::InventoryItem, Uuid::from_u128(id))
    }

    fn pallet() -> NewCustomUnit {
        NewCustomUnit::new("PALLET", "Pallet", "mass", 4).with_symbol("plt")
    }

    #[test]
    fn registers_with_fixed_scale_factors() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());

        let unit = registrar
            .register(pallet(), Some(inventory_item(7)), vec![CustomConversionInput::new("KG", 4)])
            .unwrap();

        assert_eq!(unit.code, "PALLET");
        assert_eq!(unit.conversion_factor.to_string(), "4.000000000000");

        let conversions = registrar.store().conversions_from(unit.id).unwrap();
        assert_eq!(conversions.len(), 1);
        assert_eq!(conversions[0].target, ConversionTarget::Unit(seed::KG));
        assert_eq!(conversions[0].factor.to_string(), "4.000000000000");
    }

    #[test]
    fn duplicate_code_for_same_owner_is_rejected() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());
        let owner = Some(inventory_item(7));

        registrar.register(pallet(), owner, vec![]).unwrap();
        let err = registrar
            .register(NewCustomUnit::new("pallet", "Pallet again", "mass", 5), owner, vec![])
            .unwrap_err();
        match err {
            UomError::DuplicateUnitCode { scope, .. } => assert!(scope.starts_with("inventory_item:")),
            other => panic!("expected DuplicateUnitCode, got {other:?}"),
        }
    }

    #[test]
    fn same_code_is_free_in_other_scopes() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());

        registrar.register(pallet(), Some(inventory_item(7)), vec![]).unwrap();
        registrar.register(pallet(), Some(inventory_item(8)), vec![]).unwrap();
        registrar.register(pallet(), None, vec![]).unwrap();
        assert!(matches!(
            registrar.register(pallet(), None, vec![]),
            Err(UomError::DuplicateUnitCode { scope, .. }) if scope == "global"
        ));
    }

    #[test]
    fn registry_codes_and_aliases_cannot_be_shadowed() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());
        for code in ["kg", "pound"] {
            let err = registrar
                .register(NewCustomUnit::new(code, "Shadow", "mass", 1), None, vec![])
                .unwrap_err();
            assert!(matches!(err, UomError::DuplicateUnitCode { scope, .. } if scope == "registry"));
        }
    }

    #[test]
    fn mismatched_target_type_persists_nothing() {
        let reg = seed::baseline().unwrap();
        let store = Arc::new(InMemoryCustomUnitStore::new());
        let registrar = CustomUnitRegistrar::new(&reg, Arc::clone(&store));
        let owner = Some(inventory_item(7));

        let err = registrar
            .register(pallet(), owner, vec![
                CustomConversionInput::new("KG", 4),
                CustomConversionInput::new("M", 1),
            ])
            .unwrap_err();
        assert!(matches!(err, UomError::InvalidConversionTarget { target, .. } if target == "M"));
        assert!(store.find(owner.as_ref(), "PALLET").unwrap().is_none());
    }

    #[test]
    fn unknown_custom_target_persists_nothing() {
        let reg = seed::baseline().unwrap();
        let store = Arc::new(InMemoryCustomUnitStore::new());
        let registrar = CustomUnitRegistrar::new(&reg, Arc::clone(&store));

        let err = registrar
            .register(pallet(), None, vec![CustomConversionInput::new("CRATE", 2)])
            .unwrap_err();
        assert!(matches!(err, UomError::InvalidConversionTarget { .. }));
        assert!(store.list_for_owner(None).unwrap().is_empty());
    }

    #[test]
    fn conversions_between_custom_units_of_one_owner() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());
        let owner = Some(inventory_item(7));

        let crate_unit = registrar
            .register(NewCustomUnit::new("CRATE", "Crate", "mass", 25), owner, vec![])
            .unwrap();
        let pallet = registrar
            .register(pallet(), owner, vec![CustomConversionInput::new("crate", dec!(0.16))])
            .unwrap();

        let edges = registrar.store().conversions_from(pallet.id).unwrap();
        assert_eq!(edges[0].target, ConversionTarget::Custom(crate_unit.id));
    }

    #[test]
    fn invalid_attributes_are_rejected_before_storage() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());

        let cases = [
            NewCustomUnit::new("  ", "Blank", "mass", 1),
            NewCustomUnit::new("BLANK", "", "mass", 1),
            NewCustomUnit::new("NEG", "Negative", "mass", -1),
            NewCustomUnit::new("TINY", "Tiny", "mass", "0.0000000000001"),
            NewCustomUnit::new("HUGE", "Huge", "mass", "100000000000000000"),
        ];
        for attributes in cases {
            assert!(matches!(
                registrar.register(attributes, None, vec![]),
                Err(UomError::InvalidValue(_))
            ));
        }
        assert!(matches!(
            registrar.register(NewCustomUnit::new("X", "X", "luminosity", 1), None, vec![]),
            Err(UomError::TypeNotFound(_))
        ));
        assert!(matches!(
            registrar.register(pallet(), None, vec![CustomConversionInput::new("pallet", 1)]),
            Err(UomError::InvalidConversionTarget { .. })
        ));
        assert!(registrar.store().list_for_owner(None).unwrap().is_empty());
    }

    #[test]
    fn register_and_publish_emits_event() {
        let reg = seed::baseline().unwrap();
        let registrar = CustomUnitRegistrar::new(&reg, InMemoryCustomUnitStore::new());
        let bus = InMemoryEventBus::new();
        let events = bus.subscribe();
        let tenant = TenantId::new();

        let unit = registrar
            .register_and_publish(pallet(), Some(Owner::tenant(tenant)), vec![
                CustomConversionInput::new("KG", 4),
            ], &bus)
            .unwrap();

        let envelope = events.try_recv().unwrap();
        assert_eq!(envelope.event_type(), "uom.custom_unit.registered");
        assert_eq!(envelope.tenant_id(), Some(tenant));
        let UomEvent::CustomUnitRegistered(payload) = envelope.payload();
        assert_eq!(payload.unit_id, unit.id);
        assert_eq!(payload.conversion_count, 1);
    }
}
