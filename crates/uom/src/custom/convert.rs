use rust_decimal::Decimal;
use tracing::instrument;

use crate::decimal::{NumericInput, checked_div, checked_mul, round_to};
use crate::error::{UomError, UomResult};
use crate::linear::LinearConverter;
use crate::model::{Unit, UnitRef, UnitTypeId};
use crate::registry::UnitRegistry;

use super::owner::Owner;
use super::store::CustomUnitStore;
use super::{ConversionTarget, CustomUnit};

/// A unit found either in the registry or among custom units.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedUnit<'r> {
    Registry(&'r Unit),
    Custom(CustomUnit),
}

impl ResolvedUnit<'_> {
    pub fn code(&self) -> &str {
        match self {
            ResolvedUnit::Registry(u) => &u.code,
            ResolvedUnit::Custom(u) => &u.code,
        }
    }

    pub fn type_id(&self) -> UnitTypeId {
        match self {
            ResolvedUnit::Registry(u) => u.type_id,
            ResolvedUnit::Custom(u) => u.type_id,
        }
    }

    fn as_target(&self) -> ConversionTarget {
        match self {
            ResolvedUnit::Registry(u) => ConversionTarget::Unit(u.id),
            ResolvedUnit::Custom(u) => ConversionTarget::Custom(u.id),
        }
    }
}

/// Converts between custom units and registry units of the same type.
///
/// A declared custom conversion edge is used when one links the two units
/// (in either direction); otherwise the value goes through the type's base
/// unit using each custom unit's `conversion_factor`.
pub struct CustomUnitConverter<'r, S: ?Sized> {
    linear: LinearConverter<'r>,
    store: &'r S,
}

impl<'r, S> CustomUnitConverter<'r, S>
where
    S: CustomUnitStore + ?Sized,
{
    pub fn new(registry: &'r UnitRegistry, store: &'r S) -> Self {
        Self {
            linear: LinearConverter::new(registry),
            store,
        }
    }

    pub fn with_linear(linear: LinearConverter<'r>, store: &'r S) -> Self {
        Self { linear, store }
    }

    /// Registry first, then the owner's custom units, then global custom units.
    pub fn resolve(&self, identifier: &str, owner: Option<&Owner>) -> UomResult<ResolvedUnit<'r>> {
        if let Ok(unit) = self.linear.registry().get_unit(&UnitRef::from(identifier)) {
            return Ok(ResolvedUnit::Registry(unit));
        }
        if let Some(owner) = owner {
            if let Some(unit) = self.store.find(Some(owner), identifier)? {
                return Ok(ResolvedUnit::Custom(unit));
            }
        }
        self.store
            .find(None, identifier)?
            .map(ResolvedUnit::Custom)
            .ok_or_else(|| UomError::unit_not_found(identifier))
    }

    #[instrument(level = "debug", skip(self, value), err)]
    pub fn convert(
        &self,
        value: impl Into<NumericInput>,
        from: &str,
        to: &str,
        owner: Option<&Owner>,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        let value = value.into().to_decimal()?;
        let from = self.resolve(from, owner)?;
        let to = self.resolve(to, owner)?;
        self.convert_resolved(value, &from, &to, precision)
    }

    pub fn convert_resolved(
        &self,
        value: Decimal,
        from: &ResolvedUnit<'r>,
        to: &ResolvedUnit<'r>,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        if let (ResolvedUnit::Registry(a), ResolvedUnit::Registry(b)) = (from, to) {
            return Ok(self.linear.convert_units(value, a, b, precision)?.value);
        }

        if from.type_id() != to.type_id() {
            let registry = self.linear.registry();
            return Err(UomError::IncompatibleUnitTypes {
                from: from.code().to_string(),
                to: to.code().to_string(),
                from_type: registry.type_label(from.type_id()),
                to_type: registry.type_label(to.type_id()),
            });
        }

        if from.as_target() == to.as_target() {
            return Ok(round_to(value, precision));
        }

        if let Some(result) = self.via_declared_edge(value, from, to)? {
            tracing::debug!(from = from.code(), to = to.code(), "custom conversion edge applied");
            return Ok(round_to(result, precision));
        }

        let base_value = self.to_base(value, from)?;
        let result = self.from_base(base_value, to)?;
        Ok(round_to(result, precision))
    }

    fn via_declared_edge(
        &self,
        value: Decimal,
        from: &ResolvedUnit<'r>,
        to: &ResolvedUnit<'r>,
    ) -> UomResult<Option<Decimal>> {
        if let ResolvedUnit::Custom(source) = from {
            let target = to.as_target();
            if let Some(edge) = self
                .store
                .conversions_from(source.id)?
                .into_iter()
                .find(|c| c.target == target)
            {
                return checked_mul(value, edge.factor).map(Some);
            }
        }
        if let ResolvedUnit::Custom(source) = to {
            let target = from.as_target();
            if let Some(edge) = self
                .store
                .conversions_from(source.id)?
                .into_iter()
                .find(|c| c.target == target)
            {
                return checked_div(value, edge.factor).map(Some);
            }
        }
        Ok(None)
    }

    fn base_unit(&self, unit: &ResolvedUnit<'r>) -> UomResult<&'r Unit> {
        let registry = self.linear.registry();
        registry
            .base_unit_of(unit.type_id())
            .ok_or_else(|| UomError::no_path(unit.code(), format!("base unit of {}", registry.type_label(unit.type_id()))))
    }

    fn to_base(&self, value: Decimal, unit: &ResolvedUnit<'r>) -> UomResult<Decimal> {
        match unit {
            ResolvedUnit::Custom(custom) => checked_mul(value, custom.conversion_factor),
            ResolvedUnit::Registry(u) => {
                let base = self.base_unit(unit)?;
                Ok(self.linear.convert_units(value, u, base, None)?.value)
            }
        }
    }

    fn from_base(&self, value: Decimal, unit: &ResolvedUnit<'r>) -> UomResult<Decimal> {
        match unit {
            ResolvedUnit::Custom(custom) => checked_div(value, custom.conversion_factor),
            ResolvedUnit::Registry(u) => {
                let base = self.base_unit(unit)?;
                Ok(self.linear.convert_units(value, base, u, None)?.value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{
        CustomConversionInput, CustomUnitRegistrar, InMemoryCustomUnitStore, NewCustomUnit, OwnerKind,
    };
    use crate::seed;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(id: u128) -> Owner {
        Owner::new(OwnerKind::InventoryItem, Uuid::from_u128(id))
    }

    #[test]
    fn custom_unit_converts_through_base_unit() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        let owner = item(7);
        CustomUnitRegistrar::new(&reg, &store)
            .register(NewCustomUnit::new("SACK", "Sack", "mass", 50), Some(owner), vec![])
            .unwrap();

        let c = CustomUnitConverter::new(&reg, &store);
        assert_eq!(c.convert(2, "SACK", "KG", Some(&owner), None).unwrap(), dec!(100));
        assert_eq!(c.convert(1000, "g", "sack", Some(&owner), None).unwrap(), dec!(0.02));
    }

    #[test]
    fn declared_edge_is_preferred_over_base_factor() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        // Base factor says 4 kg, the declared edge to LB says 9 lb.
        CustomUnitRegistrar::new(&reg, &store)
            .register(
                NewCustomUnit::new("BRICK", "Brick", "mass", 4),
                None,
                vec![CustomConversionInput::new("LB", 9)],
            )
            .unwrap();

        let c = CustomUnitConverter::new(&reg, &store);
        assert_eq!(c.convert(2, "BRICK", "LB", None, None).unwrap(), dec!(18));
        assert_eq!(c.convert(18, "LB", "BRICK", None, None).unwrap(), dec!(2));
        assert_eq!(c.convert(2, "BRICK", "KG", None, None).unwrap(), dec!(8));
    }

    #[test]
    fn owner_scope_shadows_global_scope() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        let registrar = CustomUnitRegistrar::new(&reg, &store);
        registrar
            .register(NewCustomUnit::new("BAG", "Bag", "mass", 10), None, vec![])
            .unwrap();
        registrar
            .register(NewCustomUnit::new("BAG", "Big bag", "mass", 25), Some(item(7)), vec![])
            .unwrap();

        let c = CustomUnitConverter::new(&reg, &store);
        assert_eq!(c.convert(1, "BAG", "KG", Some(&item(7)), None).unwrap(), dec!(25));
        assert_eq!(c.convert(1, "BAG", "KG", Some(&item(8)), None).unwrap(), dec!(10));
        assert_eq!(c.convert(1, "BAG", "KG", None, None).unwrap(), dec!(10));
    }

    #[test]
    fn custom_to_registry_of_other_type_fails() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        CustomUnitRegistrar::new(&reg, &store)
            .register(NewCustomUnit::new("SACK", "Sack", "mass", 50), None, vec![])
            .unwrap();

        let c = CustomUnitConverter::new(&reg, &store);
        assert!(matches!(
            c.convert(1, "SACK", "M", None, None),
            Err(UomError::IncompatibleUnitTypes { .. })
        ));
        assert!(matches!(
            c.convert(1, "SACK", "CRATE", None, None),
            Err(UomError::UnitNotFound(_))
        ));
    }

    #[test]
    fn registry_pairs_use_the_linear_converter() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        let c = CustomUnitConverter::new(&reg, &store);
        assert_eq!(c.convert(100, "C", "F", None, None).unwrap(), dec!(212));
    }

    #[test]
    fn custom_units_relative_to_affine_base() {
        let reg = seed::baseline().unwrap();
        let store = InMemoryCustomUnitStore::new();
        // One "mK" step is a thousandth of a kelvin.
        CustomUnitRegistrar::new(&reg, &store)
            .register(NewCustomUnit::new("MILLIK", "Millikelvin", "temperature", dec!(0.001)), None, vec![])
            .unwrap();

        let c = CustomUnitConverter::new(&reg, &store);
        assert_eq!(c.convert(0, "C", "MILLIK", None, None).unwrap(), dec!(273150));
    }
}
