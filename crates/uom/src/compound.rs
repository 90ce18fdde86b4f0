//! Compound unit converter (km/h ↔ m/s, g/cm³ ↔ kg/m³).
//!
//! Two compound units are compatible when their dimensional signatures match:
//! for each unit type, the sum of component exponents. Conversion rescales
//! every component to one anchor unit per type, raising each linear scale
//! factor to the component's exponent. Offsets play no part; a rate in °C/s
//! converts by slope only.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::decimal::{NumericInput, checked_div, checked_mul, checked_pow, round_to};
use crate::error::{UomError, UomResult};
use crate::linear::LinearConverter;
use crate::model::{CompoundComponent, CompoundRef, CompoundUnit, Unit, UnitId, UnitTypeId};
use crate::registry::UnitRegistry;

/// Sum of exponents per unit type, zero sums dropped.
pub type Signature = BTreeMap<UnitTypeId, i32>;

#[derive(Debug, Clone, Copy)]
pub struct CompoundUnitConverter<'r> {
    linear: LinearConverter<'r>,
}

impl<'r> CompoundUnitConverter<'r> {
    pub fn new(registry: &'r UnitRegistry) -> Self {
        Self {
            linear: LinearConverter::new(registry),
        }
    }

    /// Use a configured linear converter (e.g. a custom hop limit) for the
    /// per-component factors.
    pub fn with_linear(linear: LinearConverter<'r>) -> Self {
        Self { linear }
    }

    fn registry(&self) -> &'r UnitRegistry {
        self.linear.registry()
    }

    pub fn convert(
        &self,
        value: impl Into<NumericInput>,
        from: impl Into<CompoundRef>,
        to: impl Into<CompoundRef>,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        let value = value.into().to_decimal()?;
        let from = self.registry().compound(&from.into())?;
        let to = self.registry().compound(&to.into())?;
        self.convert_compounds(value, from, to, precision)
    }

    #[instrument(level = "debug", skip_all, fields(from = %from.label(), to = %to.label()), err)]
    pub fn convert_compounds(
        &self,
        value: Decimal,
        from: &CompoundUnit,
        to: &CompoundUnit,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        if from.id == to.id {
            return Ok(round_to(value, precision));
        }

        let from_units = self.component_units(from)?;
        let to_units = self.component_units(to)?;

        if signature(&from_units)? != signature(&to_units)? {
            return Err(UomError::IncompatibleCompoundUnits {
                from: from.label().to_string(),
                to: to.label().to_string(),
            });
        }

        let anchors = anchors(&to_units, &from_units);

        // Numerators and denominators are kept apart so exact ratios such as
        // 1000/3600 are only divided once, at the end.
        let mut numerator = Decimal::ONE;
        let mut denominator = Decimal::ONE;
        let mut fold = |(num, den): (Decimal, Decimal), exponent: i32| -> UomResult<()> {
            let (up, down) = if exponent > 0 { (num, den) } else { (den, num) };
            let power = exponent.unsigned_abs();
            numerator = checked_mul(numerator, checked_pow(up, power)?)?;
            denominator = checked_mul(denominator, checked_pow(down, power)?)?;
            Ok(())
        };

        for (unit, exponent) in &from_units {
            let anchor = self.anchor_for(&anchors, unit)?;
            fold(self.linear.scale_ratio(unit, anchor)?, *exponent)?;
        }
        for (unit, exponent) in &to_units {
            let anchor = self.anchor_for(&anchors, unit)?;
            fold(self.linear.scale_ratio(anchor, unit)?, *exponent)?;
        }

        let result = checked_div(checked_mul(value, numerator)?, denominator)?;
        Ok(round_to(result, precision))
    }

    /// Dimensional signature of a compound unit.
    pub fn signature_of(&self, compound: &CompoundUnit) -> UomResult<Signature> {
        signature(&self.component_units(compound)?)
    }

    fn component_units(&self, compound: &CompoundUnit) -> UomResult<Vec<(&'r Unit, i32)>> {
        compound
            .components
            .iter()
            .map(|CompoundComponent { unit_id, exponent }| {
                self.registry()
                    .unit(*unit_id)
                    .map(|unit| (unit, *exponent))
                    .ok_or_else(|| UomError::unit_not_found(format!("#{unit_id}")))
            })
            .collect()
    }

    fn anchor_for(&self, anchors: &BTreeMap<UnitTypeId, UnitId>, unit: &Unit) -> UomResult<&'r Unit> {
        anchors
            .get(&unit.type_id)
            .and_then(|id| self.registry().unit(*id))
            .ok_or_else(|| UomError::no_path(&unit.code, self.registry().type_label(unit.type_id)))
    }
}

fn signature(units: &[(&Unit, i32)]) -> UomResult<Signature> {
    let mut sig = Signature::new();
    for (unit, exponent) in units {
        let sum = sig.entry(unit.type_id).or_insert(0);
        *sum = sum
            .checked_add(*exponent)
            .ok_or_else(|| UomError::arithmetic(format!("exponent sum overflows for unit '{}'", unit.code)))?;
    }
    sig.retain(|_, exponent| *exponent != 0);
    Ok(sig)
}

/// First target component of each type, falling back to the first source
/// component for types that cancel out on the target side.
fn anchors(to: &[(&Unit, i32)], from: &[(&Unit, i32)]) -> BTreeMap<UnitTypeId, UnitId> {
    let mut anchors = BTreeMap::new();
    for (unit, _) in to.iter().chain(from) {
        anchors.entry(unit.type_id).or_insert(unit.id);
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompoundUnitId, MAX_COMPOUND_EXPONENT, UnitType};
    use crate::seed;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn baseline() -> UnitRegistry {
        seed::baseline().unwrap()
    }

    #[test]
    fn velocity_conversions() {
        let reg = baseline();
        let c = CompoundUnitConverter::new(&reg);
        assert_eq!(c.convert(36, "km/h", "m/s", None).unwrap(), dec!(10));
        assert_eq!(c.convert(10, "km/h", "m/s", Some(2)).unwrap(), dec!(2.78));
        assert_eq!(c.convert(10, "meters per second", "km/h", None).unwrap(), dec!(36));
        assert_eq!(c.convert(60, "mph", "km/h", None).unwrap(), dec!(96.56064));
        assert_eq!(c.convert(dec!(96.56064), "km/h", "mph", Some(6)).unwrap(), dec!(60));
    }

    #[test]
    fn density_with_cubed_denominator() {
        let reg = baseline();
        let c = CompoundUnitConverter::new(&reg);
        assert_eq!(c.convert(1, "g/cm3", "kg/m3", None).unwrap(), dec!(1000));
        assert_eq!(c.convert(dec!(7850), "kg/m3", "g/cm3", None).unwrap(), dec!(7.85));
    }

    #[test]
    fn identical_compound_only_rounds() {
        let reg = baseline();
        let c = CompoundUnitConverter::new(&reg);
        assert_eq!(c.convert(dec!(12.345), "km/h", "KM/H", Some(1)).unwrap(), dec!(12.3));
    }

    #[test]
    fn mismatched_signatures_fail() {
        let reg = baseline();
        let c = CompoundUnitConverter::new(&reg);
        // mass/volume vs mass/length³
        let err = c.convert(1, "g/L", "kg/m3", None).unwrap_err();
        assert_eq!(err, UomError::IncompatibleCompoundUnits {
            from: "g/L".to_string(),
            to: "kg/m3".to_string(),
        });
        assert!(matches!(
            c.convert(1, "km/h", "kg/m3", None),
            Err(UomError::IncompatibleCompoundUnits { .. })
        ));
    }

    #[test]
    fn unknown_compound_fails() {
        let reg = baseline();
        let c = CompoundUnitConverter::new(&reg);
        assert!(matches!(
            c.convert(1, "furlongs per fortnight", "m/s", None),
            Err(UomError::CompoundUnitNotFound(_))
        ));
    }

    #[test]
    fn signature_drops_cancelled_types() {
        let mut b = seed::baseline_builder();
        b.add_compound(CompoundUnit {
            id: CompoundUnitId(100),
            name: "metres per kilometre".to_string(),
            symbol: Some("m/km".to_string()),
            type_id: seed::LENGTH,
            components: vec![
                CompoundComponent {
                    unit_id: seed::M,
                    exponent: 1,
                },
                CompoundComponent {
                    unit_id: seed::KM,
                    exponent: -1,
                },
            ],
        });
        let reg = b.build().unwrap();
        let c = CompoundUnitConverter::new(&reg);
        let m_per_km = reg.compound(&CompoundRef::from("m/km")).unwrap();
        assert!(c.signature_of(m_per_km).unwrap().is_empty());
    }

    #[test]
    fn exponent_sum_overflow_is_an_error() {
        let reg = baseline();
        let metre = reg.unit(seed::M).unwrap();
        let km = reg.unit(seed::KM).unwrap();
        let err = signature(&[(metre, i32::MAX), (km, 1)]).unwrap_err();
        assert!(matches!(err, UomError::Arithmetic(_)));
    }

    #[test]
    fn largest_accepted_exponent_converts() {
        let mut b = seed::baseline_builder();
        let power = |id: i64, name: &str, unit_id: UnitId| CompoundUnit {
            id: CompoundUnitId(id),
            name: name.to_string(),
            symbol: None,
            type_id: seed::LENGTH,
            components: vec![CompoundComponent {
                unit_id,
                exponent: MAX_COMPOUND_EXPONENT as i32,
            }],
        };
        b.add_compound(power(100, "cm^12", seed::CM)).add_compound(power(101, "m^12", seed::M));
        let reg = b.build().unwrap();
        let c = CompoundUnitConverter::new(&reg);
        assert_eq!(
            c.convert(1, "cm^12", "m^12", None).unwrap(),
            dec!(0.000000000000000000000001)
        );
    }

    #[test]
    fn component_without_linear_path_fails() {
        let mut b = UnitRegistry::builder();
        b.add_type(UnitType {
            id: UnitTypeId(1),
            name: "Length".to_string(),
            slug: "length".to_string(),
            description: None,
        })
        .add_type(UnitType {
            id: UnitTypeId(2),
            name: "Time".to_string(),
            slug: "time".to_string(),
            description: None,
        });
        for (id, code, type_id) in [(1, "M", 1), (2, "LEAGUE", 1), (3, "S", 2)] {
            b.add_unit(Unit {
                id: UnitId(id),
                code: code.to_string(),
                name: code.to_string(),
                type_id: UnitTypeId(type_id),
                symbol: None,
                is_base: false,
                metadata: None,
            });
        }
        let rate = |id: i64, name: &str, length_unit: i64| CompoundUnit {
            id: CompoundUnitId(id),
            name: name.to_string(),
            symbol: None,
            type_id: UnitTypeId(1),
            components: vec![
                CompoundComponent {
                    unit_id: UnitId(length_unit),
                    exponent: 1,
                },
                CompoundComponent {
                    unit_id: UnitId(3),
                    exponent: -1,
                },
            ],
        };
        b.add_compound(rate(1, "m per s", 1)).add_compound(rate(2, "league per s", 2));
        let reg = b.build().unwrap();

        let err = CompoundUnitConverter::new(&reg)
            .convert(1, "league per s", "m per s", None)
            .unwrap_err();
        assert!(matches!(err, UomError::NoConversionPath { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: a compound conversion and its reverse compose to identity.
        #[test]
        fn compound_round_trip(
            n in -1_000_000_000i64..1_000_000_000i64,
            pair in prop::sample::select(vec![("km/h", "m/s"), ("mph", "m/s"), ("g/cm3", "kg/m3")])
        ) {
            let v = Decimal::new(n, 4);
            let reg = baseline();
            let c = CompoundUnitConverter::new(&reg);
            let there = c.convert(v, pair.0, pair.1, None).unwrap();
            let back = c.convert(there, pair.1, pair.0, Some(8)).unwrap();
            prop_assert_eq!(back, v);
        }
    }
}
