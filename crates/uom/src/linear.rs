//! Linear unit converter: simple units of one type, over the conversion graph.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::decimal::{NumericInput, checked_div, checked_mul, round_to};
use crate::error::{UomError, UomResult};
use crate::graph::Edge;
use crate::log::{ConversionLogSink, record_quietly};
use crate::model::{ConversionLog, Unit, UnitId, UnitRef};
use crate::registry::UnitRegistry;

/// Path search bound used unless configured otherwise: a direct edge or one
/// intermediate unit.
pub const DEFAULT_MAX_HOPS: usize = 2;

/// Result of a conversion with the details needed for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub input: Decimal,
    /// Rounded to the requested precision, if any.
    pub value: Decimal,
    /// Product of the multiplicative factors walked (offsets excluded).
    pub factor_used: Decimal,
    pub from: UnitId,
    pub to: UnitId,
    /// Codes of every unit on the path, endpoints included.
    pub path: Vec<String>,
}

impl ConversionOutcome {
    pub fn to_log(&self) -> ConversionLog {
        ConversionLog {
            id: Uuid::now_v7(),
            source_unit_id: self.from,
            target_unit_id: self.to,
            factor_used: self.factor_used,
            value: self.input,
            result: self.value,
            metadata: Some(serde_json::json!({ "path": self.path })),
            performed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearConverter<'r> {
    registry: &'r UnitRegistry,
    max_hops: usize,
}

impl<'r> LinearConverter<'r> {
    pub fn new(registry: &'r UnitRegistry) -> Self {
        Self {
            registry,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn registry(&self) -> &'r UnitRegistry {
        self.registry
    }

    pub fn convert(
        &self,
        value: impl Into<NumericInput>,
        from: impl Into<UnitRef>,
        to: impl Into<UnitRef>,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        Ok(self.convert_detailed(value, from, to, precision)?.value)
    }

    pub fn convert_detailed(
        &self,
        value: impl Into<NumericInput>,
        from: impl Into<UnitRef>,
        to: impl Into<UnitRef>,
        precision: Option<u32>,
    ) -> UomResult<ConversionOutcome> {
        let value = value.into().to_decimal()?;
        let from = self.registry.get_unit(&from.into())?;
        let to = self.registry.get_unit(&to.into())?;
        self.convert_units(value, from, to, precision)
    }

    /// Convert and append a [`ConversionLog`] to `sink`. A failing sink never
    /// fails the conversion.
    pub fn convert_and_log(
        &self,
        value: impl Into<NumericInput>,
        from: impl Into<UnitRef>,
        to: impl Into<UnitRef>,
        precision: Option<u32>,
        sink: &dyn ConversionLogSink,
    ) -> UomResult<Decimal> {
        let outcome = self.convert_detailed(value, from, to, precision)?;
        record_quietly(sink, outcome.to_log());
        Ok(outcome.value)
    }

    #[instrument(level = "debug", skip_all, fields(from = %from.code, to = %to.code), err)]
    pub fn convert_units(
        &self,
        value: Decimal,
        from: &Unit,
        to: &Unit,
        precision: Option<u32>,
    ) -> UomResult<ConversionOutcome> {
        if from.id == to.id {
            return Ok(ConversionOutcome {
                input: value,
                value: round_to(value, precision),
                factor_used: Decimal::ONE,
                from: from.id,
                to: to.id,
                path: vec![from.code.clone()],
            });
        }

        let edges = self.plan(from, to)?;
        let mut current = value;
        let mut factor = Decimal::ONE;
        let mut path = Vec::with_capacity(edges.len() + 1);
        path.push(from.code.clone());

        for edge in &edges {
            let conversion = self.registry.conversion(edge.conversion_id).ok_or_else(|| {
                UomError::invalid_definition(format!("conversion #{} vanished", edge.conversion_id))
            })?;
            if edge.forward {
                current = conversion.apply_forward(current)?;
                factor = checked_mul(factor, conversion.factor)?;
            } else {
                current = conversion.apply_backward(current)?;
                factor = checked_div(factor, conversion.factor)?;
            }
            if let Some(unit) = self.registry.unit(edge.to) {
                path.push(unit.code.clone());
            }
        }

        tracing::debug!(hops = edges.len(), path = ?path, "conversion path applied");

        Ok(ConversionOutcome {
            input: value,
            value: round_to(current, precision),
            factor_used: factor,
            from: from.id,
            to: to.id,
            path,
        })
    }

    /// Multiplicative factor between two units, ignoring offsets: how many
    /// `to` one `from` spans. Affine edges contribute only their slope, which
    /// is the right factor for differences and rates (°C/s → °F/s).
    pub fn scale_factor(&self, from: &Unit, to: &Unit) -> UomResult<Decimal> {
        let (numerator, denominator) = self.scale_ratio(from, to)?;
        checked_div(numerator, denominator)
    }

    /// [`scale_factor`](Self::scale_factor) as an unreduced fraction, so
    /// callers composing several factors divide only once.
    pub fn scale_ratio(&self, from: &Unit, to: &Unit) -> UomResult<(Decimal, Decimal)> {
        if from.id == to.id {
            return Ok((Decimal::ONE, Decimal::ONE));
        }
        self.plan(from, to)?
            .iter()
            .try_fold((Decimal::ONE, Decimal::ONE), |(num, den), edge| {
                let conversion = self.registry.conversion(edge.conversion_id).ok_or_else(|| {
                    UomError::invalid_definition(format!("conversion #{} vanished", edge.conversion_id))
                })?;
                if edge.forward {
                    Ok((checked_mul(num, conversion.factor)?, den))
                } else {
                    Ok((num, checked_mul(den, conversion.factor)?))
                }
            })
    }

    fn plan(&self, from: &Unit, to: &Unit) -> UomResult<Vec<Edge>> {
        if from.type_id != to.type_id {
            return Err(UomError::IncompatibleUnitTypes {
                from: from.code.clone(),
                to: to.code.clone(),
                from_type: self.registry.type_label(from.type_id),
                to_type: self.registry.type_label(to.type_id),
            });
        }

        self.registry
            .graph(from.type_id)
            .and_then(|graph| graph.find_path(from.id, to.id, self.max_hops))
            .ok_or_else(|| UomError::no_path(&from.code, &to.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{InMemoryConversionLog, LogSinkError};
    use crate::model::{Conversion, ConversionId, Direction, UnitType, UnitTypeId};
    use crate::seed;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn baseline() -> UnitRegistry {
        seed::baseline().unwrap()
    }

    #[test]
    fn direct_edge_conversion() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        assert_eq!(c.convert("2.5", "KG", "G", None).unwrap(), dec!(2500));
        assert_eq!(c.convert(2500, "g", "kilogram", None).unwrap(), dec!(2.5));
        assert_eq!(c.convert(1, "pound", "ounce", None).unwrap(), dec!(16));
    }

    #[test]
    fn identity_is_exact_and_honours_precision() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        assert_eq!(c.convert(dec!(1.23456), "KG", "kg", None).unwrap(), dec!(1.23456));
        assert_eq!(c.convert(dec!(1.23456), "KG", "KG", Some(2)).unwrap(), dec!(1.23));
    }

    #[test]
    fn floats_do_not_drift() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        assert_eq!(c.convert(0.1_f64, "KG", "G", None).unwrap(), dec!(100));
    }

    #[test]
    fn type_mismatch_fails() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        let err = c.convert(1, "KG", "M", None).unwrap_err();
        match err {
            UomError::IncompatibleUnitTypes { from_type, to_type, .. } => {
                assert_eq!(from_type, "mass");
                assert_eq!(to_type, "length");
            }
            other => panic!("expected IncompatibleUnitTypes, got {other:?}"),
        }
    }

    #[test]
    fn unknown_units_fail_before_anything_else() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        assert_eq!(
            c.convert(1, "KG", "stone", None).unwrap_err(),
            UomError::UnitNotFound("stone".to_string())
        );
    }

    #[test]
    fn affine_temperature_edges_and_two_hop_paths() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        assert_eq!(c.convert(100, "C", "F", None).unwrap(), dec!(212));
        assert_eq!(c.convert(-40, "F", "C", None).unwrap(), dec!(-40));

        let outcome = c.convert_detailed(212, "F", "K", None).unwrap();
        assert_eq!(outcome.value, dec!(373.15));
        assert_eq!(outcome.path, vec!["F", "C", "K"]);
    }

    #[test]
    fn two_hop_path_through_shared_neighbour() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        let outcome = c.convert_detailed(1, "DZ", "CS", None).unwrap();
        assert_eq!(outcome.value, dec!(0.5));
        assert_eq!(outcome.factor_used, dec!(0.5));
        assert_eq!(outcome.path, vec!["DZ", "EA", "CS"]);
    }

    #[test]
    fn hop_limit_controls_reachability() {
        let reg = baseline();
        // KM -> M -> CM -> IN needs three hops.
        let err = LinearConverter::new(&reg).convert(1, "KM", "IN", None).unwrap_err();
        assert!(matches!(err, UomError::NoConversionPath { .. }));

        let inches = LinearConverter::new(&reg)
            .with_max_hops(3)
            .convert(1, "KM", "IN", Some(4))
            .unwrap();
        assert_eq!(inches, dec!(39370.0787));
    }

    fn isolated_registry(conversions: Vec<Conversion>) -> UnitRegistry {
        let mut b = UnitRegistry::builder();
        b.add_type(UnitType {
            id: UnitTypeId(1),
            name: "Widgets".to_string(),
            slug: "widgets".to_string(),
            description: None,
        });
        for (id, code) in [(1, "A"), (2, "B"), (3, "C"), (4, "D")] {
            b.add_unit(Unit {
                id: UnitId(id),
                code: code.to_string(),
                name: code.to_string(),
                type_id: UnitTypeId(1),
                symbol: None,
                is_base: false,
                metadata: None,
            });
        }
        for c in conversions {
            b.add_conversion(c);
        }
        b.build().unwrap()
    }

    fn edge(id: i64, source: i64, target: i64) -> Conversion {
        Conversion {
            id: ConversionId(id),
            source_unit_id: UnitId(source),
            target_unit_id: UnitId(target),
            factor: dec!(2),
            offset: Decimal::ZERO,
            direction: Direction::ToTarget,
            is_linear: true,
        }
    }

    #[test]
    fn same_type_without_conversions_has_no_path() {
        let reg = isolated_registry(vec![]);
        let err = LinearConverter::new(&reg).convert(1, "A", "B", None).unwrap_err();
        assert_eq!(err, UomError::no_path("A", "B"));
    }

    #[test]
    fn cyclic_definitions_terminate() {
        let reg = isolated_registry(vec![edge(1, 1, 2), edge(2, 2, 3), edge(3, 3, 1)]);
        let c = LinearConverter::new(&reg).with_max_hops(usize::MAX);
        assert!(matches!(c.convert(1, "A", "D", None), Err(UomError::NoConversionPath { .. })));
        assert_eq!(c.convert(1, "A", "C", None).unwrap(), dec!(4));
        // C -> A is a stored edge; A -> C must not reuse it backwards.
        assert_eq!(c.convert(1, "C", "A", None).unwrap(), dec!(2));
    }

    #[test]
    fn convert_and_log_records_audit_entry() {
        let reg = baseline();
        let sink = InMemoryConversionLog::new();
        let result = LinearConverter::new(&reg)
            .convert_and_log(3, "KG", "G", None, &sink)
            .unwrap();
        assert_eq!(result, dec!(3000));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let kg = reg.get_unit(&UnitRef::from("KG")).unwrap();
        assert_eq!(entries[0].source_unit_id, kg.id);
        assert_eq!(entries[0].factor_used, dec!(1000));
        assert_eq!(entries[0].value, dec!(3));
        assert_eq!(entries[0].result, dec!(3000));
        assert_eq!(entries[0].metadata, Some(serde_json::json!({ "path": ["KG", "G"] })));
    }

    #[test]
    fn failing_log_sink_does_not_fail_conversion() {
        struct Broken;
        impl ConversionLogSink for Broken {
            fn record(&self, _: ConversionLog) -> Result<(), LogSinkError> {
                Err(LogSinkError("unavailable".to_string()))
            }
        }

        let reg = baseline();
        let result = LinearConverter::new(&reg).convert_and_log(1, "KM", "M", None, &Broken);
        assert_eq!(result.unwrap(), dec!(1000));
    }

    #[test]
    fn scale_factor_ignores_offsets() {
        let reg = baseline();
        let c = LinearConverter::new(&reg);
        let celsius = reg.get_unit(&UnitRef::from("C")).unwrap();
        let fahrenheit = reg.get_unit(&UnitRef::from("F")).unwrap();
        assert_eq!(c.scale_factor(celsius, fahrenheit).unwrap(), dec!(1.8));
        assert_eq!(c.scale_ratio(fahrenheit, celsius).unwrap(), (dec!(1), dec!(1.8)));
    }

    fn scaled_value() -> impl Strategy<Value = Decimal> {
        (-1_000_000_000i64..1_000_000_000i64).prop_map(|n| Decimal::new(n, 4))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: converting there and back returns the input within rounding.
        #[test]
        fn round_trip_returns_input(
            v in scaled_value(),
            pair in prop::sample::select(vec![("KG", "LB"), ("C", "F"), ("GAL", "L"), ("H", "S"), ("F", "K"), ("MI", "KM")])
        ) {
            let reg = baseline();
            let c = LinearConverter::new(&reg);
            let there = c.convert(v, pair.0, pair.1, None).unwrap();
            let back = c.convert(there, pair.1, pair.0, Some(10)).unwrap();
            prop_assert_eq!(back, v);
        }

        /// Property: converting a unit to itself never changes the value.
        #[test]
        fn identity_is_exact(
            v in scaled_value(),
            code in prop::sample::select(vec!["KG", "G", "LB", "M", "KM", "S", "H", "C", "F", "EA"])
        ) {
            let reg = baseline();
            let c = LinearConverter::new(&reg);
            prop_assert_eq!(c.convert(v, code, code, None).unwrap(), v);
        }
    }
}
