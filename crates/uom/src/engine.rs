//! Engine facade: one shared registry snapshot plus settings.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alias::AliasResolver;
use crate::compound::CompoundUnitConverter;
use crate::custom::{CustomUnitConverter, CustomUnitRegistrar, CustomUnitStore};
use crate::decimal::{NumericInput, STORED_FACTOR_SCALE};
use crate::error::UomResult;
use crate::linear::{ConversionOutcome, DEFAULT_MAX_HOPS, LinearConverter};
use crate::log::{ConversionLogSink, record_quietly};
use crate::model::{CompoundRef, UnitRef};
use crate::packaging::PackagingCalculator;
use crate::registry::UnitRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Applied when a caller passes no precision.
    pub default_precision: Option<u32>,
    pub max_path_hops: usize,
    /// Record every linear conversion to the log sink.
    pub log_conversions: bool,
    /// Fractional digits for stored custom factors.
    pub factor_scale: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_precision: None,
            max_path_hops: DEFAULT_MAX_HOPS,
            log_conversions: false,
            factor_scale: STORED_FACTOR_SCALE,
        }
    }
}

/// Entry point for hosts.
///
/// Cheap to clone; clones share the registry and the log sink. Reloading
/// reference data means building a new registry and a new engine.
#[derive(Clone)]
pub struct UomEngine {
    registry: Arc<UnitRegistry>,
    settings: EngineSettings,
    log_sink: Option<Arc<dyn ConversionLogSink>>,
}

impl core::fmt::Debug for UomEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UomEngine")
            .field("settings", &self.settings)
            .field("log_sink", &self.log_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl UomEngine {
    pub fn new(registry: impl Into<Arc<UnitRegistry>>, settings: EngineSettings) -> Self {
        Self {
            registry: registry.into(),
            settings,
            log_sink: None,
        }
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn ConversionLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn aliases(&self) -> AliasResolver<'_> {
        AliasResolver::new(&self.registry)
    }

    pub fn linear(&self) -> LinearConverter<'_> {
        LinearConverter::new(&self.registry).with_max_hops(self.settings.max_path_hops)
    }

    pub fn compound(&self) -> CompoundUnitConverter<'_> {
        CompoundUnitConverter::with_linear(self.linear())
    }

    pub fn packaging(&self) -> PackagingCalculator<'_> {
        PackagingCalculator::new(&self.registry)
    }

    pub fn registrar<S: CustomUnitStore>(&self, store: S) -> CustomUnitRegistrar<'_, S> {
        CustomUnitRegistrar::new(&self.registry, store).with_factor_scale(self.settings.factor_scale)
    }

    pub fn custom<'a, S>(&'a self, store: &'a S) -> CustomUnitConverter<'a, S>
    where
        S: CustomUnitStore + ?Sized,
    {
        CustomUnitConverter::with_linear(self.linear(), store)
    }

    fn precision(&self, requested: Option<u32>) -> Option<u32> {
        requested.or(self.settings.default_precision)
    }

    /// Linear conversion with the engine's default precision, logged when
    /// `log_conversions` is on and a sink is attached.
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
        let outcome = self
            .linear()
            .convert_detailed(value, from, to, self.precision(precision))?;
        if self.settings.log_conversions {
            if let Some(sink) = &self.log_sink {
                record_quietly(sink.as_ref(), outcome.to_log());
            }
        }
        Ok(outcome)
    }

    pub fn convert_compound(
        &self,
        value: impl Into<NumericInput>,
        from: impl Into<CompoundRef>,
        to: impl Into<CompoundRef>,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        self.compound().convert(value, from, to, self.precision(precision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::InMemoryConversionLog;
    use crate::seed;
    use rust_decimal_macros::dec;

    fn engine(settings: EngineSettings) -> UomEngine {
        UomEngine::new(seed::baseline().unwrap(), settings)
    }

    #[test]
    fn default_precision_applies_only_when_caller_passes_none() {
        let engine = engine(EngineSettings {
            default_precision: Some(2),
            ..EngineSettings::default()
        });
        assert_eq!(engine.convert(1, "LB", "KG", None).unwrap(), dec!(0.45));
        assert_eq!(engine.convert(1, "LB", "KG", Some(4)).unwrap(), dec!(0.4536));
        assert_eq!(engine.convert_compound(10, "km/h", "m/s", None).unwrap(), dec!(2.78));
    }

    #[test]
    fn logging_follows_settings() {
        let sink = InMemoryConversionLog::arc();

        let quiet = engine(EngineSettings::default()).with_log_sink(sink.clone());
        quiet.convert(1, "KM", "M", None).unwrap();
        assert!(sink.is_empty());

        let logged = engine(EngineSettings {
            log_conversions: true,
            ..EngineSettings::default()
        })
        .with_log_sink(sink.clone());
        logged.convert(1, "KM", "M", None).unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn hop_setting_reaches_converters() {
        let engine = engine(EngineSettings {
            max_path_hops: 3,
            ..EngineSettings::default()
        });
        assert_eq!(engine.convert(1, "KM", "IN", Some(2)).unwrap(), dec!(39370.08));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: EngineSettings = serde_json::from_str(r#"{"log_conversions": true}"#).unwrap();
        assert!(settings.log_conversions);
        assert_eq!(settings.max_path_hops, DEFAULT_MAX_HOPS);
        assert_eq!(settings.factor_scale, STORED_FACTOR_SCALE);
    }
}
