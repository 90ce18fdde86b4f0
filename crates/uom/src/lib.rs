//! `unitforge-uom`: unit-of-measure conversion engine.
//!
//! Pure domain logic over an immutable [`UnitRegistry`] snapshot:
//!
//! - [`AliasResolver`]: free-text identifiers → canonical units
//! - [`LinearConverter`]: simple units of the same type, over the conversion graph
//! - [`CompoundUnitConverter`]: rates/ratios composed per dimension exponent
//! - [`PackagingCalculator`]: package counts ↔ base quantities
//! - [`CustomUnitRegistrar`]: owner-scoped units, persisted through a [`CustomUnitStore`]
//!
//! All arithmetic is decimal (`rust_decimal`); binary floats are only accepted
//! as input and normalized through their shortest textual form.

pub mod alias;
pub mod compound;
pub mod custom;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod linear;
pub mod log;
pub mod model;
pub mod packaging;
pub mod registry;
pub mod seed;

pub use alias::AliasResolver;
pub use compound::CompoundUnitConverter;
pub use custom::{
    ConversionTarget, CustomConversion, CustomConversionInput, CustomUnit, CustomUnitConverter,
    CustomUnitRegistrar, CustomUnitStore, CustomUnitStoreError, InMemoryCustomUnitStore,
    NewCustomUnit, Owner, OwnerKind, PlannedConversion, PlannedTarget, RegistrationPlan,
    ResolvedUnit,
};
pub use decimal::NumericInput;
pub use engine::{EngineSettings, UomEngine};
pub use error::{UomError, UomResult};
pub use events::{CustomUnitRegistered, UomEvent};
pub use linear::{ConversionOutcome, DEFAULT_MAX_HOPS, LinearConverter};
pub use log::{ConversionLogSink, InMemoryConversionLog, LogSinkError};
pub use model::{
    Alias, CompoundComponent, CompoundRef, CompoundUnit, CompoundUnitId, Conversion,
    ConversionId, ConversionLog, CustomConversionId, CustomUnitId, Direction, ItemPackaging,
    MAX_COMPOUND_EXPONENT, Packaging, PackagingId, TypeRef, Unit, UnitGroup, UnitGroupId, UnitId,
    UnitRef, UnitType, UnitTypeId,
};
pub use packaging::{PackagingBreakdown, PackagingCalculator};
pub use registry::{UnitRegistry, UnitRegistryBuilder};
