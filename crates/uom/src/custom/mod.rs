//! Owner-scoped custom units.
//!
//! A custom unit lives outside the global registry, belongs to an [`Owner`]
//! (or the global custom scope), and is defined by a linear factor relative to
//! its type's base unit. Optional [`CustomConversion`] edges link it directly
//! to registry units or to other custom units.
//!
//! Registration is split in two: [`CustomUnitRegistrar::plan`] validates
//! against the registry without side effects, then a [`CustomUnitStore`]
//! persists the whole plan atomically and enforces `(code, owner)` uniqueness.

mod convert;
mod owner;
mod registrar;
mod store;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use unitforge_core::Entity;

use crate::decimal::NumericInput;
use crate::model::{CustomConversionId, CustomUnitId, TypeRef, UnitId, UnitTypeId};

pub use convert::{CustomUnitConverter, ResolvedUnit};
pub use owner::{Owner, OwnerKind, scope_label};
pub use registrar::{CustomUnitRegistrar, PlannedConversion, PlannedTarget, RegistrationPlan};
pub use store::{CustomUnitStore, CustomUnitStoreError, InMemoryCustomUnitStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomUnit {
    pub id: CustomUnitId,
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub description: Option<String>,
    /// `None` = global custom scope.
    pub owner: Option<Owner>,
    pub type_id: UnitTypeId,
    /// Base-unit quantity per one of this unit (no offset).
    pub conversion_factor: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Entity for CustomUnit {
    type Id = CustomUnitId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Target of a custom conversion edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversionTarget {
    Unit(UnitId),
    Custom(CustomUnitId),
}

/// `target = source * factor`, from a custom unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConversion {
    pub id: CustomConversionId,
    pub source: CustomUnitId,
    pub target: ConversionTarget,
    /// Stored at a fixed scale (12 fractional digits by default).
    pub factor: Decimal,
    pub is_linear: bool,
}

/// Attributes of a unit to register.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomUnit {
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub unit_type: TypeRef,
    pub conversion_factor: NumericInput,
}

impl NewCustomUnit {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        unit_type: impl Into<TypeRef>,
        conversion_factor: impl Into<NumericInput>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            symbol: None,
            description: None,
            unit_type: unit_type.into(),
            conversion_factor: conversion_factor.into(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One requested conversion edge: target unit (code, alias, or id) and factor.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomConversionInput {
    pub target: String,
    pub factor: NumericInput,
    pub is_linear: bool,
}

impl CustomConversionInput {
    pub fn new(target: impl Into<String>, factor: impl Into<NumericInput>) -> Self {
        Self {
            target: target.into(),
            factor: factor.into(),
            is_linear: true,
        }
    }
}
