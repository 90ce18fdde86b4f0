//! Reference data records held by the [`UnitRegistry`](crate::UnitRegistry).
//!
//! Records mirror the persisted tables one-to-one; ids are the database's
//! numeric keys.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unitforge_core::{Entity, RecordId, ValueObject};

use crate::decimal::{checked_add, checked_div, checked_mul, checked_sub};
use crate::error::{UomError, UomResult};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub i64);

        impl $t {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a [`UnitType`].
    UnitTypeId
);
numeric_id!(
    /// Identifier of a canonical [`Unit`].
    UnitId
);
numeric_id!(ConversionId);
numeric_id!(CompoundUnitId);
numeric_id!(PackagingId);
numeric_id!(UnitGroupId);
numeric_id!(CustomUnitId);
numeric_id!(CustomConversionId);

/// A dimension (mass, length, time...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    pub id: UnitTypeId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

impl Entity for UnitType {
    type Id = UnitTypeId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Canonical unit within a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    /// Globally unique, compared case-insensitively.
    pub code: String,
    pub name: String,
    pub type_id: UnitTypeId,
    pub symbol: Option<String>,
    /// Reference unit of its type; custom unit factors are relative to it.
    pub is_base: bool,
    pub metadata: Option<serde_json::Value>,
}

impl Entity for Unit {
    type Id = UnitId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Alternate identifier for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub unit_id: UnitId,
    pub alias: String,
    pub is_preferred: bool,
}

/// Which way a stored conversion may be traversed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source → target applies the transform, target → source its inverse.
    Both,
    /// Only source → target.
    ToTarget,
    /// Only target → source (via the inverse transform).
    FromTarget,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Both => "both",
            Direction::ToTarget => "to_target",
            Direction::FromTarget => "from_target",
        }
    }

    pub fn allows_forward(self) -> bool {
        matches!(self, Direction::Both | Direction::ToTarget)
    }

    pub fn allows_backward(self) -> bool {
        matches!(self, Direction::Both | Direction::FromTarget)
    }
}

impl FromStr for Direction {
    type Err = UomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(Direction::Both),
            "to_target" => Ok(Direction::ToTarget),
            "from_target" => Ok(Direction::FromTarget),
            other => Err(UomError::invalid_definition(format!("unknown direction '{other}'"))),
        }
    }
}

/// Directed edge between two units of the same type:
/// `target = source * factor + offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: ConversionId,
    pub source_unit_id: UnitId,
    pub target_unit_id: UnitId,
    pub factor: Decimal,
    pub offset: Decimal,
    pub direction: Direction,
    pub is_linear: bool,
}

impl Conversion {
    /// Source-side value → target-side value.
    pub fn apply_forward(&self, value: Decimal) -> UomResult<Decimal> {
        checked_add(checked_mul(value, self.factor)?, self.offset)
    }

    /// Target-side value → source-side value.
    pub fn apply_backward(&self, value: Decimal) -> UomResult<Decimal> {
        checked_div(checked_sub(value, self.offset)?, self.factor)
    }
}

impl Entity for Conversion {
    type Id = ConversionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Largest accepted `|exponent|` of a compound component.
pub const MAX_COMPOUND_EXPONENT: u32 = 12;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundComponent {
    pub unit_id: UnitId,
    /// Non-zero, at most [`MAX_COMPOUND_EXPONENT`] in magnitude.
    pub exponent: i32,
}

impl ValueObject for CompoundComponent {}

/// A unit composed of base units raised to integer exponents (km/h = km¹·h⁻¹).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundUnit {
    pub id: CompoundUnitId,
    pub name: String,
    pub symbol: Option<String>,
    pub type_id: UnitTypeId,
    pub components: Vec<CompoundComponent>,
}

impl CompoundUnit {
    /// Symbol when present, name otherwise.
    pub fn label(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }
}

impl Entity for CompoundUnit {
    type Id = CompoundUnitId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Fixed ratio between a base unit and a package unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packaging {
    pub id: PackagingId,
    pub base_unit_id: UnitId,
    pub package_unit_id: UnitId,
    /// Base units per package; always > 0.
    pub quantity: u32,
    pub label: Option<String>,
}

impl Entity for Packaging {
    type Id = PackagingId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Packaging offered for one host item (a product sold by the case and by
/// the pallet has two).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemPackaging {
    pub item_id: RecordId,
    pub packaging_id: PackagingId,
}

impl ValueObject for ItemPackaging {}

/// Named set of units picked for a purpose ("shipping weights", "bar
/// measures"). Membership is free of type constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitGroup {
    pub id: UnitGroupId,
    /// Unique, compared case-insensitively.
    pub name: String,
    pub description: Option<String>,
    pub unit_ids: Vec<UnitId>,
}

impl Entity for UnitGroup {
    type Id = UnitGroupId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Append-only audit record of a performed conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionLog {
    pub id: Uuid,
    pub source_unit_id: UnitId,
    pub target_unit_id: UnitId,
    pub factor_used: Decimal,
    pub value: Decimal,
    pub result: Decimal,
    /// Free-form context, e.g. the unit path walked.
    pub metadata: Option<serde_json::Value>,
    pub performed_at: DateTime<Utc>,
}

/// Reference to a registry unit: numeric id, code, or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitRef {
    Id(UnitId),
    Identifier(String),
}

impl From<UnitId> for UnitRef {
    fn from(value: UnitId) -> Self {
        Self::Id(value)
    }
}

impl From<&Unit> for UnitRef {
    fn from(value: &Unit) -> Self {
        Self::Id(value.id)
    }
}

impl From<&str> for UnitRef {
    fn from(value: &str) -> Self {
        Self::Identifier(value.to_string())
    }
}

impl From<String> for UnitRef {
    fn from(value: String) -> Self {
        Self::Identifier(value)
    }
}

impl core::fmt::Display for UnitRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UnitRef::Id(id) => write!(f, "#{id}"),
            UnitRef::Identifier(s) => f.write_str(s),
        }
    }
}

/// Reference to a unit type: id or slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Id(UnitTypeId),
    Slug(String),
}

impl From<UnitTypeId> for TypeRef {
    fn from(value: UnitTypeId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for TypeRef {
    fn from(value: &str) -> Self {
        Self::Slug(value.to_string())
    }
}

impl core::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TypeRef::Id(id) => write!(f, "#{id}"),
            TypeRef::Slug(s) => f.write_str(s),
        }
    }
}

/// Reference to a compound unit: id, name, or symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompoundRef {
    Id(CompoundUnitId),
    Name(String),
}

impl From<CompoundUnitId> for CompoundRef {
    fn from(value: CompoundUnitId) -> Self {
        Self::Id(value)
    }
}

impl From<&CompoundUnit> for CompoundRef {
    fn from(value: &CompoundUnit) -> Self {
        Self::Id(value.id)
    }
}

impl From<&str> for CompoundRef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl core::fmt::Display for CompoundRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CompoundRef::Id(id) => write!(f, "#{id}"),
            CompoundRef::Name(s) => f.write_str(s),
        }
    }
}
