//! Engine error model.

use thiserror::Error;
use unitforge_core::DomainError;

/// Result type used across the engine.
pub type UomResult<T> = Result<T, UomError>;

/// Conversion engine error.
///
/// Every variant is a local validation or lookup failure surfaced
/// synchronously to the caller; nothing is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UomError {
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("unit type not found: {0}")]
    TypeNotFound(String),

    #[error("compound unit not found: {0}")]
    CompoundUnitNotFound(String),

    #[error("incompatible unit types: {from} is {from_type}, {to} is {to_type}")]
    IncompatibleUnitTypes {
        from: String,
        to: String,
        from_type: String,
        to_type: String,
    },

    #[error("incompatible compound units: {from} and {to} have different dimensions")]
    IncompatibleCompoundUnits { from: String, to: String },

    #[error("no conversion path from {from} to {to}")]
    NoConversionPath { from: String, to: String },

    #[error("packaging not found: {0}")]
    PackagingNotFound(String),

    #[error("unit group not found: {0}")]
    GroupNotFound(String),

    #[error("unit code '{code}' is already registered in scope {scope}")]
    DuplicateUnitCode { code: String, scope: String },

    #[error("invalid conversion target '{target}': {reason}")]
    InvalidConversionTarget { target: String, reason: String },

    /// Input value could not be normalized to a decimal.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Decimal overflow or division by zero.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Reference data violates a registry invariant.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl UomError {
    pub fn unit_not_found(identifier: impl Into<String>) -> Self {
        Self::UnitNotFound(identifier.into())
    }

    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn arithmetic(msg: impl Into<String>) -> Self {
        Self::Arithmetic(msg.into())
    }

    pub fn no_path(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::NoConversionPath {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl From<UomError> for DomainError {
    fn from(err: UomError) -> Self {
        let msg = err.to_string();
        match err {
            UomError::UnitNotFound(_)
            | UomError::TypeNotFound(_)
            | UomError::CompoundUnitNotFound(_)
            | UomError::PackagingNotFound(_)
            | UomError::GroupNotFound(_) => DomainError::not_found(msg),
            UomError::DuplicateUnitCode { .. } => DomainError::conflict(msg),
            UomError::InvalidDefinition(_) => DomainError::invariant(msg),
            UomError::Storage(_) => DomainError::unavailable(msg),
            UomError::IncompatibleUnitTypes { .. }
            | UomError::IncompatibleCompoundUnits { .. }
            | UomError::NoConversionPath { .. }
            | UomError::InvalidConversionTarget { .. }
            | UomError::InvalidValue(_)
            | UomError::Arithmetic(_) => DomainError::validation(msg),
        }
    }
}
