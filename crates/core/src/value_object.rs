//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: they are defined entirely by their
/// attribute values and never mutate after construction. An owner reference
/// `(kind, id)` or a compound component `(unit, exponent)` are value objects;
/// a registered unit is an [`Entity`](crate::Entity).
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Ratio {
///     numerator: u32,
///     denominator: u32,
/// }
///
/// impl ValueObject for Ratio {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
