//! Entity trait: records with a stable identity.

/// Entity marker + minimal interface.
///
/// Registry records (units, types, packagings, custom units) are entities: two
/// records with equal attributes but different ids are different records.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
