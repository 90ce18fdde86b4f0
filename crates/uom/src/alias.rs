//! Alias resolution: free text → canonical unit.

use crate::error::{UomError, UomResult};
use crate::model::{Unit, UnitRef};
use crate::registry::UnitRegistry;

/// Resolves identifiers against the registry's code and alias indexes.
///
/// Codes and aliases live in separate case-insensitive indexes; each lookup is
/// one hash lookup. When the same text is both a code and another unit's
/// alias, the code wins.
#[derive(Debug, Clone, Copy)]
pub struct AliasResolver<'r> {
    registry: &'r UnitRegistry,
}

impl<'r> AliasResolver<'r> {
    pub fn new(registry: &'r UnitRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, identifier: &str) -> Option<&'r Unit> {
        self.registry
            .unit_id_by_code(identifier)
            .or_else(|| self.registry.unit_id_by_alias(identifier))
            .and_then(|id| self.registry.unit(id))
    }

    pub fn resolve_or_fail(&self, identifier: &str) -> UomResult<&'r Unit> {
        self.resolve(identifier)
            .ok_or_else(|| UomError::unit_not_found(identifier))
    }

    /// Every alias of `unit`: preferred first, the rest in insertion order.
    /// With `include_code` the unit's own code leads the list.
    pub fn aliases_for(&self, unit: &UnitRef, include_code: bool) -> UomResult<Vec<String>> {
        let unit = self.registry.get_unit(unit)?;
        let aliases = self.registry.aliases_of(unit.id);

        let mut out = Vec::with_capacity(aliases.len() + 1);
        if include_code {
            out.push(unit.code.clone());
        }
        out.extend(aliases.iter().filter(|a| a.is_preferred).map(|a| a.alias.clone()));
        out.extend(aliases.iter().filter(|a| !a.is_preferred).map(|a| a.alias.clone()));
        Ok(out)
    }
}
