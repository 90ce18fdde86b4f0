//! Unit registry: immutable, indexed snapshot of the reference data.
//!
//! A registry is assembled through [`UnitRegistryBuilder`], which validates
//! every invariant of the data model before anything can be converted:
//!
//! - unit codes are unique case-insensitively, alias strings likewise;
//! - a unit has at most one preferred alias, a type at most one base unit;
//! - conversions connect two distinct units of the same type with `factor > 0`;
//! - compound units have at least one component, with non-zero exponents no
//!   larger than [`MAX_COMPOUND_EXPONENT`] in magnitude;
//! - packagings have `quantity > 0` and one row per (base, package) pair;
//! - unit group names are unique case-insensitively and list known units once;
//! - item packaging assignments name known packagings, each pair once.
//!
//! Once built the registry is read-only and can be shared behind an `Arc`
//! without locks.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use unitforge_core::RecordId;

use crate::alias::AliasResolver;
use crate::error::{UomError, UomResult};
use crate::graph::ConversionGraph;
use crate::model::{
    Alias, CompoundRef, CompoundUnit, CompoundUnitId, Conversion, ConversionId, ItemPackaging,
    MAX_COMPOUND_EXPONENT, Packaging, PackagingId, TypeRef, Unit, UnitGroup, UnitGroupId, UnitId,
    UnitRef, UnitType, UnitTypeId,
};

#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    types: BTreeMap<UnitTypeId, UnitType>,
    type_slugs: HashMap<String, UnitTypeId>,
    units: BTreeMap<UnitId, Unit>,
    codes: HashMap<String, UnitId>,
    aliases: HashMap<String, UnitId>,
    unit_aliases: HashMap<UnitId, Vec<Alias>>,
    conversions: BTreeMap<ConversionId, Conversion>,
    graphs: HashMap<UnitTypeId, ConversionGraph>,
    compounds: BTreeMap<CompoundUnitId, CompoundUnit>,
    compound_labels: HashMap<String, CompoundUnitId>,
    packagings: BTreeMap<PackagingId, Packaging>,
    packaging_pairs: HashMap<(UnitId, UnitId), PackagingId>,
    item_packagings: HashMap<RecordId, Vec<PackagingId>>,
    groups: BTreeMap<UnitGroupId, UnitGroup>,
    group_names: HashMap<String, UnitGroupId>,
    unit_groups: HashMap<UnitId, Vec<UnitGroupId>>,
}

impl UnitRegistry {
    pub fn builder() -> UnitRegistryBuilder {
        UnitRegistryBuilder::default()
    }

    /// Look up a unit by id, code, or alias.
    ///
    /// Text identifiers go through the [`AliasResolver`] (codes outrank
    /// aliases); text that matches neither but parses as an integer is tried
    /// as a numeric id last.
    pub fn get_unit(&self, identifier: &UnitRef) -> UomResult<&Unit> {
        match identifier {
            UnitRef::Id(id) => self
                .unit(*id)
                .ok_or_else(|| UomError::unit_not_found(identifier.to_string())),
            UnitRef::Identifier(text) => AliasResolver::new(self)
                .resolve(text)
                .or_else(|| {
                    text.trim()
                        .parse::<i64>()
                        .ok()
                        .and_then(|id| self.unit(UnitId(id)))
                })
                .ok_or_else(|| UomError::unit_not_found(text.clone())),
        }
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub(crate) fn unit_id_by_code(&self, code: &str) -> Option<UnitId> {
        self.codes.get(&normalize(code)).copied()
    }

    pub(crate) fn unit_id_by_alias(&self, alias: &str) -> Option<UnitId> {
        self.aliases.get(&normalize(alias)).copied()
    }

    /// Aliases of a unit in insertion order.
    pub fn aliases_of(&self, unit: UnitId) -> &[Alias] {
        self.unit_aliases.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_type(&self, slug: &str) -> UomResult<&UnitType> {
        self.type_slugs
            .get(&normalize(slug))
            .and_then(|id| self.types.get(id))
            .ok_or_else(|| UomError::TypeNotFound(slug.to_string()))
    }

    pub fn resolve_type(&self, reference: &TypeRef) -> UomResult<&UnitType> {
        match reference {
            TypeRef::Id(id) => self
                .unit_type(*id)
                .ok_or_else(|| UomError::TypeNotFound(reference.to_string())),
            TypeRef::Slug(slug) => self.get_type(slug),
        }
    }

    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.types.get(&id)
    }

    pub fn types(&self) -> impl Iterator<Item = &UnitType> {
        self.types.values()
    }

    /// Slug of a type, or its id when unknown (for messages).
    pub(crate) fn type_label(&self, id: UnitTypeId) -> String {
        self.unit_type(id)
            .map(|t| t.slug.clone())
            .unwrap_or_else(|| format!("type #{id}"))
    }

    /// Units of a type, ordered by id.
    pub fn list_units_of_type(&self, type_id: UnitTypeId) -> Vec<&Unit> {
        self.units.values().filter(|u| u.type_id == type_id).collect()
    }

    /// Reference unit of a type, if one is flagged.
    pub fn base_unit_of(&self, type_id: UnitTypeId) -> Option<&Unit> {
        self.units.values().find(|u| u.type_id == type_id && u.is_base)
    }

    pub fn conversion(&self, id: ConversionId) -> Option<&Conversion> {
        self.conversions.get(&id)
    }

    pub fn conversions(&self) -> impl Iterator<Item = &Conversion> {
        self.conversions.values()
    }

    pub fn graph(&self, type_id: UnitTypeId) -> Option<&ConversionGraph> {
        self.graphs.get(&type_id)
    }

    pub fn compound(&self, reference: &CompoundRef) -> UomResult<&CompoundUnit> {
        let found = match reference {
            CompoundRef::Id(id) => self.compounds.get(id),
            CompoundRef::Name(label) => self
                .compound_labels
                .get(&normalize(label))
                .and_then(|id| self.compounds.get(id)),
        };
        found.ok_or_else(|| UomError::CompoundUnitNotFound(reference.to_string()))
    }

    pub fn compounds(&self) -> impl Iterator<Item = &CompoundUnit> {
        self.compounds.values()
    }

    pub fn packaging(&self, id: PackagingId) -> Option<&Packaging> {
        self.packagings.get(&id)
    }

    pub fn packaging_between(&self, base: UnitId, package: UnitId) -> Option<&Packaging> {
        self.packaging_pairs
            .get(&(base, package))
            .and_then(|id| self.packagings.get(id))
    }

    pub fn packagings(&self) -> impl Iterator<Item = &Packaging> {
        self.packagings.values()
    }

    /// Packagings assigned to a host item, in assignment order.
    pub fn packagings_for_item(&self, item: RecordId) -> Vec<&Packaging> {
        self.item_packagings
            .get(&item)
            .into_iter()
            .flatten()
            .filter_map(|id| self.packagings.get(id))
            .collect()
    }

    pub fn item_packagings(&self) -> impl Iterator<Item = ItemPackaging> + '_ {
        self.item_packagings.iter().flat_map(|(item_id, ids)| {
            ids.iter().map(|packaging_id| ItemPackaging {
                item_id: *item_id,
                packaging_id: *packaging_id,
            })
        })
    }

    pub fn group(&self, id: UnitGroupId) -> Option<&UnitGroup> {
        self.groups.get(&id)
    }

    pub fn get_group(&self, name: &str) -> UomResult<&UnitGroup> {
        self.group_names
            .get(&normalize(name))
            .and_then(|id| self.groups.get(id))
            .ok_or_else(|| UomError::GroupNotFound(name.to_string()))
    }

    pub fn groups(&self) -> impl Iterator<Item = &UnitGroup> {
        self.groups.values()
    }

    /// Members of the named group, in the group's listed order.
    pub fn units_in_group(&self, name: &str) -> UomResult<Vec<&Unit>> {
        let group = self.get_group(name)?;
        Ok(group.unit_ids.iter().filter_map(|id| self.units.get(id)).collect())
    }

    /// Groups a unit belongs to, ordered by group id.
    pub fn groups_of(&self, unit: UnitId) -> Vec<&UnitGroup> {
        self.unit_groups
            .get(&unit)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id))
            .collect()
    }
}

pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Collects reference data and validates it into a [`UnitRegistry`].
#[derive(Debug, Clone, Default)]
pub struct UnitRegistryBuilder {
    types: Vec<UnitType>,
    units: Vec<Unit>,
    aliases: Vec<Alias>,
    conversions: Vec<Conversion>,
    compounds: Vec<CompoundUnit>,
    packagings: Vec<Packaging>,
    item_packagings: Vec<ItemPackaging>,
    groups: Vec<UnitGroup>,
}

impl UnitRegistryBuilder {
    pub fn add_type(&mut self, unit_type: UnitType) -> &mut Self {
        self.types.push(unit_type);
        self
    }

    pub fn add_unit(&mut self, unit: Unit) -> &mut Self {
        self.units.push(unit);
        self
    }

    pub fn add_alias(&mut self, alias: Alias) -> &mut Self {
        self.aliases.push(alias);
        self
    }

    pub fn add_conversion(&mut self, conversion: Conversion) -> &mut Self {
        self.conversions.push(conversion);
        self
    }

    pub fn add_compound(&mut self, compound: CompoundUnit) -> &mut Self {
        self.compounds.push(compound);
        self
    }

    pub fn add_packaging(&mut self, packaging: Packaging) -> &mut Self {
        self.packagings.push(packaging);
        self
    }

    pub fn add_item_packaging(&mut self, assignment: ItemPackaging) -> &mut Self {
        self.item_packagings.push(assignment);
        self
    }

    pub fn add_group(&mut self, group: UnitGroup) -> &mut Self {
        self.groups.push(group);
        self
    }

    pub fn build(&self) -> UomResult<UnitRegistry> {
        let mut reg = UnitRegistry::default();

        for t in &self.types {
            let slug = normalize(&t.slug);
            if slug.is_empty() {
                return Err(UomError::invalid_definition(format!("type #{} has an empty slug", t.id)));
            }
            if reg.types.contains_key(&t.id) {
                return Err(UomError::invalid_definition(format!("duplicate type id {}", t.id)));
            }
            if reg.type_slugs.insert(slug, t.id).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate type slug '{}'", t.slug)));
            }
            reg.types.insert(t.id, t.clone());
        }

        for u in &self.units {
            let code = normalize(&u.code);
            if code.is_empty() {
                return Err(UomError::invalid_definition(format!("unit #{} has an empty code", u.id)));
            }
            if !reg.types.contains_key(&u.type_id) {
                return Err(UomError::invalid_definition(format!(
                    "unit '{}' references unknown type #{}",
                    u.code, u.type_id
                )));
            }
            if reg.units.contains_key(&u.id) {
                return Err(UomError::invalid_definition(format!("duplicate unit id {}", u.id)));
            }
            if reg.codes.insert(code, u.id).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate unit code '{}'", u.code)));
            }
            if u.is_base && reg.units.values().any(|other| other.type_id == u.type_id && other.is_base) {
                return Err(UomError::invalid_definition(format!(
                    "type '{}' has more than one base unit",
                    reg.type_label(u.type_id)
                )));
            }
            reg.units.insert(u.id, u.clone());
        }

        for a in &self.aliases {
            let key = normalize(&a.alias);
            if key.is_empty() {
                return Err(UomError::invalid_definition(format!("empty alias for unit #{}", a.unit_id)));
            }
            if !reg.units.contains_key(&a.unit_id) {
                return Err(UomError::invalid_definition(format!(
                    "alias '{}' references unknown unit #{}",
                    a.alias, a.unit_id
                )));
            }
            if reg.aliases.insert(key, a.unit_id).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate alias '{}'", a.alias)));
            }
            let existing = reg.unit_aliases.entry(a.unit_id).or_default();
            if a.is_preferred && existing.iter().any(|e| e.is_preferred) {
                return Err(UomError::invalid_definition(format!(
                    "unit #{} has more than one preferred alias",
                    a.unit_id
                )));
            }
            existing.push(a.clone());
        }

        for c in &self.conversions {
            let (source, target) = match (reg.units.get(&c.source_unit_id), reg.units.get(&c.target_unit_id)) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    return Err(UomError::invalid_definition(format!(
                        "conversion #{} references an unknown unit",
                        c.id
                    )));
                }
            };
            if source.id == target.id {
                return Err(UomError::invalid_definition(format!(
                    "conversion #{} links '{}' to itself",
                    c.id, source.code
                )));
            }
            if source.type_id != target.type_id {
                return Err(UomError::invalid_definition(format!(
                    "conversion #{} links '{}' and '{}' of different types",
                    c.id, source.code, target.code
                )));
            }
            if c.factor <= Decimal::ZERO {
                return Err(UomError::invalid_definition(format!(
                    "conversion #{} has non-positive factor {}",
                    c.id, c.factor
                )));
            }
            if reg.conversions.insert(c.id, c.clone()).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate conversion id {}", c.id)));
            }
        }

        for c in &self.compounds {
            if c.components.is_empty() {
                return Err(UomError::invalid_definition(format!(
                    "compound unit '{}' has no components",
                    c.name
                )));
            }
            if !reg.types.contains_key(&c.type_id) {
                return Err(UomError::invalid_definition(format!(
                    "compound unit '{}' references unknown type #{}",
                    c.name, c.type_id
                )));
            }
            for component in &c.components {
                if component.exponent == 0 {
                    return Err(UomError::invalid_definition(format!(
                        "compound unit '{}' has a zero exponent",
                        c.name
                    )));
                }
                if component.exponent.unsigned_abs() > MAX_COMPOUND_EXPONENT {
                    return Err(UomError::invalid_definition(format!(
                        "compound unit '{}' has exponent {} beyond ±{MAX_COMPOUND_EXPONENT}",
                        c.name, component.exponent
                    )));
                }
                if !reg.units.contains_key(&component.unit_id) {
                    return Err(UomError::invalid_definition(format!(
                        "compound unit '{}' references unknown unit #{}",
                        c.name, component.unit_id
                    )));
                }
            }
            if reg.compounds.insert(c.id, c.clone()).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate compound unit id {}", c.id)));
            }
            let labels = std::iter::once(c.name.as_str()).chain(c.symbol.as_deref());
            for label in labels {
                if let Some(previous) = reg.compound_labels.insert(normalize(label), c.id) {
                    if previous != c.id {
                        return Err(UomError::invalid_definition(format!(
                            "compound label '{label}' is ambiguous"
                        )));
                    }
                }
            }
        }

        for p in &self.packagings {
            if p.quantity == 0 {
                return Err(UomError::invalid_definition(format!(
                    "packaging #{} has zero quantity",
                    p.id
                )));
            }
            if !reg.units.contains_key(&p.base_unit_id) || !reg.units.contains_key(&p.package_unit_id) {
                return Err(UomError::invalid_definition(format!(
                    "packaging #{} references an unknown unit",
                    p.id
                )));
            }
            if p.base_unit_id == p.package_unit_id {
                return Err(UomError::invalid_definition(format!(
                    "packaging #{} uses the same unit as base and package",
                    p.id
                )));
            }
            if reg.packagings.insert(p.id, p.clone()).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate packaging id {}", p.id)));
            }
            if reg
                .packaging_pairs
                .insert((p.base_unit_id, p.package_unit_id), p.id)
                .is_some()
            {
                return Err(UomError::invalid_definition(format!(
                    "more than one packaging links unit #{} to unit #{}",
                    p.base_unit_id, p.package_unit_id
                )));
            }
        }

        for a in &self.item_packagings {
            if !reg.packagings.contains_key(&a.packaging_id) {
                return Err(UomError::invalid_definition(format!(
                    "item {} is assigned unknown packaging #{}",
                    a.item_id, a.packaging_id
                )));
            }
            let assigned = reg.item_packagings.entry(a.item_id).or_default();
            if assigned.contains(&a.packaging_id) {
                return Err(UomError::invalid_definition(format!(
                    "packaging #{} is assigned to item {} twice",
                    a.packaging_id, a.item_id
                )));
            }
            assigned.push(a.packaging_id);
        }

        for g in &self.groups {
            let name = normalize(&g.name);
            if name.is_empty() {
                return Err(UomError::invalid_definition(format!("unit group #{} has an empty name", g.id)));
            }
            if reg.groups.contains_key(&g.id) {
                return Err(UomError::invalid_definition(format!("duplicate unit group id {}", g.id)));
            }
            if reg.group_names.insert(name, g.id).is_some() {
                return Err(UomError::invalid_definition(format!("duplicate unit group name '{}'", g.name)));
            }
            for (i, unit_id) in g.unit_ids.iter().enumerate() {
                if !reg.units.contains_key(unit_id) {
                    return Err(UomError::invalid_definition(format!(
                        "unit group '{}' references unknown unit #{unit_id}",
                        g.name
                    )));
                }
                if g.unit_ids[..i].contains(unit_id) {
                    return Err(UomError::invalid_definition(format!(
                        "unit group '{}' lists unit #{unit_id} twice",
                        g.name
                    )));
                }
                reg.unit_groups.entry(*unit_id).or_default().push(g.id);
            }
            reg.groups.insert(g.id, g.clone());
        }
        for ids in reg.unit_groups.values_mut() {
            ids.sort();
        }

        for type_id in reg.types.keys() {
            let conversions = reg.conversions.values().filter(|c| {
                reg.units
                    .get(&c.source_unit_id)
                    .is_some_and(|u| u.type_id == *type_id)
            });
            let graph = ConversionGraph::build(conversions, &reg.units);
            reg.graphs.insert(*type_id, graph);
        }

        tracing::debug!(
            types = reg.types.len(),
            units = reg.units.len(),
            conversions = reg.conversions.len(),
            compounds = reg.compounds.len(),
            packagings = reg.packagings.len(),
            groups = reg.groups.len(),
            "unit registry built"
        );

        Ok(reg)
    }
}
