use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;

use crate::error::UomError;
use crate::model::{CustomConversionId, CustomUnitId};
use crate::registry::normalize;

use super::owner::{Owner, scope_label};
use super::registrar::{PlannedTarget, RegistrationPlan};
use super::{ConversionTarget, CustomConversion, CustomUnit};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustomUnitStoreError {
    /// `(code, owner)` already taken.
    #[error("custom unit '{code}' already exists in scope {scope}")]
    Duplicate { code: String, scope: String },

    /// A custom conversion target could not be resolved or has the wrong type.
    #[error("invalid conversion target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("custom unit storage failed: {0}")]
    Storage(String),
}

impl From<CustomUnitStoreError> for UomError {
    fn from(err: CustomUnitStoreError) -> Self {
        match err {
            CustomUnitStoreError::Duplicate { code, scope } => UomError::DuplicateUnitCode { code, scope },
            CustomUnitStoreError::InvalidTarget { target, reason } => {
                UomError::InvalidConversionTarget { target, reason }
            }
            CustomUnitStoreError::Storage(msg) => UomError::Storage(msg),
        }
    }
}

/// Persistence port for custom units.
///
/// `insert` is the only write and must be atomic: either the unit and all of
/// its conversions are stored, or nothing is. Implementations own the
/// `(code, owner)` uniqueness guarantee; checking with `find` first is racy
/// and not sufficient.
pub trait CustomUnitStore: Send + Sync {
    fn insert(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError>;

    /// Case-insensitive lookup within exactly one scope (no fallback).
    fn find(&self, owner: Option<&Owner>, code: &str) -> Result<Option<CustomUnit>, CustomUnitStoreError>;

    fn get(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError>;

    fn list_for_owner(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError>;

    fn conversions_from(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError>;
}

impl<S> CustomUnitStore for Arc<S>
where
    S: CustomUnitStore + ?Sized,
{
    fn insert(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError> {
        (**self).insert(plan)
    }

    fn find(&self, owner: Option<&Owner>, code: &str) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        (**self).find(owner, code)
    }

    fn get(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        (**self).get(id)
    }

    fn list_for_owner(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError> {
        (**self).list_for_owner(owner)
    }

    fn conversions_from(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError> {
        (**self).conversions_from(id)
    }
}

impl<S> CustomUnitStore for &S
where
    S: CustomUnitStore + ?Sized,
{
    fn insert(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError> {
        (**self).insert(plan)
    }

    fn find(&self, owner: Option<&Owner>, code: &str) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        (**self).find(owner, code)
    }

    fn get(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        (**self).get(id)
    }

    fn list_for_owner(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError> {
        (**self).list_for_owner(owner)
    }

    fn conversions_from(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError> {
        (**self).conversions_from(id)
    }
}

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<CustomUnitId, CustomUnit>,
    by_scope: HashMap<(Option<Owner>, String), CustomUnitId>,
    conversions: BTreeMap<CustomConversionId, CustomConversion>,
    next_unit_id: i64,
    next_conversion_id: i64,
}

impl State {
    fn lookup(&self, owner: Option<&Owner>, code: &str) -> Option<&CustomUnit> {
        self.by_scope
            .get(&(owner.copied(), normalize(code)))
            .and_then(|id| self.units.get(id))
    }

    /// Owner scope first, then global.
    fn resolve_target(&self, owner: Option<&Owner>, code: &str) -> Option<&CustomUnit> {
        owner
            .and_then(|o| self.lookup(Some(o), code))
            .or_else(|| self.lookup(None, code))
    }
}

/// In-memory store for tests/dev.
///
/// Check-and-insert happens under a single write lock, so concurrent
/// registrations of the same `(code, owner)` yield exactly one success.
#[derive(Debug, Default)]
pub struct InMemoryCustomUnitStore {
    state: RwLock<State>,
}

impl InMemoryCustomUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> CustomUnitStoreError {
    CustomUnitStoreError::Storage("lock poisoned".to_string())
}

impl CustomUnitStore for InMemoryCustomUnitStore {
    fn insert(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let key = (plan.owner, normalize(&plan.code));
        if state.by_scope.contains_key(&key) {
            return Err(CustomUnitStoreError::Duplicate {
                code: plan.code.clone(),
                scope: plan.scope(),
            });
        }

        // Resolve every target before mutating anything.
        let mut targets = Vec::with_capacity(plan.conversions.len());
        for planned in &plan.conversions {
            let target = match &planned.target {
                PlannedTarget::Unit(id) => ConversionTarget::Unit(*id),
                PlannedTarget::Custom { code } => {
                    let unit = state.resolve_target(plan.owner.as_ref(), code).ok_or_else(|| {
                        CustomUnitStoreError::InvalidTarget {
                            target: code.clone(),
                            reason: format!("no such unit in scope {} or global", plan.scope()),
                        }
                    })?;
                    if unit.type_id != plan.type_id {
                        return Err(CustomUnitStoreError::InvalidTarget {
                            target: code.clone(),
                            reason: "unit type differs".to_string(),
                        });
                    }
                    ConversionTarget::Custom(unit.id)
                }
            };
            targets.push(target);
        }

        state.next_unit_id += 1;
        let unit = CustomUnit {
            id: CustomUnitId(state.next_unit_id),
            code: plan.code.clone(),
            name: plan.name.clone(),
            symbol: plan.symbol.clone(),
            description: plan.description.clone(),
            owner: plan.owner,
            type_id: plan.type_id,
            conversion_factor: plan.conversion_factor,
            created_at: Utc::now(),
        };

        let mut conversions = Vec::with_capacity(targets.len());
        for (planned, target) in plan.conversions.iter().zip(targets) {
            state.next_conversion_id += 1;
            let conversion = CustomConversion {
                id: CustomConversionId(state.next_conversion_id),
                source: unit.id,
                target,
                factor: planned.factor,
                is_linear: planned.is_linear,
            };
            state.conversions.insert(conversion.id, conversion.clone());
            conversions.push(conversion);
        }

        state.by_scope.insert(key, unit.id);
        state.units.insert(unit.id, unit.clone());

        Ok((unit, conversions))
    }

    fn find(&self, owner: Option<&Owner>, code: &str) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.lookup(owner, code).cloned())
    }

    fn get(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.units.get(&id).cloned())
    }

    fn list_for_owner(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .units
            .values()
            .filter(|u| u.owner.as_ref() == owner)
            .cloned()
            .collect())
    }

    fn conversions_from(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .conversions
            .values()
            .filter(|c| c.source == id)
            .cloned()
            .collect())
    }
}
