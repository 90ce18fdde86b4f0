//! Postgres-backed custom unit store.
//!
//! Scope uniqueness is enforced by the `uom_custom_units_scope_code_key`
//! index, so two hosts racing to register the same code cannot both win;
//! the loser gets `CustomUnitStoreError::Duplicate`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use unitforge_uom::{
    ConversionTarget, CustomConversion, CustomConversionId, CustomUnit, CustomUnitId,
    CustomUnitStore, CustomUnitStoreError, Owner, OwnerKind, PlannedTarget, RegistrationPlan,
    UnitId, UnitTypeId,
};

use super::{PostgresError, block_on, map_sqlx_error};

const UNIT_COLUMNS: &str =
    "id, code, name, symbol, description, owner_kind, owner_id, type_id, conversion_factor, created_at";

const CONVERSION_COLUMNS: &str =
    "id, source_custom_unit_id, target_unit_id, target_custom_unit_id, factor, is_linear";

#[derive(Debug, Clone)]
pub struct PostgresCustomUnitStore {
    pool: Arc<PgPool>,
}

impl PostgresCustomUnitStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert the unit and its conversions in one transaction.
    #[instrument(skip(self, plan), fields(code = %plan.code, scope = %plan.scope()), err)]
    pub async fn insert_plan(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError> {
        let (owner_kind, owner_id) = owner_columns(plan.owner.as_ref());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_begin", e))?;

        let mut targets = Vec::with_capacity(plan.conversions.len());
        for planned in &plan.conversions {
            let target = match &planned.target {
                PlannedTarget::Unit(id) => ConversionTarget::Unit(*id),
                PlannedTarget::Custom { code } => {
                    resolve_custom_target(&mut tx, plan, code).await?
                }
            };
            targets.push(target);
        }

        let row: CustomUnitRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO uom_custom_units
                (code, name, symbol, description, owner_kind, owner_id, type_id, conversion_factor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {UNIT_COLUMNS}
            "#
        ))
        .bind(&plan.code)
        .bind(&plan.name)
        .bind(plan.symbol.as_deref())
        .bind(plan.description.as_deref())
        .bind(owner_kind)
        .bind(owner_id)
        .bind(plan.type_id.get())
        .bind(plan.conversion_factor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error(map_sqlx_error("insert_custom_unit", e), plan))?;
        let unit = CustomUnit::try_from(row)?;

        let mut conversions = Vec::with_capacity(targets.len());
        for (planned, target) in plan.conversions.iter().zip(targets) {
            let (target_unit_id, target_custom_unit_id) = target_columns(target);
            let row: CustomConversionRow = sqlx::query_as(&format!(
                r#"
                INSERT INTO uom_custom_conversions
                    (source_custom_unit_id, target_unit_id, target_custom_unit_id, factor, is_linear)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {CONVERSION_COLUMNS}
                "#
            ))
            .bind(unit.id.get())
            .bind(target_unit_id)
            .bind(target_custom_unit_id)
            .bind(planned.factor)
            .bind(planned.is_linear)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_custom_conversion", e))?;
            conversions.push(CustomConversion::try_from(row)?);
        }

        tx.commit()
            .await
            .map_err(|e| insert_error(map_sqlx_error("insert_commit", e), plan))?;

        Ok((unit, conversions))
    }

    /// Case-insensitive lookup in exactly one scope.
    pub async fn find_unit(
        &self,
        owner: Option<&Owner>,
        code: &str,
    ) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        let (owner_kind, owner_id) = owner_columns(owner);
        let row: Option<CustomUnitRow> = sqlx::query_as(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM uom_custom_units
            WHERE lower(code) = lower($1)
              AND owner_kind IS NOT DISTINCT FROM $2
              AND owner_id IS NOT DISTINCT FROM $3
            "#
        ))
        .bind(code)
        .bind(owner_kind)
        .bind(owner_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_custom_unit", e))?;
        row.map(CustomUnit::try_from).transpose()
    }

    pub async fn get_unit(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        let row: Option<CustomUnitRow> =
            sqlx::query_as(&format!("SELECT {UNIT_COLUMNS} FROM uom_custom_units WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_custom_unit", e))?;
        row.map(CustomUnit::try_from).transpose()
    }

    pub async fn list_units(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError> {
        let (owner_kind, owner_id) = owner_columns(owner);
        let rows: Vec<CustomUnitRow> = sqlx::query_as(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM uom_custom_units
            WHERE owner_kind IS NOT DISTINCT FROM $1
              AND owner_id IS NOT DISTINCT FROM $2
            ORDER BY id
            "#
        ))
        .bind(owner_kind)
        .bind(owner_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_custom_units", e))?;
        rows.into_iter().map(CustomUnit::try_from).collect()
    }

    pub async fn conversions_of(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError> {
        let rows: Vec<CustomConversionRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM uom_custom_conversions WHERE source_custom_unit_id = $1 ORDER BY id"
        ))
        .bind(id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("custom_conversions_from", e))?;
        rows.into_iter().map(CustomConversion::try_from).collect()
    }
}

/// Owner scope first, then global; the target must share the new unit's type.
async fn resolve_custom_target(
    tx: &mut Transaction<'_, Postgres>,
    plan: &RegistrationPlan,
    code: &str,
) -> Result<ConversionTarget, CustomUnitStoreError> {
    let (owner_kind, owner_id) = owner_columns(plan.owner.as_ref());
    let row = sqlx::query(
        r#"
        SELECT id, type_id
        FROM uom_custom_units
        WHERE lower(code) = lower($1)
          AND (owner_kind IS NULL OR (owner_kind = $2 AND owner_id = $3))
        ORDER BY (owner_kind IS NULL) ASC
        LIMIT 1
        "#,
    )
    .bind(code)
    .bind(owner_kind)
    .bind(owner_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("resolve_custom_target", e))?;

    let Some(row) = row else {
        return Err(CustomUnitStoreError::InvalidTarget {
            target: code.to_string(),
            reason: format!("no such unit in scope {} or global", plan.scope()),
        });
    };
    let id: i64 = row
        .try_get("id")
        .map_err(|e| map_sqlx_error("resolve_custom_target", e))?;
    let type_id: i64 = row
        .try_get("type_id")
        .map_err(|e| map_sqlx_error("resolve_custom_target", e))?;

    if UnitTypeId(type_id) != plan.type_id {
        return Err(CustomUnitStoreError::InvalidTarget {
            target: code.to_string(),
            reason: "unit type differs".to_string(),
        });
    }
    Ok(ConversionTarget::Custom(CustomUnitId(id)))
}

fn insert_error(err: PostgresError, plan: &RegistrationPlan) -> CustomUnitStoreError {
    if err.is_unique_violation() {
        CustomUnitStoreError::Duplicate {
            code: plan.code.clone(),
            scope: plan.scope(),
        }
    } else {
        err.into()
    }
}

fn owner_columns(owner: Option<&Owner>) -> (Option<&'static str>, Option<Uuid>) {
    match owner {
        Some(owner) => (Some(owner.kind.as_str()), Some(owner.id)),
        None => (None, None),
    }
}

fn owner_from_columns(kind: Option<String>, id: Option<Uuid>) -> Result<Option<Owner>, CustomUnitStoreError> {
    match (kind, id) {
        (None, None) => Ok(None),
        (Some(kind), Some(id)) => {
            let kind: OwnerKind = kind
                .parse()
                .map_err(|e| CustomUnitStoreError::Storage(format!("bad owner_kind column: {e}")))?;
            Ok(Some(Owner::new(kind, id)))
        }
        _ => Err(CustomUnitStoreError::Storage(
            "owner_kind and owner_id must be both set or both null".to_string(),
        )),
    }
}

fn target_columns(target: ConversionTarget) -> (Option<i64>, Option<i64>) {
    match target {
        ConversionTarget::Unit(id) => (Some(id.get()), None),
        ConversionTarget::Custom(id) => (None, Some(id.get())),
    }
}

fn target_from_columns(unit: Option<i64>, custom: Option<i64>) -> Result<ConversionTarget, CustomUnitStoreError> {
    match (unit, custom) {
        (Some(id), None) => Ok(ConversionTarget::Unit(UnitId(id))),
        (None, Some(id)) => Ok(ConversionTarget::Custom(CustomUnitId(id))),
        _ => Err(CustomUnitStoreError::Storage(
            "custom conversion must have exactly one target column set".to_string(),
        )),
    }
}

#[derive(Debug, Clone)]
struct CustomUnitRow {
    id: i64,
    code: String,
    name: String,
    symbol: Option<String>,
    description: Option<String>,
    owner_kind: Option<String>,
    owner_id: Option<Uuid>,
    type_id: i64,
    conversion_factor: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CustomUnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomUnitRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            symbol: row.try_get("symbol")?,
            description: row.try_get("description")?,
            owner_kind: row.try_get("owner_kind")?,
            owner_id: row.try_get("owner_id")?,
            type_id: row.try_get("type_id")?,
            conversion_factor: row.try_get("conversion_factor")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<CustomUnitRow> for CustomUnit {
    type Error = CustomUnitStoreError;

    fn try_from(row: CustomUnitRow) -> Result<Self, Self::Error> {
        Ok(CustomUnit {
            id: CustomUnitId(row.id),
            code: row.code,
            name: row.name,
            symbol: row.symbol,
            description: row.description,
            owner: owner_from_columns(row.owner_kind, row.owner_id)?,
            type_id: UnitTypeId(row.type_id),
            conversion_factor: row.conversion_factor,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
struct CustomConversionRow {
    id: i64,
    source_custom_unit_id: i64,
    target_unit_id: Option<i64>,
    target_custom_unit_id: Option<i64>,
    factor: Decimal,
    is_linear: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CustomConversionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomConversionRow {
            id: row.try_get("id")?,
            source_custom_unit_id: row.try_get("source_custom_unit_id")?,
            target_unit_id: row.try_get("target_unit_id")?,
            target_custom_unit_id: row.try_get("target_custom_unit_id")?,
            factor: row.try_get("factor")?,
            is_linear: row.try_get("is_linear")?,
        })
    }
}

impl TryFrom<CustomConversionRow> for CustomConversion {
    type Error = CustomUnitStoreError;

    fn try_from(row: CustomConversionRow) -> Result<Self, Self::Error> {
        Ok(CustomConversion {
            id: CustomConversionId(row.id),
            source: CustomUnitId(row.source_custom_unit_id),
            target: target_from_columns(row.target_unit_id, row.target_custom_unit_id)?,
            factor: row.factor,
            is_linear: row.is_linear,
        })
    }
}

impl CustomUnitStore for PostgresCustomUnitStore {
    fn insert(
        &self,
        plan: &RegistrationPlan,
    ) -> Result<(CustomUnit, Vec<CustomConversion>), CustomUnitStoreError> {
        block_on("insert_custom_unit", self.insert_plan(plan))?
    }

    fn find(&self, owner: Option<&Owner>, code: &str) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        block_on("find_custom_unit", self.find_unit(owner, code))?
    }

    fn get(&self, id: CustomUnitId) -> Result<Option<CustomUnit>, CustomUnitStoreError> {
        block_on("get_custom_unit", self.get_unit(id))?
    }

    fn list_for_owner(&self, owner: Option<&Owner>) -> Result<Vec<CustomUnit>, CustomUnitStoreError> {
        block_on("list_custom_units", self.list_units(owner))?
    }

    fn conversions_from(&self, id: CustomUnitId) -> Result<Vec<CustomConversion>, CustomUnitStoreError> {
        block_on("custom_conversions_from", self.conversions_of(id))?
    }
}
