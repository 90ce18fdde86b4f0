//! Reference data tables ↔ [`UnitRegistry`] snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use unitforge_core::RecordId;
use unitforge_uom::{
    Alias, CompoundComponent, CompoundUnit, CompoundUnitId, Conversion, ConversionId, ItemPackaging,
    Packaging, PackagingId, Unit, UnitGroup, UnitGroupId, UnitId, UnitRegistry, UnitType, UnitTypeId,
    UomError, UomResult,
};

use super::{PostgresError, map_sqlx_error};

/// Loads and publishes registry reference data.
///
/// The engine never reads these tables per conversion; hosts load a
/// snapshot at startup and rebuild it when reference data changes.
#[derive(Debug, Clone)]
pub struct PostgresUnitRepository {
    pool: Arc<PgPool>,
}

impl PostgresUnitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Read every reference table and build a validated snapshot.
    #[instrument(skip(self), fields(units = tracing::field::Empty), err)]
    pub async fn load_registry(&self) -> UomResult<UnitRegistry> {
        let types: Vec<UnitTypeRow> = sqlx::query_as("SELECT id, name, slug, description FROM uom_unit_types ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_unit_types", e))?;

        let units: Vec<UnitRow> = sqlx::query_as(
            "SELECT id, code, name, type_id, symbol, is_base, metadata FROM uom_units ORDER BY id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_units", e))?;

        // Insertion order keeps the preferred/first alias stable.
        let aliases: Vec<AliasRow> =
            sqlx::query_as("SELECT unit_id, alias, is_preferred FROM uom_aliases ORDER BY id")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_aliases", e))?;

        let conversions: Vec<ConversionRow> = sqlx::query_as(
            r#"
            SELECT id, source_unit_id, target_unit_id, factor, offset_value, direction, is_linear
            FROM uom_conversions
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_conversions", e))?;

        let compounds: Vec<CompoundRow> =
            sqlx::query_as("SELECT id, name, symbol, type_id FROM uom_compound_units ORDER BY id")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_compound_units", e))?;

        let components: Vec<ComponentRow> = sqlx::query_as(
            r#"
            SELECT compound_unit_id, unit_id, exponent
            FROM uom_compound_components
            ORDER BY compound_unit_id, position
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_compound_components", e))?;

        let packagings: Vec<PackagingRow> = sqlx::query_as(
            "SELECT id, base_unit_id, package_unit_id, quantity, label FROM uom_packagings ORDER BY id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_packagings", e))?;

        let item_packagings: Vec<ItemPackagingRow> =
            sqlx::query_as("SELECT item_id, packaging_id FROM uom_item_packagings ORDER BY id")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_item_packagings", e))?;

        let groups: Vec<GroupRow> = sqlx::query_as("SELECT id, name, description FROM uom_unit_groups ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_unit_groups", e))?;

        let group_members: Vec<GroupMemberRow> = sqlx::query_as(
            "SELECT group_id, unit_id FROM uom_unit_group_members ORDER BY group_id, position",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_unit_group_members", e))?;

        let registry = ReferenceRows {
            types,
            units,
            aliases,
            conversions,
            compounds,
            components,
            packagings,
            item_packagings,
            groups,
            group_members,
        }
        .assemble()?;
        Span::current().record("units", registry.units().count());
        Ok(registry)
    }

    /// Insert every row of `registry`, skipping rows that already exist.
    /// Runs in one transaction.
    #[instrument(skip_all, err)]
    pub async fn publish(&self, registry: &UnitRegistry) -> Result<(), PostgresError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("publish_begin", e))?;

        for t in registry.types() {
            sqlx::query(
                "INSERT INTO uom_unit_types (id, name, slug, description) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(t.id.get())
            .bind(&t.name)
            .bind(&t.slug)
            .bind(t.description.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_unit_type", e))?;
        }

        for u in registry.units() {
            sqlx::query(
                r#"
                INSERT INTO uom_units (id, code, name, type_id, symbol, is_base, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(u.id.get())
            .bind(&u.code)
            .bind(&u.name)
            .bind(u.type_id.get())
            .bind(u.symbol.as_deref())
            .bind(u.is_base)
            .bind(u.metadata.as_ref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_unit", e))?;

            for a in registry.aliases_of(u.id) {
                sqlx::query(
                    "INSERT INTO uom_aliases (unit_id, alias, is_preferred) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(a.unit_id.get())
                .bind(&a.alias)
                .bind(a.is_preferred)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("publish_alias", e))?;
            }
        }

        for c in registry.conversions() {
            sqlx::query(
                r#"
                INSERT INTO uom_conversions
                    (id, source_unit_id, target_unit_id, factor, offset_value, direction, is_linear)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(c.id.get())
            .bind(c.source_unit_id.get())
            .bind(c.target_unit_id.get())
            .bind(c.factor)
            .bind(c.offset)
            .bind(c.direction.as_str())
            .bind(c.is_linear)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_conversion", e))?;
        }

        for cu in registry.compounds() {
            sqlx::query(
                "INSERT INTO uom_compound_units (id, name, symbol, type_id) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(cu.id.get())
            .bind(&cu.name)
            .bind(cu.symbol.as_deref())
            .bind(cu.type_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_compound_unit", e))?;

            for (position, component) in cu.components.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO uom_compound_components (compound_unit_id, position, unit_id, exponent)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(cu.id.get())
                .bind(position as i32)
                .bind(component.unit_id.get())
                .bind(component.exponent)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("publish_compound_component", e))?;
            }
        }

        for p in registry.packagings() {
            sqlx::query(
                r#"
                INSERT INTO uom_packagings (id, base_unit_id, package_unit_id, quantity, label)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(p.id.get())
            .bind(p.base_unit_id.get())
            .bind(p.package_unit_id.get())
            .bind(i64::from(p.quantity))
            .bind(p.label.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_packaging", e))?;
        }

        for a in registry.item_packagings() {
            sqlx::query(
                "INSERT INTO uom_item_packagings (item_id, packaging_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(a.item_id.get())
            .bind(a.packaging_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_item_packaging", e))?;
        }

        for g in registry.groups() {
            sqlx::query(
                "INSERT INTO uom_unit_groups (id, name, description) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(g.id.get())
            .bind(&g.name)
            .bind(g.description.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("publish_unit_group", e))?;

            for (position, unit_id) in g.unit_ids.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO uom_unit_group_members (group_id, unit_id, position)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(g.id.get())
                .bind(unit_id.get())
                .bind(position as i32)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("publish_unit_group_member", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("publish_commit", e))?;

        tracing::info!(
            units = registry.units().count(),
            conversions = registry.conversions().count(),
            groups = registry.groups().count(),
            "registry reference data published"
        );
        Ok(())
    }

    /// Offer `packaging` for a host item. Takes effect on the next
    /// [`load_registry`](Self::load_registry).
    #[instrument(skip(self), err)]
    pub async fn assign_item_packaging(&self, assignment: ItemPackaging) -> Result<(), PostgresError> {
        sqlx::query(
            "INSERT INTO uom_item_packagings (item_id, packaging_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(assignment.item_id.get())
        .bind(assignment.packaging_id.get())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_item_packaging", e))?;
        Ok(())
    }
}

/// Everything `load_registry` reads, one field per table.
struct ReferenceRows {
    types: Vec<UnitTypeRow>,
    units: Vec<UnitRow>,
    aliases: Vec<AliasRow>,
    conversions: Vec<ConversionRow>,
    compounds: Vec<CompoundRow>,
    components: Vec<ComponentRow>,
    packagings: Vec<PackagingRow>,
    item_packagings: Vec<ItemPackagingRow>,
    groups: Vec<GroupRow>,
    group_members: Vec<GroupMemberRow>,
}

impl ReferenceRows {
    fn assemble(self) -> UomResult<UnitRegistry> {
        let mut builder = UnitRegistry::builder();
        for row in self.types {
            builder.add_type(row.into());
        }
        for row in self.units {
            builder.add_unit(row.into());
        }
        for row in self.aliases {
            builder.add_alias(row.into());
        }
        for row in self.conversions {
            builder.add_conversion(row.try_into()?);
        }

        let mut by_compound: BTreeMap<i64, Vec<CompoundComponent>> = BTreeMap::new();
        for row in self.components {
            by_compound
                .entry(row.compound_unit_id)
                .or_default()
                .push(CompoundComponent {
                    unit_id: UnitId(row.unit_id),
                    exponent: row.exponent,
                });
        }
        for row in self.compounds {
            let components = by_compound.remove(&row.id).unwrap_or_default();
            builder.add_compound(CompoundUnit {
                id: CompoundUnitId(row.id),
                name: row.name,
                symbol: row.symbol,
                type_id: UnitTypeId(row.type_id),
                components,
            });
        }

        for row in self.packagings {
            builder.add_packaging(row.try_into()?);
        }
        for row in self.item_packagings {
            builder.add_item_packaging(row.into());
        }

        let mut members: BTreeMap<i64, Vec<UnitId>> = BTreeMap::new();
        for row in self.group_members {
            members.entry(row.group_id).or_default().push(UnitId(row.unit_id));
        }
        for row in self.groups {
            builder.add_group(UnitGroup {
                id: UnitGroupId(row.id),
                name: row.name,
                description: row.description,
                unit_ids: members.remove(&row.id).unwrap_or_default(),
            });
        }

        builder.build()
    }
}

#[derive(Debug, Clone)]
struct UnitTypeRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UnitTypeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UnitTypeRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<UnitTypeRow> for UnitType {
    fn from(row: UnitTypeRow) -> Self {
        UnitType {
            id: UnitTypeId(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone)]
struct UnitRow {
    id: i64,
    code: String,
    name: String,
    type_id: i64,
    symbol: Option<String>,
    is_base: bool,
    metadata: Option<serde_json::Value>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UnitRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            type_id: row.try_get("type_id")?,
            symbol: row.try_get("symbol")?,
            is_base: row.try_get("is_base")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Unit {
            id: UnitId(row.id),
            code: row.code,
            name: row.name,
            type_id: UnitTypeId(row.type_id),
            symbol: row.symbol,
            is_base: row.is_base,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, Clone)]
struct AliasRow {
    unit_id: i64,
    alias: String,
    is_preferred: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AliasRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AliasRow {
            unit_id: row.try_get("unit_id")?,
            alias: row.try_get("alias")?,
            is_preferred: row.try_get("is_preferred")?,
        })
    }
}

impl From<AliasRow> for Alias {
    fn from(row: AliasRow) -> Self {
        Alias {
            unit_id: UnitId(row.unit_id),
            alias: row.alias,
            is_preferred: row.is_preferred,
        }
    }
}

#[derive(Debug, Clone)]
struct ConversionRow {
    id: i64,
    source_unit_id: i64,
    target_unit_id: i64,
    factor: Decimal,
    offset_value: Decimal,
    direction: String,
    is_linear: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ConversionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ConversionRow {
            id: row.try_get("id")?,
            source_unit_id: row.try_get("source_unit_id")?,
            target_unit_id: row.try_get("target_unit_id")?,
            factor: row.try_get("factor")?,
            offset_value: row.try_get("offset_value")?,
            direction: row.try_get("direction")?,
            is_linear: row.try_get("is_linear")?,
        })
    }
}

impl TryFrom<ConversionRow> for Conversion {
    type Error = UomError;

    fn try_from(row: ConversionRow) -> Result<Self, Self::Error> {
        Ok(Conversion {
            id: ConversionId(row.id),
            source_unit_id: UnitId(row.source_unit_id),
            target_unit_id: UnitId(row.target_unit_id),
            factor: row.factor,
            offset: row.offset_value,
            direction: row.direction.parse()?,
            is_linear: row.is_linear,
        })
    }
}

#[derive(Debug, Clone)]
struct CompoundRow {
    id: i64,
    name: String,
    symbol: Option<String>,
    type_id: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CompoundRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CompoundRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            symbol: row.try_get("symbol")?,
            type_id: row.try_get("type_id")?,
        })
    }
}

#[derive(Debug, Clone)]
struct ComponentRow {
    compound_unit_id: i64,
    unit_id: i64,
    exponent: i32,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ComponentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ComponentRow {
            compound_unit_id: row.try_get("compound_unit_id")?,
            unit_id: row.try_get("unit_id")?,
            exponent: row.try_get("exponent")?,
        })
    }
}

#[derive(Debug, Clone)]
struct PackagingRow {
    id: i64,
    base_unit_id: i64,
    package_unit_id: i64,
    quantity: i32,
    label: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for PackagingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PackagingRow {
            id: row.try_get("id")?,
            base_unit_id: row.try_get("base_unit_id")?,
            package_unit_id: row.try_get("package_unit_id")?,
            quantity: row.try_get("quantity")?,
            label: row.try_get("label")?,
        })
    }
}

impl TryFrom<PackagingRow> for Packaging {
    type Error = UomError;

    fn try_from(row: PackagingRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                UomError::invalid_definition(format!(
                    "packaging {} has non-positive quantity {}",
                    row.id, row.quantity
                ))
            })?;
        Ok(Packaging {
            id: PackagingId(row.id),
            base_unit_id: UnitId(row.base_unit_id),
            package_unit_id: UnitId(row.package_unit_id),
            quantity,
            label: row.label,
        })
    }
}

#[derive(Debug, Clone)]
struct ItemPackagingRow {
    item_id: uuid::Uuid,
    packaging_id: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ItemPackagingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemPackagingRow {
            item_id: row.try_get("item_id")?,
            packaging_id: row.try_get("packaging_id")?,
        })
    }
}

impl From<ItemPackagingRow> for ItemPackaging {
    fn from(row: ItemPackagingRow) -> Self {
        ItemPackaging {
            item_id: RecordId::from_uuid(row.item_id),
            packaging_id: PackagingId(row.packaging_id),
        }
    }
}

#[derive(Debug, Clone)]
struct GroupRow {
    id: i64,
    name: String,
    description: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for GroupRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GroupRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }
}

#[derive(Debug, Clone)]
struct GroupMemberRow {
    group_id: i64,
    unit_id: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for GroupMemberRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GroupMemberRow {
            group_id: row.try_get("group_id")?,
            unit_id: row.try_get("unit_id")?,
        })
    }
}
