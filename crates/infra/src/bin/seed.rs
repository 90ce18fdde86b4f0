//! Applies the schema and loads the baseline reference data.
//!
//! Reads `UOM_DATABASE_URL` (required) and the other `UOM_*` settings.

use anyhow::Context;

use unitforge_infra::UomConfig;
use unitforge_infra::postgres::{self, PostgresUnitRepository};
use unitforge_uom::{UomEngine, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    unitforge_observability::init();

    let config = UomConfig::from_env();
    let pool = postgres::connect(&config).await?;
    postgres::migrate(&pool).await.context("failed to apply schema")?;

    let repository = PostgresUnitRepository::new(pool);
    let baseline = seed::baseline().context("baseline reference data is invalid")?;
    repository.publish(&baseline).await?;

    // Read back what hosts will see at startup.
    let registry = repository.load_registry().await?;
    let engine = UomEngine::new(registry, config.engine_settings());
    tracing::info!(
        types = engine.registry().types().count(),
        units = engine.registry().units().count(),
        compounds = engine.registry().compounds().count(),
        "reference data ready"
    );
    Ok(())
}
