use std::sync::Arc;

use sqlx::PgPool;
use tokio::runtime::Handle;

use unitforge_uom::{ConversionLog, ConversionLogSink, LogSinkError};

use super::{PostgresError, map_sqlx_error};

/// Appends conversion audit records to `uom_conversion_logs`.
///
/// `record` spawns the insert and returns immediately; a failed insert is
/// traced and dropped.
#[derive(Debug, Clone)]
pub struct PostgresConversionLog {
    pool: Arc<PgPool>,
}

impl PostgresConversionLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn append(&self, entry: &ConversionLog) -> Result<(), PostgresError> {
        sqlx::query(
            r#"
            INSERT INTO uom_conversion_logs
                (id, source_unit_id, target_unit_id, factor_used, value, result, metadata, performed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.source_unit_id.get())
        .bind(entry.target_unit_id.get())
        .bind(entry.factor_used)
        .bind(entry.value)
        .bind(entry.result)
        .bind(entry.metadata.as_ref())
        .bind(entry.performed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_conversion_log", e))?;
        Ok(())
    }
}

fn current_handle() -> Result<Handle, LogSinkError> {
    Handle::try_current().map_err(|_| LogSinkError("no tokio runtime to write the conversion log".to_string()))
}

impl ConversionLogSink for PostgresConversionLog {
    fn record(&self, entry: ConversionLog) -> Result<(), LogSinkError> {
        let handle = current_handle()?;
        let sink = self.clone();
        handle.spawn(async move {
            if let Err(err) = sink.append(&entry).await {
                tracing::warn!(log_id = %entry.id, error = %err, "conversion log insert failed");
            }
        });
        Ok(())
    }
}
