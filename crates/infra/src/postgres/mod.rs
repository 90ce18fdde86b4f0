//! Postgres adapters for the conversion engine.
//!
//! ## Error Mapping
//!
//! Every sqlx error goes through [`map_sqlx_error`]:
//!
//! | SQLx Error | PostgreSQL Error Code | PostgresError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (other) | any other | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` |
//! | ColumnNotFound / ColumnDecode / Decode | N/A | `Decode` |
//! | Other | N/A | `Query` |
//!
//! Adapters then translate `PostgresError` into the port error they owe
//! their caller; a unique violation on custom unit insert becomes
//! `CustomUnitStoreError::Duplicate`.
//!
//! ## Sync ports
//!
//! The engine's ports are synchronous. The adapters expose async methods
//! and implement the ports by blocking on the current tokio runtime, which
//! must be multi-threaded.

use std::future::Future;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

use unitforge_uom::{CustomUnitStoreError, LogSinkError, UomError};

use crate::config::UomConfig;

pub mod conversion_log;
pub mod custom_units;
pub mod registry;

pub use conversion_log::PostgresConversionLog;
pub use custom_units::PostgresCustomUnitStore;
pub use registry::PostgresUnitRepository;

/// Schema for every table the adapters touch. Idempotent.
pub const SCHEMA: &str = include_str!("../../migrations/0001_uom_schema.sql");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostgresError {
    #[error("unique constraint violated in {operation}: {message}")]
    UniqueViolation { operation: String, message: String },

    #[error("database unavailable in {operation}: {message}")]
    Unavailable { operation: String, message: String },

    #[error("malformed row in {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("database error in {operation}: {message}")]
    Query { operation: String, message: String },
}

impl PostgresError {
    fn unavailable(operation: &str, message: impl Into<String>) -> Self {
        PostgresError::Unavailable {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, PostgresError::UniqueViolation { .. })
    }
}

impl From<PostgresError> for UomError {
    fn from(err: PostgresError) -> Self {
        UomError::Storage(err.to_string())
    }
}

impl From<PostgresError> for CustomUnitStoreError {
    fn from(err: PostgresError) -> Self {
        CustomUnitStoreError::Storage(err.to_string())
    }
}

impl From<PostgresError> for LogSinkError {
    fn from(err: PostgresError) -> Self {
        LogSinkError(err.to_string())
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PostgresError {
    let operation = operation.to_string();
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => PostgresError::UniqueViolation { operation, message },
                _ => PostgresError::Query { operation, message },
            }
        }
        sqlx::Error::PoolClosed => PostgresError::Unavailable {
            operation,
            message: "connection pool closed".to_string(),
        },
        sqlx::Error::PoolTimedOut => PostgresError::Unavailable {
            operation,
            message: "timed out waiting for a connection".to_string(),
        },
        e @ (sqlx::Error::Io(_) | sqlx::Error::Tls(_)) => PostgresError::Unavailable {
            operation,
            message: e.to_string(),
        },
        e @ (sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)) => PostgresError::Decode {
            operation,
            message: e.to_string(),
        },
        other => PostgresError::Query {
            operation,
            message: other.to_string(),
        },
    }
}

/// Open a pool sized from `config`.
pub async fn connect(config: &UomConfig) -> anyhow::Result<PgPool> {
    let url = config.database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Apply [`SCHEMA`].
pub async fn migrate(pool: &PgPool) -> Result<(), PostgresError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    tracing::info!("uom schema applied");
    Ok(())
}

/// Run an adapter future to completion from a synchronous port method.
pub(crate) fn block_on<F>(operation: &str, future: F) -> Result<F::Output, PostgresError>
where
    F: Future,
{
    let handle = Handle::try_current()
        .map_err(|_| PostgresError::unavailable(operation, "no tokio runtime on this thread"))?;
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(PostgresError::unavailable(
            operation,
            "a multi-threaded tokio runtime is required",
        ));
    }
    Ok(tokio::task::block_in_place(|| handle.block_on(future)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_unavailable() {
        let err = map_sqlx_error("find", sqlx::Error::PoolClosed);
        assert!(matches!(err, PostgresError::Unavailable { ref operation, .. } if operation == "find"));
        assert!(matches!(
            map_sqlx_error("find", sqlx::Error::PoolTimedOut),
            PostgresError::Unavailable { .. }
        ));
    }

    #[test]
    fn decode_errors_are_reported_as_malformed_rows() {
        let err = map_sqlx_error("load_units", sqlx::Error::ColumnNotFound("symbol".to_string()));
        assert!(matches!(err, PostgresError::Decode { .. }));
        assert!(err.to_string().contains("load_units"));
    }

    #[test]
    fn other_errors_are_query_failures() {
        let err = map_sqlx_error("get", sqlx::Error::RowNotFound);
        assert!(matches!(err, PostgresError::Query { .. }));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn port_errors_carry_the_message() {
        let err = PostgresError::unavailable("insert", "down");
        assert_eq!(
            CustomUnitStoreError::from(err.clone()),
            CustomUnitStoreError::Storage("database unavailable in insert: down".to_string())
        );
        assert!(matches!(UomError::from(err.clone()), UomError::Storage(_)));
        assert_eq!(LogSinkError::from(err).0, "database unavailable in insert: down");
    }

    #[test]
    fn block_on_requires_a_runtime() {
        let err = block_on("find", async { 1 }).unwrap_err();
        assert!(matches!(err, PostgresError::Unavailable { .. }));
    }

    #[test]
    fn block_on_rejects_current_thread_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(async { block_on("find", async { 1 }) });
        assert!(result.is_err());
    }

    #[test]
    fn block_on_runs_on_multi_thread_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let result = rt.block_on(async { tokio::spawn(async { block_on("find", async { 7 }) }).await.unwrap() });
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn schema_declares_scope_uniqueness() {
        assert!(SCHEMA.contains("uom_custom_units_scope_code_key"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS uom_conversion_logs"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS uom_unit_group_members"));
        assert!(SCHEMA.contains("UNIQUE (item_id, packaging_id)"));
    }
}
