//! Runtime configuration for hosts embedding the conversion engine.
//!
//! Values come from `UOM_*` environment variables. A malformed value is
//! logged and replaced by its default so a typo never stops a host from
//! starting; only a missing database URL is an error, and only for callers
//! that actually need a database.

use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use unitforge_uom::{DEFAULT_MAX_HOPS, EngineSettings};

pub const DATABASE_URL: &str = "UOM_DATABASE_URL";
pub const DEFAULT_PRECISION: &str = "UOM_DEFAULT_PRECISION";
pub const MAX_PATH_HOPS: &str = "UOM_MAX_PATH_HOPS";
pub const LOG_CONVERSIONS: &str = "UOM_LOG_CONVERSIONS";
pub const FACTOR_SCALE: &str = "UOM_FACTOR_SCALE";
pub const DB_MAX_CONNECTIONS: &str = "UOM_DB_MAX_CONNECTIONS";

/// Largest scale `rust_decimal` can represent.
const MAX_SCALE: u32 = 28;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UomConfig {
    pub database_url: Option<String>,
    pub default_precision: Option<u32>,
    pub max_path_hops: usize,
    pub log_conversions: bool,
    pub factor_scale: u32,
    pub db_max_connections: u32,
}

impl Default for UomConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            database_url: None,
            default_precision: engine.default_precision,
            max_path_hops: DEFAULT_MAX_HOPS,
            log_conversions: engine.log_conversions,
            factor_scale: engine.factor_scale,
            db_max_connections: 5,
        }
    }
}

impl UomConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` is this over the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let factor_scale = parse_or(value(FACTOR_SCALE), FACTOR_SCALE, defaults.factor_scale);
        let factor_scale = if factor_scale > MAX_SCALE {
            tracing::warn!(key = FACTOR_SCALE, factor_scale, max = MAX_SCALE, "factor scale too large, using default");
            defaults.factor_scale
        } else {
            factor_scale
        };

        let max_path_hops = parse_or(value(MAX_PATH_HOPS), MAX_PATH_HOPS, defaults.max_path_hops);
        let max_path_hops = if max_path_hops == 0 {
            tracing::warn!(key = MAX_PATH_HOPS, "path hops must be at least 1, using default");
            defaults.max_path_hops
        } else {
            max_path_hops
        };

        Self {
            database_url: value(DATABASE_URL),
            default_precision: value(DEFAULT_PRECISION).and_then(|raw| parse(&raw, DEFAULT_PRECISION)),
            max_path_hops,
            log_conversions: value(LOG_CONVERSIONS)
                .and_then(|raw| parse_flag(&raw, LOG_CONVERSIONS))
                .unwrap_or(defaults.log_conversions),
            factor_scale,
            db_max_connections: parse_or(value(DB_MAX_CONNECTIONS), DB_MAX_CONNECTIONS, defaults.db_max_connections)
                .max(1),
        }
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_precision: self.default_precision,
            max_path_hops: self.max_path_hops,
            log_conversions: self.log_conversions,
            factor_scale: self.factor_scale,
        }
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Option<T> {
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = raw, "invalid configuration value, using default");
            None
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    raw.and_then(|raw| parse(&raw, key)).unwrap_or(default)
}

fn parse_flag(raw: &str, key: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = raw, "invalid boolean, using default");
            None
        }
    }
}
