//! Infrastructure for hosts of the conversion engine: configuration and
//! Postgres adapters for reference data, custom units, and the conversion
//! audit log.

pub mod config;
pub mod postgres;

pub use config::{ConfigError, UomConfig};

#[cfg(test)]
mod integration_tests;
