//! `unitforge-core`: shared building blocks for the unitforge crates.
//!
//! Pure primitives only: identifiers, the domain error model, and the small
//! marker traits the engine types implement. No infrastructure concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{RecordId, TenantId, UserId};
pub use value_object::ValueObject;
