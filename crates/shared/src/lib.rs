//! # Opsgraph Shared
//!
//! Catalog vocabulary used across all Opsgraph crates: entity and relation
//! records, proposed actions, configuration and the error taxonomy.

pub mod action;
pub mod config;
pub mod entity;
pub mod error;
pub mod relation;

// Re-exports
pub use action::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use relation::*;
