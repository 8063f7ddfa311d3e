//! Error types for Opsgraph

use crate::entity::{EntityKind, EntityRef};
use thiserror::Error;

/// Error thrown when a checked or analysed entity does not exist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} '{id}' not found")]
pub struct EntityNotFoundError {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityNotFoundError {
    pub fn new(entity: &EntityRef) -> Self {
        Self {
            kind: entity.kind,
            id: entity.id.clone(),
        }
    }
}

/// Error thrown when caller input violates a constraint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid '{field}': {constraint}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// Error thrown when a backing store cannot be reached
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Upstream '{upstream}' unavailable: {message}")]
pub struct UpstreamUnavailableError {
    pub upstream: String,
    pub message: String,
}

impl UpstreamUnavailableError {
    pub fn new(upstream: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            message: message.into(),
        }
    }
}

/// General Opsgraph error type
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    EntityNotFound(#[from] EntityNotFoundError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UpstreamUnavailable(#[from] UpstreamUnavailableError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CatalogError {
    /// Shorthand for a missing entity
    pub fn not_found(entity: &EntityRef) -> Self {
        EntityNotFoundError::new(entity).into()
    }

    /// Shorthand for a validation failure
    pub fn validation(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        ValidationError::new(field, constraint).into()
    }

    /// Shorthand for an unreachable upstream
    pub fn unavailable(upstream: impl Into<String>, message: impl Into<String>) -> Self {
        UpstreamUnavailableError::new(upstream, message).into()
    }

    /// Errors caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::EntityNotFound(_) | CatalogError::Validation(_)
        )
    }

    /// Errors that are worth retrying against the same upstream
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
