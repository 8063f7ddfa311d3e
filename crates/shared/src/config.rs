//! Configuration types for Opsgraph
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Weights and thresholds here encode product judgement and
//! are meant to be tuned per deployment.

use crate::error::{CatalogError, Result};
use crate::relation::EdgeKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub criticality: CriticalityWeights,
    pub gate: GateConfig,
    pub impact: ImpactConfig,
    pub path: PathConfig,
    pub explain: ExplainConfig,
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON or YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_structured(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gate.min_reason_length == 0 {
            return Err(CatalogError::Config(
                "gate.minReasonLength must be at least 1".to_string(),
            ));
        }
        if self.impact.high_threshold < self.impact.medium_threshold {
            return Err(CatalogError::Config(
                "impact.highThreshold must not be below impact.mediumThreshold".to_string(),
            ));
        }
        if self.path.kinds.is_empty() {
            return Err(CatalogError::Config(
                "path.kinds must name at least one edge kind".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CatalogError::Config(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weights of the MCP criticality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CriticalityWeights {
    /// Per dependent (incoming dependency edge)
    pub incoming_weight: u32,
    /// Per dependency (outgoing dependency edge)
    pub outgoing_weight: u32,
}

impl Default for CriticalityWeights {
    fn default() -> Self {
        Self {
            incoming_weight: 2,
            outgoing_weight: 1,
        }
    }
}

/// Dependency gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    /// Minimum trimmed length of a soft-block override reason
    pub min_reason_length: usize,

    /// How many hops of relations to collect as evidence around the target
    pub neighborhood_depth: usize,

    /// Attribute names whose change alters a consumer-facing contract
    pub contract_fields: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_reason_length: 10,
            neighborhood_depth: 1,
            contract_fields: vec![
                "endpoint".to_string(),
                "protocol".to_string(),
                "dependencyType".to_string(),
                "bridgeType".to_string(),
                "inputSchema".to_string(),
            ],
        }
    }
}

/// Impact analysis settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImpactConfig {
    /// Affected domain count from which impact is rated medium
    pub medium_threshold: usize,
    /// Affected domain count from which impact is rated high
    pub high_threshold: usize,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            medium_threshold: 2,
            high_threshold: 4,
        }
    }
}

/// Path finding settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathConfig {
    /// Edge kinds searched by default
    pub kinds: Vec<EdgeKind>,

    /// Edge kinds traversed in both directions
    pub undirected: Vec<EdgeKind>,

    /// Sort adjacency by relation id so ties resolve the same way every time.
    /// When off, ties follow store fetch order.
    pub stable_order: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            kinds: vec![EdgeKind::Bridge, EdgeKind::McpDependency],
            undirected: vec![EdgeKind::Bridge],
            stable_order: false,
        }
    }
}

/// External explanation service settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplainConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl ExplainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5_000,
        }
    }
}

/// Retry policy for store reads, owned by whoever builds the store handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Read a JSON or YAML document, chosen by file extension
pub fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        other => Err(CatalogError::Config(format!(
            "unsupported file extension {:?} for {}; expected .json, .yaml or .yml",
            other,
            path.display()
        ))),
    }
}
