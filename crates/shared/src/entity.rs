//! Catalog entity types
//!
//! Every catalogued row (domain, subdomain, MCP, tool, agent, workflow) is
//! projected into a single [`Entity`] record keyed by an [`EntityRef`].
//! Identity is always the `(kind, id)` pair; ids alone are not unique.

use crate::error::{CatalogError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of catalogued entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Domain,
    Subdomain,
    Mcp,
    Tool,
    Agent,
    Workflow,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Domain,
        EntityKind::Subdomain,
        EntityKind::Mcp,
        EntityKind::Tool,
        EntityKind::Agent,
        EntityKind::Workflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Domain => "domain",
            EntityKind::Subdomain => "subdomain",
            EntityKind::Mcp => "mcp",
            EntityKind::Tool => "tool",
            EntityKind::Agent => "agent",
            EntityKind::Workflow => "workflow",
        }
    }

    /// Kind of the structural parent (domain → subdomain → mcp → tool)
    pub fn parent_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Subdomain => Some(EntityKind::Domain),
            EntityKind::Mcp => Some(EntityKind::Subdomain),
            EntityKind::Tool => Some(EntityKind::Mcp),
            _ => None,
        }
    }

    /// Kind of the structural children
    pub fn child_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Domain => Some(EntityKind::Subdomain),
            EntityKind::Subdomain => Some(EntityKind::Mcp),
            EntityKind::Mcp => Some(EntityKind::Tool),
            _ => None,
        }
    }

    /// Statuses an entity of this kind may carry. Empty means status-less.
    pub fn allowed_statuses(&self) -> &'static [Status] {
        match self {
            EntityKind::Mcp | EntityKind::Tool => {
                &[Status::Planned, Status::InProgress, Status::Built]
            }
            EntityKind::Agent => &[Status::Planned, Status::Active, Status::Inactive],
            EntityKind::Workflow => &[
                Status::Planned,
                Status::InProgress,
                Status::Active,
                Status::Deprecated,
            ],
            EntityKind::Domain | EntityKind::Subdomain => &[],
        }
    }

    /// Reject a status that this kind cannot carry
    pub fn validate_status(&self, status: Status) -> Result<(), ValidationError> {
        let allowed = self.allowed_statuses();
        if allowed.is_empty() {
            return Err(ValidationError::new(
                "status",
                format!("{} entities do not carry a status", self),
            ));
        }
        if !allowed.contains(&status) {
            let names: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
            return Err(ValidationError::new(
                "status",
                format!(
                    "'{}' is not valid for {}; expected one of: {}",
                    status,
                    self,
                    names.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                CatalogError::validation(
                    "entityType",
                    format!(
                        "unknown entity type '{}'; expected one of: domain, subdomain, mcp, tool, agent, workflow",
                        s
                    ),
                )
            })
    }
}

/// Typed reference to a catalogued entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn domain(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Domain, id)
    }

    pub fn subdomain(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Subdomain, id)
    }

    pub fn mcp(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Mcp, id)
    }

    pub fn tool(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Tool, id)
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Agent, id)
    }

    pub fn workflow(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Workflow, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = CatalogError;

    /// Parse `kind:id`, e.g. `mcp:crew-scheduling`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            CatalogError::validation("entity", format!("expected 'kind:id', got '{}'", s))
        })?;
        let id = id.trim();
        if id.is_empty() {
            return Err(CatalogError::validation("entity", "id must not be empty"));
        }
        Ok(EntityRef::new(kind.parse()?, id))
    }
}

/// Lifecycle status of an MCP, tool, agent or workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Planned,
    InProgress,
    Built,
    Active,
    Inactive,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Planned => "planned",
            Status::InProgress => "in_progress",
            Status::Built => "built",
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::Deprecated => "deprecated",
        }
    }

    /// Live entities are ones other parts of the operation rely on today
    pub fn is_live(&self) -> bool {
        matches!(self, Status::InProgress | Status::Built | Status::Active)
    }

    /// Fully operational: consumers assume the capability exists
    pub fn is_operational(&self) -> bool {
        matches!(self, Status::Built | Status::Active)
    }

    /// Ordering used to detect downgrades
    pub fn maturity(&self) -> u8 {
        match self {
            Status::Planned | Status::Inactive | Status::Deprecated => 0,
            Status::InProgress => 1,
            Status::Built | Status::Active => 2,
        }
    }

    pub fn is_downgrade_to(&self, next: Status) -> bool {
        next.maturity() < self.maturity()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "planned" => Ok(Status::Planned),
            "in_progress" => Ok(Status::InProgress),
            "built" => Ok(Status::Built),
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            "deprecated" => Ok(Status::Deprecated),
            _ => Err(CatalogError::validation(
                "status",
                format!("unknown status '{}'", s),
            )),
        }
    }
}

/// A catalogued row, projected to the fields the analysis needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,

    /// Lifecycle status (MCP, tool, agent, workflow only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Id of the structural parent; its kind is `kind.parent_kind()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form attributes (endpoint, protocol, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            status: None,
            parent_id: None,
            description: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder: set status
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Builder: set structural parent id
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id.clone())
    }

    pub fn parent(&self) -> Option<EntityRef> {
        let kind = self.kind.parent_kind()?;
        self.parent_id
            .as_ref()
            .map(|id| EntityRef::new(kind, id.clone()))
    }

    /// Status-less kinds and missing statuses count as live
    pub fn is_live(&self) -> bool {
        self.status.map(|s| s.is_live()).unwrap_or(true)
    }
}
