//! Relationship records between catalogued entities

use crate::entity::{EntityKind, EntityRef};
use crate::error::{CatalogError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relationship tables exposed by the entity store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// subdomain → subdomain
    Bridge,
    /// dependent mcp → provider mcp
    McpDependency,
    /// agent → agent
    AgentCollaboration,
    /// workflow → mcp
    WorkflowMcp,
    /// workflow → agent
    WorkflowAgent,
    /// agent → mcp
    AgentMcp,
}

impl RelationKind {
    pub const ALL: [RelationKind; 6] = [
        RelationKind::Bridge,
        RelationKind::McpDependency,
        RelationKind::AgentCollaboration,
        RelationKind::WorkflowMcp,
        RelationKind::WorkflowAgent,
        RelationKind::AgentMcp,
    ];

    pub fn edge_kind(&self) -> EdgeKind {
        match self {
            RelationKind::Bridge => EdgeKind::Bridge,
            RelationKind::McpDependency => EdgeKind::McpDependency,
            RelationKind::AgentCollaboration => EdgeKind::AgentCollaboration,
            RelationKind::WorkflowMcp | RelationKind::WorkflowAgent => EdgeKind::WorkflowLink,
            RelationKind::AgentMcp => EdgeKind::AgentMcp,
        }
    }

    /// Endpoint kinds as `(source, target)`
    pub fn endpoint_kinds(&self) -> (EntityKind, EntityKind) {
        match self {
            RelationKind::Bridge => (EntityKind::Subdomain, EntityKind::Subdomain),
            RelationKind::McpDependency => (EntityKind::Mcp, EntityKind::Mcp),
            RelationKind::AgentCollaboration => (EntityKind::Agent, EntityKind::Agent),
            RelationKind::WorkflowMcp => (EntityKind::Workflow, EntityKind::Mcp),
            RelationKind::WorkflowAgent => (EntityKind::Workflow, EntityKind::Agent),
            RelationKind::AgentMcp => (EntityKind::Agent, EntityKind::Mcp),
        }
    }

    /// Whether rows of this kind can touch an entity of `kind`
    pub fn involves(&self, kind: EntityKind) -> bool {
        let (source, target) = self.endpoint_kinds();
        source == kind || target == kind
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::Bridge => "bridge",
            RelationKind::McpDependency => "mcp_dependency",
            RelationKind::AgentCollaboration => "agent_collaboration",
            RelationKind::WorkflowMcp => "workflow_mcp",
            RelationKind::WorkflowAgent => "workflow_agent",
            RelationKind::AgentMcp => "agent_mcp",
        };
        f.write_str(name)
    }
}

/// Edge kinds of a materialized subgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Structural parent → child (domain → subdomain → mcp → tool)
    Hierarchy,
    Bridge,
    McpDependency,
    AgentCollaboration,
    /// Workflow → mcp and workflow → agent
    WorkflowLink,
    AgentMcp,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 6] = [
        EdgeKind::Hierarchy,
        EdgeKind::Bridge,
        EdgeKind::McpDependency,
        EdgeKind::AgentCollaboration,
        EdgeKind::WorkflowLink,
        EdgeKind::AgentMcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Hierarchy => "hierarchy",
            EdgeKind::Bridge => "bridge",
            EdgeKind::McpDependency => "mcp_dependency",
            EdgeKind::AgentCollaboration => "agent_collaboration",
            EdgeKind::WorkflowLink => "workflow_link",
            EdgeKind::AgentMcp => "agent_mcp",
        }
    }

    /// Store tables backing this edge kind. Hierarchy has none: it comes from
    /// parent ids on the entity rows.
    pub fn relation_kinds(&self) -> &'static [RelationKind] {
        match self {
            EdgeKind::Hierarchy => &[],
            EdgeKind::Bridge => &[RelationKind::Bridge],
            EdgeKind::McpDependency => &[RelationKind::McpDependency],
            EdgeKind::AgentCollaboration => &[RelationKind::AgentCollaboration],
            EdgeKind::WorkflowLink => &[RelationKind::WorkflowMcp, RelationKind::WorkflowAgent],
            EdgeKind::AgentMcp => &[RelationKind::AgentMcp],
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EdgeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| CatalogError::validation("edgeKind", format!("unknown edge kind '{}'", s)))
    }
}

/// Link strength, always within `1..=10`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Strength(u8);

impl Strength {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::new(
                "strength",
                format!("must be between {} and {}, got {}", Self::MIN, Self::MAX, value),
            ))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Strength {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for Strength {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Strength> for u8 {
    fn from(value: Strength) -> Self {
        value.0
    }
}

/// A relationship row. Stored once, directed from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub kind: RelationKind,
    pub source: EntityRef,
    pub target: EntityRef,

    /// Bridge type, dependency type, collaboration type or link role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,

    #[serde(default)]
    pub critical: bool,

    /// Collaboration rows may be traversed both ways
    #[serde(default)]
    pub bidirectional: bool,
}

impl Relation {
    fn new(kind: RelationKind, id: impl Into<String>, source: EntityRef, target: EntityRef) -> Self {
        Self {
            id: id.into(),
            kind,
            source,
            target,
            label: None,
            strength: None,
            critical: false,
            bidirectional: false,
        }
    }

    pub fn bridge(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(
            RelationKind::Bridge,
            id,
            EntityRef::subdomain(from),
            EntityRef::subdomain(to),
        )
    }

    /// `dependent` relies on `provider`
    pub fn mcp_dependency(
        id: impl Into<String>,
        dependent: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::McpDependency,
            id,
            EntityRef::mcp(dependent),
            EntityRef::mcp(provider),
        )
    }

    pub fn agent_collaboration(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::AgentCollaboration,
            id,
            EntityRef::agent(from),
            EntityRef::agent(to),
        )
    }

    pub fn workflow_mcp(
        id: impl Into<String>,
        workflow: impl Into<String>,
        mcp: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::WorkflowMcp,
            id,
            EntityRef::workflow(workflow),
            EntityRef::mcp(mcp),
        )
    }

    pub fn workflow_agent(
        id: impl Into<String>,
        workflow: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::WorkflowAgent,
            id,
            EntityRef::workflow(workflow),
            EntityRef::agent(agent),
        )
    }

    /// Primary links are flagged critical
    pub fn agent_mcp(
        id: impl Into<String>,
        agent: impl Into<String>,
        mcp: impl Into<String>,
        primary: bool,
    ) -> Self {
        let mut relation = Self::new(
            RelationKind::AgentMcp,
            id,
            EntityRef::agent(agent),
            EntityRef::mcp(mcp),
        );
        relation.label = Some(if primary { "primary" } else { "secondary" }.to_string());
        relation.critical = primary;
        relation
    }

    /// Builder: set label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder: set strength
    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Builder: flag as critical
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Builder: flag as bidirectional
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn touches(&self, entity: &EntityRef) -> bool {
        &self.source == entity || &self.target == entity
    }

    /// The endpoint opposite `entity`, if `entity` is an endpoint
    pub fn other_end(&self, entity: &EntityRef) -> Option<&EntityRef> {
        if &self.source == entity {
            Some(&self.target)
        } else if &self.target == entity {
            Some(&self.source)
        } else {
            None
        }
    }
}
