//! Catalog snapshots
//!
//! A snapshot is the serialized form of every row in the catalog, grouped by
//! table. It seeds an [`InMemoryStore`] and can be written back after a
//! mutation has been applied.
//!
//! ```yaml
//! domains:
//!   - id: flight-ops
//!     name: Flight Operations
//! subdomains:
//!   - id: crew
//!     name: Crew Management
//!     domainId: flight-ops
//! agents:
//!   - id: roster-agent
//!     name: Roster Agent
//!     status: active
//!     primaryMcpId: roster
//! bridges:
//!   - id: b1
//!     sourceSubdomainId: crew
//!     targetSubdomainId: dispatch
//!     isCritical: true
//! ```

use crate::in_memory::InMemoryStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    load_structured, CatalogError, Entity, EntityKind, EntityRef, Relation, RelationKind, Result,
    Status, Strength,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Domain, subdomain, MCP, tool or workflow row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRow {
    pub id: String,
    pub name: String,

    /// Id of the structural parent; accepts the table's natural column name
    #[serde(
        default,
        alias = "domainId",
        alias = "subdomainId",
        alias = "mcpId",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// Agent row; MCP usage is stored on the agent itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRow {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_mcp_id: Option<String>,

    /// Secondary MCPs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRow {
    pub id: String,
    pub source_subdomain_id: String,
    pub target_subdomain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpDependencyRow {
    pub id: String,
    /// The dependent MCP
    pub mcp_id: String,
    pub depends_on_mcp_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCollaborationRow {
    pub id: String,
    pub agent_id: String,
    pub collaborator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaboration_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMcpRow {
    pub id: String,
    pub workflow_id: String,
    pub mcp_id: String,
    /// Required links are critical
    #[serde(default)]
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAgentRow {
    pub id: String,
    pub workflow_id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Every row of the catalog, grouped by table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogSnapshot {
    pub domains: Vec<EntityRow>,
    pub subdomains: Vec<EntityRow>,
    pub mcps: Vec<EntityRow>,
    pub tools: Vec<EntityRow>,
    pub agents: Vec<AgentRow>,
    pub workflows: Vec<EntityRow>,
    pub bridges: Vec<BridgeRow>,
    pub mcp_dependencies: Vec<McpDependencyRow>,
    pub agent_collaborations: Vec<AgentCollaborationRow>,
    pub workflow_mcps: Vec<WorkflowMcpRow>,
    pub workflow_agents: Vec<WorkflowAgentRow>,
}

impl CatalogSnapshot {
    /// Load a snapshot from a JSON or YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot: Self = load_structured(path)?;
        info!(
            path = %path.display(),
            entities = snapshot.entity_count(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }

    /// Write the snapshot as JSON or YAML, chosen by extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            other => {
                return Err(CatalogError::Config(format!(
                    "unsupported snapshot extension {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn entity_count(&self) -> usize {
        self.domains.len()
            + self.subdomains.len()
            + self.mcps.len()
            + self.tools.len()
            + self.agents.len()
            + self.workflows.len()
    }

    // ========== Projection ==========

    /// Project rows into entities, in table order
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities = Vec::with_capacity(self.entity_count());
        for (kind, rows) in [
            (EntityKind::Domain, &self.domains),
            (EntityKind::Subdomain, &self.subdomains),
            (EntityKind::Mcp, &self.mcps),
            (EntityKind::Tool, &self.tools),
        ] {
            entities.extend(rows.iter().map(|row| row.to_entity(kind)));
        }
        entities.extend(self.agents.iter().map(AgentRow::to_entity));
        entities.extend(
            self.workflows
                .iter()
                .map(|row| row.to_entity(EntityKind::Workflow)),
        );
        entities
    }

    /// Project rows into relations, including agent → MCP links
    pub fn relations(&self) -> Vec<Relation> {
        let mut relations = Vec::new();

        for row in &self.bridges {
            let mut relation = Relation::bridge(
                &row.id,
                &row.source_subdomain_id,
                &row.target_subdomain_id,
            );
            relation.label = row.bridge_type.clone();
            relation.strength = row.strength;
            relation.critical = row.is_critical;
            relations.push(relation);
        }

        for row in &self.mcp_dependencies {
            let mut relation =
                Relation::mcp_dependency(&row.id, &row.mcp_id, &row.depends_on_mcp_id);
            relation.label = row.dependency_type.clone();
            relation.strength = row.strength;
            relation.critical = row.is_critical;
            relations.push(relation);
        }

        for row in &self.agent_collaborations {
            let mut relation =
                Relation::agent_collaboration(&row.id, &row.agent_id, &row.collaborator_id);
            relation.label = row.collaboration_type.clone();
            relation.strength = row.strength;
            relation.bidirectional = row.bidirectional;
            relations.push(relation);
        }

        for row in &self.workflow_mcps {
            let mut relation = Relation::workflow_mcp(&row.id, &row.workflow_id, &row.mcp_id);
            relation.critical = row.is_required;
            relations.push(relation);
        }

        for row in &self.workflow_agents {
            let mut relation =
                Relation::workflow_agent(&row.id, &row.workflow_id, &row.agent_id);
            relation.label = row.role.clone();
            relations.push(relation);
        }

        for agent in &self.agents {
            if let Some(primary) = &agent.primary_mcp_id {
                relations.push(Relation::agent_mcp(
                    format!("{}:primary:{}", agent.id, primary),
                    &agent.id,
                    primary,
                    true,
                ));
            }
            for mcp in &agent.mcp_ids {
                if Some(mcp) == agent.primary_mcp_id.as_ref() {
                    continue;
                }
                relations.push(Relation::agent_mcp(
                    format!("{}:secondary:{}", agent.id, mcp),
                    &agent.id,
                    mcp,
                    false,
                ));
            }
        }

        relations
    }

    /// Build an in-memory store from the snapshot
    ///
    /// Duplicate `(kind, id)` rows are rejected. Relations pointing at missing
    /// rows are kept: the gate reports them as unresolved references.
    pub fn into_store(self) -> Result<InMemoryStore> {
        let store = InMemoryStore::new();
        let mut seen: HashSet<EntityRef> = HashSet::new();

        for entity in self.entities() {
            let key = entity.key();
            if !seen.insert(key.clone()) {
                return Err(CatalogError::validation(
                    "snapshot",
                    format!("duplicate entity {}", key),
                ));
            }
            store.insert_entity(entity)?;
        }

        for relation in self.relations() {
            for end in [&relation.source, &relation.target] {
                if !seen.contains(end) {
                    warn!(
                        relation = %relation.id,
                        kind = %relation.kind,
                        missing = %end,
                        "Relation references a missing entity"
                    );
                }
            }
            store.insert_relation(relation)?;
        }

        Ok(store)
    }

    /// Capture the current contents of an in-memory store
    pub fn from_store(store: &InMemoryStore) -> Result<Self> {
        let mut snapshot = Self::default();
        let mut agents: Vec<AgentRow> = Vec::new();

        for entity in store.all_entities()? {
            match entity.kind {
                EntityKind::Domain => snapshot.domains.push(EntityRow::from(&entity)),
                EntityKind::Subdomain => snapshot.subdomains.push(EntityRow::from(&entity)),
                EntityKind::Mcp => snapshot.mcps.push(EntityRow::from(&entity)),
                EntityKind::Tool => snapshot.tools.push(EntityRow::from(&entity)),
                EntityKind::Workflow => snapshot.workflows.push(EntityRow::from(&entity)),
                EntityKind::Agent => agents.push(AgentRow {
                    id: entity.id.clone(),
                    name: entity.name.clone(),
                    status: entity.status,
                    description: entity.description.clone(),
                    primary_mcp_id: None,
                    mcp_ids: Vec::new(),
                    attributes: entity.attributes.clone(),
                }),
            }
        }

        for relation in store.all_relations()? {
            let source = relation.source.id.clone();
            let target = relation.target.id.clone();
            match relation.kind {
                RelationKind::Bridge => snapshot.bridges.push(BridgeRow {
                    id: relation.id,
                    source_subdomain_id: source,
                    target_subdomain_id: target,
                    bridge_type: relation.label,
                    strength: relation.strength,
                    is_critical: relation.critical,
                }),
                RelationKind::McpDependency => {
                    snapshot.mcp_dependencies.push(McpDependencyRow {
                        id: relation.id,
                        mcp_id: source,
                        depends_on_mcp_id: target,
                        dependency_type: relation.label,
                        strength: relation.strength,
                        is_critical: relation.critical,
                    })
                }
                RelationKind::AgentCollaboration => {
                    snapshot.agent_collaborations.push(AgentCollaborationRow {
                        id: relation.id,
                        agent_id: source,
                        collaborator_id: target,
                        collaboration_type: relation.label,
                        strength: relation.strength,
                        bidirectional: relation.bidirectional,
                    })
                }
                RelationKind::WorkflowMcp => snapshot.workflow_mcps.push(WorkflowMcpRow {
                    id: relation.id,
                    workflow_id: source,
                    mcp_id: target,
                    is_required: relation.critical,
                }),
                RelationKind::WorkflowAgent => {
                    snapshot.workflow_agents.push(WorkflowAgentRow {
                        id: relation.id,
                        workflow_id: source,
                        agent_id: target,
                        role: relation.label,
                    })
                }
                RelationKind::AgentMcp => {
                    if let Some(agent) = agents.iter_mut().find(|a| a.id == source) {
                        if relation.critical && agent.primary_mcp_id.is_none() {
                            agent.primary_mcp_id = Some(target);
                        } else {
                            agent.mcp_ids.push(target);
                        }
                    }
                }
            }
        }

        snapshot.agents = agents;
        Ok(snapshot)
    }
}

impl EntityRow {
    fn to_entity(&self, kind: EntityKind) -> Entity {
        Entity {
            kind,
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            parent_id: self.parent.clone(),
            description: self.description.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl From<&Entity> for EntityRow {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            parent: entity.parent_id.clone(),
            status: entity.status,
            description: entity.description.clone(),
            attributes: entity.attributes.clone(),
        }
    }
}

impl AgentRow {
    fn to_entity(&self) -> Entity {
        Entity {
            kind: EntityKind::Agent,
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            parent_id: None,
            description: self.description.clone(),
            attributes: self.attributes.clone(),
        }
    }
}
