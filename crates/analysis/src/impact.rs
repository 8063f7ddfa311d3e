//! Cross-domain impact of a subdomain
//!
//! Collects the bridges touching a subdomain and the MCP dependencies touching
//! any of its MCPs, then folds every far endpoint up to its domain. The
//! subdomain's own domain is not counted: impact is measured in *other*
//! domains reached.

use crate::subgraph::{Edge, Node};
use serde::{Deserialize, Serialize};
use shared::{
    CatalogError, EdgeKind, Entity, EntityKind, EntityRef, ImpactConfig, RelationKind, Result,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use store::EntityStore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_total(total: usize, config: &ImpactConfig) -> Self {
        if total >= config.high_threshold {
            RiskLevel::High
        } else if total >= config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedDomain {
    pub domain: EntityRef,
    pub name: String,
    /// Bridge and dependency edges reaching this domain
    pub bridge_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    pub subdomain: Node,
    pub affected_domains: Vec<AffectedDomain>,
    pub bridges: Vec<Edge>,
    pub mcp_dependencies: Vec<Edge>,
    /// Number of distinct affected domains
    pub total_impact: usize,
    pub risk_level: RiskLevel,
}

pub struct ImpactAnalyzer {
    store: Arc<dyn EntityStore>,
    config: ImpactConfig,
    undirected: Vec<EdgeKind>,
}

impl ImpactAnalyzer {
    pub fn new(store: Arc<dyn EntityStore>, config: ImpactConfig) -> Self {
        Self {
            store,
            config,
            undirected: vec![EdgeKind::Bridge],
        }
    }

    pub async fn analyze(&self, subdomain_id: &str) -> Result<ImpactAnalysis> {
        let key = EntityRef::subdomain(subdomain_id);
        let subdomain = self
            .store
            .get_entity(&key)
            .await?
            .ok_or_else(|| CatalogError::not_found(&key))?;
        let own_domain = subdomain.parent();

        let bridges: Vec<Edge> = self
            .store
            .list_relations_touching(RelationKind::Bridge, &key)
            .await?
            .iter()
            .map(|r| Edge::from_relation(r, &self.undirected))
            .collect();

        let mcps: Vec<EntityRef> = self
            .store
            .list_children(&key)
            .await?
            .iter()
            .filter(|e| e.kind == EntityKind::Mcp)
            .map(Entity::key)
            .collect();
        let local: HashSet<&EntityRef> = mcps.iter().collect();

        let mut mcp_dependencies: Vec<Edge> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for mcp in &mcps {
            for row in self
                .store
                .list_relations_touching(RelationKind::McpDependency, mcp)
                .await?
            {
                if seen.insert(row.id.clone()) {
                    mcp_dependencies.push(Edge::from_relation(&row, &self.undirected));
                }
            }
        }

        let mut domains = DomainResolver::new(self.store.as_ref());
        let mut affected: Vec<AffectedDomain> = Vec::new();
        let mut positions: HashMap<EntityRef, usize> = HashMap::new();

        let mut far_ends: Vec<&EntityRef> =
            bridges.iter().filter_map(|e| e.other_end(&key)).collect();
        for edge in &mcp_dependencies {
            for end in [&edge.source, &edge.target] {
                if !local.contains(end) {
                    far_ends.push(end);
                }
            }
        }

        for end in far_ends {
            let Some(domain) = domains.domain_of(end).await? else {
                warn!(subdomain = %key, endpoint = %end, "Cannot resolve domain of endpoint");
                continue;
            };
            if Some(&domain.key()) == own_domain.as_ref() {
                continue;
            }
            match positions.get(&domain.key()) {
                Some(&i) => affected[i].bridge_count += 1,
                None => {
                    positions.insert(domain.key(), affected.len());
                    affected.push(AffectedDomain {
                        domain: domain.key(),
                        name: domain.name.clone(),
                        bridge_count: 1,
                    });
                }
            }
        }

        let total_impact = affected.len();
        debug!(
            subdomain = %key,
            bridges = bridges.len(),
            dependencies = mcp_dependencies.len(),
            total_impact,
            "Analyzed impact"
        );

        Ok(ImpactAnalysis {
            subdomain: Node::from(&subdomain),
            affected_domains: affected,
            bridges,
            mcp_dependencies,
            total_impact,
            risk_level: RiskLevel::from_total(total_impact, &self.config),
        })
    }
}

/// Walks parents up to the owning domain, memoizing lookups
struct DomainResolver<'a> {
    store: &'a dyn EntityStore,
    cache: HashMap<EntityRef, Option<Entity>>,
}

impl<'a> DomainResolver<'a> {
    fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    async fn lookup(&mut self, key: &EntityRef) -> Result<Option<Entity>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let entity = self.store.get_entity(key).await?;
        self.cache.insert(key.clone(), entity.clone());
        Ok(entity)
    }

    /// Domain owning `key`: a subdomain's parent, or an MCP's subdomain's parent
    async fn domain_of(&mut self, key: &EntityRef) -> Result<Option<Entity>> {
        let mut current = key.clone();
        loop {
            if current.kind == EntityKind::Domain {
                return self.lookup(&current).await;
            }
            let Some(entity) = self.lookup(&current).await? else {
                return Ok(None);
            };
            match entity.parent() {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }
}
