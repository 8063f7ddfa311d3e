//! Store ports
//!
//! The analysis engine only ever reads through [`EntityStore`]. Mutations the
//! gate has cleared are committed through [`CatalogWriter`]; consistency of
//! that commit is the backend's responsibility, not the gate's.
//!
//! ```text
//! Engine                │  Backends
//! ──────────────────────┼────────────────────────
//! trait EntityStore     │  InMemoryStore
//!   get_entity()        │  ReplicaStore (primary + graph replica)
//!   list_relations()    │  relational database (external)
//! trait CatalogWriter   │
//!   apply()             │
//! ```

use async_trait::async_trait;
use shared::{Entity, EntityKind, EntityRef, Mutation, Relation, RelationKind, Result};
use std::collections::HashSet;

/// Endpoint filter for relation queries. Set fields must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationFilter {
    pub source: Option<EntityRef>,
    pub target: Option<EntityRef>,
}

impl RelationFilter {
    /// Matches every row
    pub fn any() -> Self {
        Self::default()
    }

    pub fn from_source(source: EntityRef) -> Self {
        Self {
            source: Some(source),
            target: None,
        }
    }

    pub fn to_target(target: EntityRef) -> Self {
        Self {
            source: None,
            target: Some(target),
        }
    }

    pub fn matches(&self, relation: &Relation) -> bool {
        self.source.as_ref().map_or(true, |s| &relation.source == s)
            && self.target.as_ref().map_or(true, |t| &relation.target == t)
    }
}

/// Read-only access to catalogued entities and their relations
///
/// Implementations must be `Send + Sync`: checks run concurrently against the
/// same handle. Unreachable backends report `CatalogError::UpstreamUnavailable`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Find an entity by kind and id
    async fn get_entity(&self, entity: &EntityRef) -> Result<Option<Entity>>;

    /// All entities of a kind, in store order
    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>>;

    /// Relation rows of one table, in store order
    async fn list_relations(
        &self,
        kind: RelationKind,
        filter: &RelationFilter,
    ) -> Result<Vec<Relation>>;

    /// Structural children (subdomains of a domain, MCPs of a subdomain, tools of an MCP)
    async fn list_children(&self, parent: &EntityRef) -> Result<Vec<Entity>>;

    /// Rows of one table where `entity` is source or target, outgoing rows first
    async fn list_relations_touching(
        &self,
        kind: RelationKind,
        entity: &EntityRef,
    ) -> Result<Vec<Relation>> {
        if !kind.involves(entity.kind) {
            return Ok(Vec::new());
        }

        let mut rows = self
            .list_relations(kind, &RelationFilter::from_source(entity.clone()))
            .await?;
        let mut seen: HashSet<String> = rows.iter().map(|r| r.id.clone()).collect();

        for row in self
            .list_relations(kind, &RelationFilter::to_target(entity.clone()))
            .await?
        {
            if seen.insert(row.id.clone()) {
                rows.push(row);
            }
        }

        Ok(rows)
    }

    /// Name used in logs and errors
    fn name(&self) -> &str {
        "entity-store"
    }
}

/// Write port used once a mutation has cleared the gate
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn apply(&self, mutation: &Mutation) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_any_matches_everything() {
        let bridge = Relation::bridge("b1", "crew-ops", "flight-ops");
        assert!(RelationFilter::any().matches(&bridge));
    }

    #[test]
    fn test_filter_by_endpoint() {
        let bridge = Relation::bridge("b1", "crew-ops", "flight-ops");

        assert!(RelationFilter::from_source(EntityRef::subdomain("crew-ops")).matches(&bridge));
        assert!(!RelationFilter::from_source(EntityRef::subdomain("flight-ops")).matches(&bridge));
        assert!(RelationFilter::to_target(EntityRef::subdomain("flight-ops")).matches(&bridge));
    }

    #[test]
    fn test_filter_both_endpoints_must_match() {
        let bridge = Relation::bridge("b1", "crew-ops", "flight-ops");
        let filter = RelationFilter {
            source: Some(EntityRef::subdomain("crew-ops")),
            target: Some(EntityRef::subdomain("cargo")),
        };
        assert!(!filter.matches(&bridge));
    }
}
