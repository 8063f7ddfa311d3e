//! Subgraph materialization
//!
//! [`GraphBuilder`] reads relation rows from an [`EntityStore`] and shapes them
//! into a [`Subgraph`] for one request. Subgraphs are never cached: every
//! analysis call builds its own from current store state.
//!
//! Two scopes are supported:
//! - `Neighborhood { depth }`: breadth-first expansion from a seed entity,
//!   used by the dependency gate as evidence.
//! - `Universe`: every row of the requested kinds, used by path finding and
//!   criticality ranking which need the whole graph.

use serde::{Deserialize, Serialize};
use shared::{
    CatalogError, EdgeKind, Entity, EntityKind, EntityRef, Relation, RelationKind, Result, Status,
    Strength,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::{EntityStore, RelationFilter};
use tracing::{debug, warn};

/// A catalogued entity as seen by the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key: EntityRef,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityRef>,
}

impl Node {
    /// Status-less kinds count as live
    pub fn is_live(&self) -> bool {
        self.status.map(|s| s.is_live()).unwrap_or(true)
    }
}

impl From<&Entity> for Node {
    fn from(entity: &Entity) -> Self {
        Self {
            key: entity.key(),
            name: entity.name.clone(),
            status: entity.status,
            parent: entity.parent(),
        }
    }
}

/// A traversable edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: EntityRef,
    pub target: EntityRef,
    pub kind: EdgeKind,
    /// `false` when traversal runs both ways
    pub directed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Strength>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Shape a relation row. Rows of an `undirected` kind, and rows flagged
    /// bidirectional, become undirected edges.
    pub fn from_relation(relation: &Relation, undirected: &[EdgeKind]) -> Self {
        let kind = relation.kind.edge_kind();
        Self {
            id: relation.id.clone(),
            source: relation.source.clone(),
            target: relation.target.clone(),
            kind,
            directed: !(relation.bidirectional || undirected.contains(&kind)),
            weight: relation.strength,
            critical: relation.critical,
            label: relation.label.clone(),
        }
    }

    /// Structural parent → child edge
    pub fn hierarchy(parent: &EntityRef, child: &EntityRef) -> Self {
        Self {
            id: format!("hierarchy:{}->{}", parent, child),
            source: parent.clone(),
            target: child.clone(),
            kind: EdgeKind::Hierarchy,
            directed: true,
            weight: None,
            critical: false,
            label: None,
        }
    }

    pub fn touches(&self, key: &EntityRef) -> bool {
        &self.source == key || &self.target == key
    }

    pub fn other_end(&self, key: &EntityRef) -> Option<&EntityRef> {
        if &self.source == key {
            Some(&self.target)
        } else if &self.target == key {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Adjacency entry: the neighbor reached and the index of the edge used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacent {
    pub neighbor: EntityRef,
    pub edge: usize,
}

/// Per-request graph
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    nodes: Vec<Node>,
    index: HashMap<EntityRef, usize>,
    edges: Vec<Edge>,
    edge_ids: HashSet<(EdgeKind, String)>,
    adjacency: HashMap<EntityRef, Vec<Adjacent>>,
    unresolved: Vec<EntityRef>,
}

impl Subgraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; an existing node with the same key is kept
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.index.contains_key(&node.key) {
            return false;
        }
        self.index.insert(node.key.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Add an edge and its adjacency entries. Duplicate ids within a kind are
    /// ignored.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.edge_ids.insert((edge.kind, edge.id.clone())) {
            return false;
        }
        let position = self.edges.len();
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .push(Adjacent {
                neighbor: edge.target.clone(),
                edge: position,
            });
        if !edge.directed {
            self.adjacency
                .entry(edge.target.clone())
                .or_default()
                .push(Adjacent {
                    neighbor: edge.source.clone(),
                    edge: position,
                });
        }
        self.edges.push(edge);
        true
    }

    /// Record a reference to a row that does not exist
    pub fn mark_unresolved(&mut self, key: EntityRef) {
        if !self.unresolved.contains(&key) {
            self.unresolved.push(key);
        }
    }

    /// Sort every adjacency list by edge id
    pub fn sort_adjacency(&mut self) {
        let edges = &self.edges;
        for list in self.adjacency.values_mut() {
            list.sort_by(|a, b| edges[a.edge].id.cmp(&edges[b.edge].id));
        }
    }

    // ========== Getters ==========

    pub fn node(&self, key: &EntityRef) -> Option<&Node> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, key: &EntityRef) -> bool {
        self.index.contains_key(key)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    /// Outgoing traversal entries, in insertion order
    pub fn neighbors(&self, key: &EntityRef) -> &[Adjacent] {
        self.adjacency.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges with `key` at either end, in insertion order
    pub fn edges_touching<'a>(&'a self, key: &'a EntityRef) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.touches(key))
    }

    pub fn unresolved(&self) -> &[EntityRef] {
        &self.unresolved
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// How far to read around the seed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Neighborhood { depth: usize },
    Universe,
}

/// Parameters of one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphRequest {
    pub seed: Option<EntityRef>,
    pub kinds: Vec<EdgeKind>,
    pub scope: Scope,
    pub undirected: Vec<EdgeKind>,
    pub stable_order: bool,
}

impl SubgraphRequest {
    /// Relations within `depth` hops of `seed`
    pub fn neighborhood(seed: EntityRef, kinds: Vec<EdgeKind>, depth: usize) -> Self {
        Self {
            seed: Some(seed),
            kinds,
            scope: Scope::Neighborhood { depth },
            undirected: Vec::new(),
            stable_order: false,
        }
    }

    /// Every relation of the given kinds
    pub fn universe(kinds: Vec<EdgeKind>) -> Self {
        Self {
            seed: None,
            kinds,
            scope: Scope::Universe,
            undirected: Vec::new(),
            stable_order: false,
        }
    }

    /// Builder: seed that must exist (universe scope)
    pub fn with_seed(mut self, seed: EntityRef) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder: kinds traversed in both directions
    pub fn with_undirected(mut self, kinds: Vec<EdgeKind>) -> Self {
        self.undirected = kinds;
        self
    }

    /// Builder: sort adjacency by edge id
    pub fn with_stable_order(mut self, stable: bool) -> Self {
        self.stable_order = stable;
        self
    }
}

/// Reads relation rows and materializes subgraphs
#[derive(Clone)]
pub struct GraphBuilder {
    store: Arc<dyn EntityStore>,
}

impl GraphBuilder {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Build the subgraph for `request`
    ///
    /// Fails with `EntityNotFound` when the seed does not exist. Relations
    /// whose far end is missing are left out and the missing key is recorded
    /// in [`Subgraph::unresolved`].
    pub async fn build(&self, request: &SubgraphRequest) -> Result<Subgraph> {
        let mut resolver = Resolver::new(self.store.as_ref());
        let mut graph = Subgraph::new();

        if let Some(seed) = &request.seed {
            let entity = resolver
                .resolve(seed)
                .await?
                .ok_or_else(|| CatalogError::not_found(seed))?;
            graph.add_node(Node::from(&entity));
        }

        match request.scope {
            Scope::Neighborhood { depth } => {
                let seed = request.seed.clone().ok_or_else(|| {
                    CatalogError::validation("seed", "neighborhood scope requires a seed entity")
                })?;
                self.expand(&mut graph, &mut resolver, request, seed, depth)
                    .await?;
            }
            Scope::Universe => {
                self.load_universe(&mut graph, &mut resolver, request)
                    .await?;
            }
        }

        if request.stable_order {
            graph.sort_adjacency();
        }

        debug!(
            seed = ?request.seed,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            unresolved = graph.unresolved().len(),
            "Built subgraph"
        );
        Ok(graph)
    }

    async fn expand(
        &self,
        graph: &mut Subgraph,
        resolver: &mut Resolver<'_>,
        request: &SubgraphRequest,
        seed: EntityRef,
        depth: usize,
    ) -> Result<()> {
        let mut visited: HashSet<EntityRef> = HashSet::from([seed.clone()]);
        let mut frontier = vec![seed];

        for _ in 0..depth {
            let mut next = Vec::new();
            for key in &frontier {
                for reached in self.expand_one(graph, resolver, request, key).await? {
                    if visited.insert(reached.clone()) {
                        next.push(reached);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(())
    }

    /// Add every edge of the requested kinds at `key`, returning the keys reached
    async fn expand_one(
        &self,
        graph: &mut Subgraph,
        resolver: &mut Resolver<'_>,
        request: &SubgraphRequest,
        key: &EntityRef,
    ) -> Result<Vec<EntityRef>> {
        let mut reached = Vec::new();

        for kind in &request.kinds {
            if *kind == EdgeKind::Hierarchy {
                for child in self.store.list_children(key).await? {
                    let child_key = child.key();
                    resolver.remember(child.clone());
                    graph.add_node(Node::from(&child));
                    graph.add_edge(Edge::hierarchy(key, &child_key));
                    reached.push(child_key);
                }

                let parent = graph.node(key).and_then(|n| n.parent.clone());
                if let Some(parent) = parent {
                    match resolver.resolve(&parent).await? {
                        Some(entity) => {
                            graph.add_node(Node::from(&entity));
                            graph.add_edge(Edge::hierarchy(&parent, key));
                            reached.push(parent);
                        }
                        None => graph.mark_unresolved(parent),
                    }
                }
                continue;
            }

            for relation_kind in kind.relation_kinds() {
                let rows = self
                    .store
                    .list_relations_touching(*relation_kind, key)
                    .await?;
                for row in rows {
                    let Some(other) = row.other_end(key).cloned() else {
                        continue;
                    };
                    match resolver.resolve(&other).await? {
                        Some(entity) => {
                            graph.add_node(Node::from(&entity));
                            graph.add_edge(Edge::from_relation(&row, &request.undirected));
                            reached.push(other);
                        }
                        None => {
                            warn!(relation = %row.id, missing = %other, "Dangling relation");
                            graph.mark_unresolved(other);
                        }
                    }
                }
            }
        }

        Ok(reached)
    }

    async fn load_universe(
        &self,
        graph: &mut Subgraph,
        resolver: &mut Resolver<'_>,
        request: &SubgraphRequest,
    ) -> Result<()> {
        let relation_kinds: Vec<RelationKind> = request
            .kinds
            .iter()
            .flat_map(|k| k.relation_kinds().iter().copied())
            .collect();

        // Nodes first, in store order, so isolated entities are still present
        let mut entity_kinds: Vec<EntityKind> = Vec::new();
        if request.kinds.contains(&EdgeKind::Hierarchy) {
            entity_kinds.extend(EntityKind::ALL);
        }
        for relation_kind in &relation_kinds {
            let (source, target) = relation_kind.endpoint_kinds();
            entity_kinds.extend([source, target]);
        }
        let mut loaded: HashSet<EntityKind> = HashSet::new();
        for kind in entity_kinds {
            if !loaded.insert(kind) {
                continue;
            }
            for entity in self.store.list_entities(kind).await? {
                graph.add_node(Node::from(&entity));
                resolver.remember(entity);
            }
        }

        if request.kinds.contains(&EdgeKind::Hierarchy) {
            let children: Vec<(EntityRef, EntityRef)> = graph
                .nodes()
                .iter()
                .filter_map(|n| n.parent.clone().map(|p| (p, n.key.clone())))
                .collect();
            for (parent, child) in children {
                if graph.contains(&parent) {
                    graph.add_edge(Edge::hierarchy(&parent, &child));
                } else {
                    graph.mark_unresolved(parent);
                }
            }
        }

        for relation_kind in relation_kinds {
            for row in self
                .store
                .list_relations(relation_kind, &RelationFilter::any())
                .await?
            {
                let missing: Vec<EntityRef> = [&row.source, &row.target]
                    .into_iter()
                    .filter(|end| !graph.contains(end))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    graph.add_edge(Edge::from_relation(&row, &request.undirected));
                } else {
                    for end in missing {
                        warn!(relation = %row.id, missing = %end, "Dangling relation");
                        graph.mark_unresolved(end);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Entity lookups memoized for one build
struct Resolver<'a> {
    store: &'a dyn EntityStore,
    cache: HashMap<EntityRef, Option<Entity>>,
}

impl<'a> Resolver<'a> {
    fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    fn remember(&mut self, entity: Entity) {
        self.cache.insert(entity.key(), Some(entity));
    }

    async fn resolve(&mut self, key: &EntityRef) -> Result<Option<Entity>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let entity = self.store.get_entity(key).await?;
        self.cache.insert(key.clone(), entity.clone());
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Status;
    use store::InMemoryStore;

    fn catalog() -> Arc<dyn EntityStore> {
        let store = InMemoryStore::new();
        for entity in [
            Entity::new(EntityKind::Domain, "flight", "Flight Operations"),
            Entity::new(EntityKind::Domain, "ground", "Ground Operations"),
            Entity::new(EntityKind::Subdomain, "crew", "Crew").with_parent("flight"),
            Entity::new(EntityKind::Subdomain, "dispatch", "Dispatch").with_parent("flight"),
            Entity::new(EntityKind::Subdomain, "ramp", "Ramp").with_parent("ground"),
            Entity::new(EntityKind::Mcp, "roster", "Rostering")
                .with_parent("crew")
                .with_status(Status::Built),
            Entity::new(EntityKind::Mcp, "turn", "Turnaround")
                .with_parent("ramp")
                .with_status(Status::InProgress),
        ] {
            store.insert_entity(entity).unwrap();
        }
        for relation in [
            Relation::bridge("b1", "crew", "dispatch"),
            Relation::bridge("b2", "dispatch", "ramp"),
            Relation::mcp_dependency("d1", "turn", "roster"),
            Relation::workflow_mcp("w1", "missing-workflow", "roster"),
        ] {
            store.insert_relation(relation).unwrap();
        }
        Arc::new(store)
    }

    // ============== Neighborhood ==============

    #[tokio::test]
    async fn test_missing_seed_is_not_found() {
        let builder = GraphBuilder::new(catalog());
        let request =
            SubgraphRequest::neighborhood(EntityRef::mcp("nope"), vec![EdgeKind::McpDependency], 1);
        let err = builder.build(&request).await.unwrap_err();
        assert!(matches!(err, CatalogError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_neighborhood_depth_one() {
        let builder = GraphBuilder::new(catalog());
        let request =
            SubgraphRequest::neighborhood(EntityRef::subdomain("crew"), vec![EdgeKind::Bridge], 1);
        let graph = builder.build(&request).await.unwrap();

        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains(&EntityRef::subdomain("dispatch")));
        assert!(!graph.contains(&EntityRef::subdomain("ramp")));
    }

    #[tokio::test]
    async fn test_neighborhood_depth_two_follows_frontier() {
        let builder = GraphBuilder::new(catalog());
        let request =
            SubgraphRequest::neighborhood(EntityRef::subdomain("crew"), vec![EdgeKind::Bridge], 2);
        let graph = builder.build(&request).await.unwrap();

        assert!(graph.contains(&EntityRef::subdomain("ramp")));
        assert_eq!(graph.edge_count(), 2);
    }

    #[tokio::test]
    async fn test_hierarchy_includes_children_and_parent() {
        let builder = GraphBuilder::new(catalog());
        let request =
            SubgraphRequest::neighborhood(EntityRef::subdomain("crew"), vec![EdgeKind::Hierarchy], 1);
        let graph = builder.build(&request).await.unwrap();

        assert!(graph.contains(&EntityRef::mcp("roster")));
        assert!(graph.contains(&EntityRef::domain("flight")));
        assert!(graph.edges().iter().all(|e| e.kind == EdgeKind::Hierarchy && e.directed));
    }

    #[tokio::test]
    async fn test_dangling_relation_is_unresolved() {
        let builder = GraphBuilder::new(catalog());
        let request = SubgraphRequest::neighborhood(
            EntityRef::mcp("roster"),
            vec![EdgeKind::WorkflowLink],
            1,
        );
        let graph = builder.build(&request).await.unwrap();

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.unresolved(), &[EntityRef::workflow("missing-workflow")]);
    }

    // ============== Adjacency ==============

    #[tokio::test]
    async fn test_undirected_kinds_get_reverse_adjacency() {
        let builder = GraphBuilder::new(catalog());
        let request = SubgraphRequest::universe(vec![EdgeKind::Bridge])
            .with_undirected(vec![EdgeKind::Bridge]);
        let graph = builder.build(&request).await.unwrap();

        let from_dispatch: Vec<_> = graph
            .neighbors(&EntityRef::subdomain("dispatch"))
            .iter()
            .map(|a| a.neighbor.id.as_str())
            .collect();
        assert_eq!(from_dispatch, vec!["crew", "ramp"]);
    }

    #[tokio::test]
    async fn test_directed_kinds_only_forward() {
        let builder = GraphBuilder::new(catalog());
        let request = SubgraphRequest::universe(vec![EdgeKind::McpDependency]);
        let graph = builder.build(&request).await.unwrap();

        assert_eq!(graph.neighbors(&EntityRef::mcp("turn")).len(), 1);
        assert!(graph.neighbors(&EntityRef::mcp("roster")).is_empty());
    }

    #[test]
    fn test_sort_adjacency_by_edge_id() {
        let mut graph = Subgraph::new();
        let a = EntityRef::subdomain("a");
        graph.add_edge(Edge::from_relation(&Relation::bridge("z", "a", "c"), &[]));
        graph.add_edge(Edge::from_relation(&Relation::bridge("m", "a", "b"), &[]));
        graph.sort_adjacency();

        let order: Vec<_> = graph.neighbors(&a).iter().map(|n| n.neighbor.id.clone()).collect();
        assert_eq!(order, vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut graph = Subgraph::new();
        let bridge = Relation::bridge("b1", "a", "b");
        assert!(graph.add_edge(Edge::from_relation(&bridge, &[])));
        assert!(!graph.add_edge(Edge::from_relation(&bridge, &[])));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_bidirectional_collaboration_is_undirected() {
        let collab = Relation::agent_collaboration("c1", "a1", "a2").bidirectional();
        let edge = Edge::from_relation(&collab, &[]);
        assert!(!edge.directed);
    }

    #[tokio::test]
    async fn test_universe_seed_must_exist() {
        let builder = GraphBuilder::new(catalog());
        let request =
            SubgraphRequest::universe(vec![EdgeKind::Bridge]).with_seed(EntityRef::subdomain("x"));
        assert!(builder.build(&request).await.is_err());
    }
}
