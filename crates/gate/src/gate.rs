//! Dependency gate
//!
//! Decides whether a proposed mutation may go ahead. Input is validated
//! first, then the target's neighborhood is read fresh from the store and
//! handed to the pure rule set.

use crate::result::CheckResult;
use crate::rules::{self, RuleContext};
use analysis::{Edge, GraphBuilder, Node, Subgraph, SubgraphRequest};
use shared::{
    Action, CatalogError, EdgeKind, EntityKind, EntityRef, GateConfig, ProposedChanges,
    RelationKind, Result,
};
use std::sync::Arc;
use store::{EntityStore, RelationFilter};
use tracing::{debug, info};

pub struct DependencyGate {
    store: Arc<dyn EntityStore>,
    builder: GraphBuilder,
    config: GateConfig,
}

impl DependencyGate {
    pub fn new(store: Arc<dyn EntityStore>, config: GateConfig) -> Self {
        Self {
            builder: GraphBuilder::new(store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Classify `action` on `target` as allowed, soft-blocked or hard-blocked
    ///
    /// Fails with `Validation` for malformed actions, `EntityNotFound` when
    /// the target is missing, and `UpstreamUnavailable` when the store cannot
    /// be read. A block is a normal result, not an error.
    pub async fn check_action(&self, target: &EntityRef, action: &Action) -> Result<CheckResult> {
        validate_action(target.kind, action)?;

        let entity = self
            .store
            .get_entity(target)
            .await?
            .ok_or_else(|| CatalogError::not_found(target))?;

        let missing_parent = match action {
            Action::Edit {
                changes:
                    ProposedChanges {
                        parent_id: Some(parent_id),
                        ..
                    },
            } => self.find_missing_parent(target.kind, parent_id).await?,
            _ => None,
        };

        let request = SubgraphRequest::neighborhood(
            target.clone(),
            EdgeKind::ALL.to_vec(),
            self.config.neighborhood_depth.max(1),
        )
        .with_undirected(vec![EdgeKind::Bridge]);
        let mut graph = self.builder.build(&request).await?;
        if matches!(action, Action::Delete) && target.kind.child_kind().is_some() {
            self.collect_cascade(target, &mut graph).await?;
        }

        let blocks = rules::evaluate(&RuleContext {
            entity: &entity,
            action,
            graph: &graph,
            config: &self.config,
            missing_parent: missing_parent.as_ref(),
        });
        let result = CheckResult::from_blocks(Node::from(&entity), action.kind(), blocks, &graph);

        debug!(
            entity = %target,
            nodes = result.dependency_graph.nodes.len(),
            edges = result.dependency_graph.edges.len(),
            "Evaluated neighborhood"
        );
        info!(
            entity = %target,
            action = %action.kind(),
            block_type = %result.block_type,
            hard = result.hard_blocks.len(),
            soft = result.soft_blocks.len(),
            "Dependency check"
        );
        Ok(result)
    }

    /// Add every descendant a delete would cascade to, with the agents,
    /// workflows and MCPs consuming descendant MCPs
    async fn collect_cascade(&self, root: &EntityRef, graph: &mut Subgraph) -> Result<()> {
        let mut stack = vec![root.clone()];
        while let Some(parent) = stack.pop() {
            for child in self.store.list_children(&parent).await? {
                let key = child.key();
                graph.add_node(Node::from(&child));
                graph.add_edge(Edge::hierarchy(&parent, &key));
                if key.kind == EntityKind::Mcp {
                    self.collect_consumers(&key, graph).await?;
                }
                stack.push(key);
            }
        }
        Ok(())
    }

    async fn collect_consumers(&self, mcp: &EntityRef, graph: &mut Subgraph) -> Result<()> {
        let filter = RelationFilter::to_target(mcp.clone());
        for kind in [
            RelationKind::AgentMcp,
            RelationKind::WorkflowMcp,
            RelationKind::McpDependency,
        ] {
            for relation in self.store.list_relations(kind, &filter).await? {
                if !graph.contains(&relation.source) {
                    match self.store.get_entity(&relation.source).await? {
                        Some(entity) => {
                            graph.add_node(Node::from(&entity));
                        }
                        None => {
                            graph.mark_unresolved(relation.source.clone());
                            continue;
                        }
                    }
                }
                graph.add_edge(Edge::from_relation(&relation, &[EdgeKind::Bridge]));
            }
        }
        Ok(())
    }

    async fn find_missing_parent(
        &self,
        kind: EntityKind,
        parent_id: &str,
    ) -> Result<Option<EntityRef>> {
        let Some(parent_kind) = kind.parent_kind() else {
            return Ok(None);
        };
        let parent = EntityRef::new(parent_kind, parent_id);
        Ok(match self.store.get_entity(&parent).await? {
            Some(_) => None,
            None => Some(parent),
        })
    }
}

/// Reject actions that are malformed regardless of store state
pub fn validate_action(kind: EntityKind, action: &Action) -> Result<()> {
    match action {
        Action::Delete => Ok(()),
        Action::StatusChange { new_status } => Ok(kind.validate_status(*new_status)?),
        Action::Edit { changes } => {
            if changes.is_empty() {
                return Err(CatalogError::validation(
                    "changes",
                    "an edit must change at least one field",
                ));
            }
            if let Some(name) = &changes.name {
                if name.trim().is_empty() {
                    return Err(CatalogError::validation("name", "must not be empty"));
                }
            }
            if let Some(status) = changes.status {
                kind.validate_status(status)?;
            }
            if let Some(parent_id) = &changes.parent_id {
                if kind.parent_kind().is_none() {
                    return Err(CatalogError::validation(
                        "parentId",
                        format!("{} entities have no structural parent", kind),
                    ));
                }
                if parent_id.trim().is_empty() {
                    return Err(CatalogError::validation("parentId", "must not be empty"));
                }
            }
            Ok(())
        }
    }
}
