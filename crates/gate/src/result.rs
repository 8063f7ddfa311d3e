//! Gate decision model
//!
//! A [`CheckResult`] is derived from its blocks and never assembled by hand:
//! any hard block makes the result `hard` and not allowed, soft blocks alone
//! make it `soft`, and no blocks make it `none` and allowed.

use analysis::{Edge, Node, Subgraph};
use serde::{Deserialize, Serialize};
use shared::{ActionKind, EntityRef};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a gate rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    // hard
    ActiveAgentConsumers,
    LiveWorkflowConsumers,
    CriticalDependents,
    LiveChildren,
    CriticalBridges,
    StatusDowngradeLiveConsumers,
    MissingParent,
    // soft
    InactiveConsumers,
    Dependents,
    CascadeChildren,
    AdvisoryBridges,
    AgentCollaborations,
    BuiltCapabilityRemoved,
    LiveWorkflowRetired,
    StatusDowngrade,
    ContractChange,
    Reparent,
    UnresolvedReference,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::ActiveAgentConsumers => "active_agent_consumers",
            RuleId::LiveWorkflowConsumers => "live_workflow_consumers",
            RuleId::CriticalDependents => "critical_dependents",
            RuleId::LiveChildren => "live_children",
            RuleId::CriticalBridges => "critical_bridges",
            RuleId::StatusDowngradeLiveConsumers => "status_downgrade_live_consumers",
            RuleId::MissingParent => "missing_parent",
            RuleId::InactiveConsumers => "inactive_consumers",
            RuleId::Dependents => "dependents",
            RuleId::CascadeChildren => "cascade_children",
            RuleId::AdvisoryBridges => "advisory_bridges",
            RuleId::AgentCollaborations => "agent_collaborations",
            RuleId::BuiltCapabilityRemoved => "built_capability_removed",
            RuleId::LiveWorkflowRetired => "live_workflow_retired",
            RuleId::StatusDowngrade => "status_downgrade",
            RuleId::ContractChange => "contract_change",
            RuleId::Reparent => "reparent",
            RuleId::UnresolvedReference => "unresolved_reference",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violation that forbids the mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardBlock {
    pub rule_id: RuleId,
    pub reason: String,
    pub message: String,
    pub affected_entities: Vec<EntityRef>,
}

/// A violation that may be overridden with a recorded justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftBlock {
    pub rule_id: RuleId,
    pub warning: String,
    pub impact: String,
    pub affected_entities: Vec<EntityRef>,
    pub requires_reason: bool,
}

impl SoftBlock {
    pub fn new(
        rule_id: RuleId,
        warning: impl Into<String>,
        impact: impl Into<String>,
        affected_entities: Vec<EntityRef>,
    ) -> Self {
        Self {
            rule_id,
            warning: warning.into(),
            impact: impact.into(),
            affected_entities,
            requires_reason: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    None,
    Soft,
    Hard,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::None => "none",
            BlockType::Soft => "soft",
            BlockType::Hard => "hard",
        };
        f.write_str(name)
    }
}

/// Blocks raised by the rule set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocks {
    pub hard: Vec<HardBlock>,
    pub soft: Vec<SoftBlock>,
}

impl Blocks {
    pub fn block_type(&self) -> BlockType {
        if !self.hard.is_empty() {
            BlockType::Hard
        } else if !self.soft.is_empty() {
            BlockType::Soft
        } else {
            BlockType::None
        }
    }

    fn affected(&self) -> impl Iterator<Item = &EntityRef> {
        self.hard
            .iter()
            .flat_map(|b| b.affected_entities.iter())
            .chain(self.soft.iter().flat_map(|b| b.affected_entities.iter()))
    }
}

/// Evidence attached to a decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn contains(&self, key: &EntityRef) -> bool {
        self.nodes.iter().any(|n| &n.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub entity: Node,
    pub action: ActionKind,
    pub allowed: bool,
    pub block_type: BlockType,
    pub hard_blocks: Vec<HardBlock>,
    pub soft_blocks: Vec<SoftBlock>,
    pub dependency_graph: DependencyGraph,
}

impl CheckResult {
    /// Derive the result from its blocks
    ///
    /// The evidence graph is the subgraph the rules ran on, plus a placeholder
    /// node for every affected entity it does not contain (for example rows a
    /// dangling relation points at).
    pub fn from_blocks(entity: Node, action: ActionKind, blocks: Blocks, graph: &Subgraph) -> Self {
        let mut nodes: Vec<Node> = graph.nodes().to_vec();
        let mut known: HashSet<EntityRef> = nodes.iter().map(|n| n.key.clone()).collect();
        if known.insert(entity.key.clone()) {
            nodes.insert(0, entity.clone());
        }
        for key in blocks.affected() {
            if known.insert(key.clone()) {
                nodes.push(Node {
                    key: key.clone(),
                    name: key.id.clone(),
                    status: None,
                    parent: None,
                });
            }
        }

        let block_type = blocks.block_type();
        Self {
            entity,
            action,
            allowed: block_type == BlockType::None,
            block_type,
            hard_blocks: blocks.hard,
            soft_blocks: blocks.soft,
            dependency_graph: DependencyGraph {
                nodes,
                edges: graph.edges().to_vec(),
            },
        }
    }

    pub fn is_hard_blocked(&self) -> bool {
        self.block_type == BlockType::Hard
    }

    pub fn is_soft_blocked(&self) -> bool {
        self.block_type == BlockType::Soft
    }

    /// Rule ids of every block, hard first
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.hard_blocks
            .iter()
            .map(|b| b.rule_id)
            .chain(self.soft_blocks.iter().map(|b| b.rule_id))
            .collect()
    }

    /// Every affected entity, deduplicated, in block order
    pub fn affected_entities(&self) -> Vec<EntityRef> {
        let mut seen = HashSet::new();
        self.hard_blocks
            .iter()
            .flat_map(|b| b.affected_entities.iter())
            .chain(self.soft_blocks.iter().flat_map(|b| b.affected_entities.iter()))
            .filter(|key| seen.insert((*key).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(key: EntityRef) -> Node {
        Node {
            name: key.id.clone(),
            key,
            status: None,
            parent: None,
        }
    }

    fn hard(rule_id: RuleId, affected: Vec<EntityRef>) -> HardBlock {
        HardBlock {
            rule_id,
            reason: "in use".to_string(),
            message: "in use".to_string(),
            affected_entities: affected,
        }
    }

    #[test]
    fn test_no_blocks_is_allowed() {
        let result = CheckResult::from_blocks(
            node(EntityRef::mcp("m1")),
            ActionKind::Delete,
            Blocks::default(),
            &Subgraph::new(),
        );
        assert!(result.allowed);
        assert_eq!(result.block_type, BlockType::None);
        assert!(result.dependency_graph.contains(&EntityRef::mcp("m1")));
    }

    #[test]
    fn test_soft_only_requires_reason() {
        let blocks = Blocks {
            hard: vec![],
            soft: vec![SoftBlock::new(RuleId::Dependents, "w", "i", vec![])],
        };
        let result = CheckResult::from_blocks(
            node(EntityRef::mcp("m1")),
            ActionKind::Delete,
            blocks,
            &Subgraph::new(),
        );
        assert!(!result.allowed);
        assert!(result.is_soft_blocked());
        assert!(result.soft_blocks[0].requires_reason);
    }

    #[test]
    fn test_affected_entities_get_placeholder_nodes() {
        let blocks = Blocks {
            hard: vec![hard(RuleId::ActiveAgentConsumers, vec![EntityRef::agent("a1")])],
            soft: vec![SoftBlock::new(
                RuleId::UnresolvedReference,
                "w",
                "i",
                vec![EntityRef::workflow("gone")],
            )],
        };
        let result = CheckResult::from_blocks(
            node(EntityRef::mcp("m1")),
            ActionKind::Delete,
            blocks,
            &Subgraph::new(),
        );
        assert!(result.dependency_graph.contains(&EntityRef::agent("a1")));
        assert!(result.dependency_graph.contains(&EntityRef::workflow("gone")));
        assert_eq!(
            result.rule_ids(),
            vec![RuleId::ActiveAgentConsumers, RuleId::UnresolvedReference]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let result = CheckResult::from_blocks(
            node(EntityRef::mcp("m1")),
            ActionKind::StatusChange,
            Blocks {
                hard: vec![hard(RuleId::StatusDowngradeLiveConsumers, vec![])],
                soft: vec![],
            },
            &Subgraph::new(),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["blockType"], "hard");
        assert_eq!(json["action"], "status_change");
        assert_eq!(json["hardBlocks"][0]["ruleId"], "status_downgrade_live_consumers");
        assert!(json["dependencyGraph"]["nodes"].is_array());
    }

    proptest! {
        #[test]
        fn prop_hard_dominates_soft(hard_count in 0usize..4, soft_count in 0usize..4) {
            let blocks = Blocks {
                hard: (0..hard_count).map(|_| hard(RuleId::LiveChildren, vec![])).collect(),
                soft: (0..soft_count)
                    .map(|_| SoftBlock::new(RuleId::AdvisoryBridges, "w", "i", vec![]))
                    .collect(),
            };
            let result = CheckResult::from_blocks(
                node(EntityRef::subdomain("s")),
                ActionKind::Delete,
                blocks,
                &Subgraph::new(),
            );

            if hard_count > 0 {
                prop_assert!(!result.allowed);
                prop_assert_eq!(result.block_type, BlockType::Hard);
            } else if soft_count > 0 {
                prop_assert!(!result.allowed);
                prop_assert_eq!(result.block_type, BlockType::Soft);
            } else {
                prop_assert!(result.allowed);
                prop_assert_eq!(result.block_type, BlockType::None);
            }
        }
    }
}
