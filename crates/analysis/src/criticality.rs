//! MCP criticality ranking
//!
//! `score = incoming * incomingWeight + outgoing * outgoingWeight`, where an
//! incoming dependency is another MCP relying on this one. Counts come from
//! one pass over the dependency edges. Scores saturate at `u32::MAX`.

use crate::subgraph::{Edge, Node, Subgraph};
use serde::{Deserialize, Serialize};
use shared::{CriticalityWeights, EdgeKind, EntityKind, EntityRef};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalityScore {
    pub mcp: Node,
    /// MCPs that depend on this one
    pub incoming: u32,
    /// MCPs this one depends on
    pub outgoing: u32,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CriticalityScorer {
    weights: CriticalityWeights,
}

impl CriticalityScorer {
    pub fn new(weights: CriticalityWeights) -> Self {
        Self { weights }
    }

    /// Rank `mcps` by score, highest first. Equal scores keep input order.
    pub fn score(&self, mcps: &[Node], dependencies: &[Edge]) -> Vec<CriticalityScore> {
        let mut counts: HashMap<&EntityRef, (u32, u32)> = HashMap::new();
        for edge in dependencies.iter().filter(|e| e.kind == EdgeKind::McpDependency) {
            counts.entry(&edge.target).or_default().0 += 1;
            counts.entry(&edge.source).or_default().1 += 1;
        }

        let mut ranked: Vec<CriticalityScore> = mcps
            .iter()
            .map(|mcp| {
                let (incoming, outgoing) = counts.get(&mcp.key).copied().unwrap_or_default();
                CriticalityScore {
                    mcp: mcp.clone(),
                    incoming,
                    outgoing,
                    score: incoming
                        .saturating_mul(self.weights.incoming_weight)
                        .saturating_add(outgoing.saturating_mul(self.weights.outgoing_weight)),
                }
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Rank every MCP node of a dependency subgraph
    pub fn score_subgraph(&self, graph: &Subgraph) -> Vec<CriticalityScore> {
        let mcps: Vec<Node> = graph
            .nodes()
            .iter()
            .filter(|n| n.key.kind == EntityKind::Mcp)
            .cloned()
            .collect();
        self.score(&mcps, graph.edges())
    }
}
