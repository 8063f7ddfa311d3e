//! The ordered rule set
//!
//! Rules are pure: they read the target entity, the proposed action and the
//! neighborhood subgraph, and never touch the store. Every applicable rule
//! runs; nothing short-circuits, so a hard block reports all of its causes.
//!
//! Consumers of an entity are the sources of edges pointing at it:
//! agents through `agent_mcp`, workflows through `workflow_link`, and
//! dependent MCPs through `mcp_dependency`.

use crate::result::{Blocks, HardBlock, RuleId, SoftBlock};
use analysis::{Edge, Node, Subgraph};
use shared::{
    Action, EdgeKind, Entity, EntityKind, EntityRef, GateConfig, ProposedChanges, Status,
};
use std::collections::{HashSet, VecDeque};

/// Everything a rule may look at
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub entity: &'a Entity,
    pub action: &'a Action,
    pub graph: &'a Subgraph,
    pub config: &'a GateConfig,
    /// Proposed parent of an edit, when it does not exist
    pub missing_parent: Option<&'a EntityRef>,
}

/// Run every rule that applies to the action
pub fn evaluate(ctx: &RuleContext<'_>) -> Blocks {
    let seed = ctx.entity.key();
    let view = Neighborhood {
        graph: ctx.graph,
        seed: &seed,
    };
    let mut blocks = Blocks::default();

    match ctx.action {
        Action::Delete => delete_rules(ctx, &view, &mut blocks),
        Action::StatusChange { new_status } => {
            status_rules(ctx, &view, *new_status, &mut blocks)
        }
        Action::Edit { changes } => edit_rules(ctx, &view, changes, &mut blocks),
    }

    unresolved_rule(ctx, &mut blocks);
    blocks
}

// ============== Delete ==============

fn delete_rules(ctx: &RuleContext<'_>, view: &Neighborhood<'_>, blocks: &mut Blocks) {
    let target = describe_entity(ctx.entity);

    let (live_agents, idle_agents) = split_live(view.consumers(EdgeKind::AgentMcp));
    if !live_agents.is_empty() {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::ActiveAgentConsumers,
            reason: "Active agents rely on this MCP".to_string(),
            message: format!(
                "Cannot delete {}: {} active agent(s) use it: {}",
                target,
                live_agents.len(),
                describe_links(&live_agents)
            ),
            affected_entities: keys(&live_agents),
        });
    }

    let (live_workflows, idle_workflows) = split_live(view.consumers(EdgeKind::WorkflowLink));
    if !live_workflows.is_empty() {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::LiveWorkflowConsumers,
            reason: "Live workflows rely on this entity".to_string(),
            message: format!(
                "Cannot delete {}: {} in-progress or active workflow(s) include it: {}",
                target,
                live_workflows.len(),
                describe_links(&live_workflows)
            ),
            affected_entities: keys(&live_workflows),
        });
    }

    let (critical, advisory): (Vec<Link<'_>>, Vec<Link<'_>>) = view
        .consumers(EdgeKind::McpDependency)
        .into_iter()
        .partition(|link| link.edge.critical && link.node.is_live());
    if !critical.is_empty() {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::CriticalDependents,
            reason: "Live MCPs have a critical dependency on this MCP".to_string(),
            message: format!(
                "Cannot delete {}: {} MCP(s) critically depend on it: {}",
                target,
                critical.len(),
                describe_links(&critical)
            ),
            affected_entities: keys(&critical),
        });
    }

    match ctx.entity.kind {
        EntityKind::Domain => {
            let subdomains = view.children();
            if !subdomains.is_empty() {
                blocks.hard.push(HardBlock {
                    rule_id: RuleId::LiveChildren,
                    reason: "Domain still has subdomains".to_string(),
                    message: format!(
                        "Cannot delete {}: it still owns {} subdomain(s): {}",
                        target,
                        subdomains.len(),
                        describe_nodes(&subdomains)
                    ),
                    affected_entities: node_keys(&subdomains),
                });
            }
            cascade_consumer_rules(&target, view, blocks);
        }
        EntityKind::Subdomain => {
            cascade_consumer_rules(&target, view, blocks);
            subdomain_delete_rules(&target, view, blocks);
        }
        _ => {}
    }

    let idle: Vec<Link<'_>> = idle_agents.into_iter().chain(idle_workflows).collect();
    if !idle.is_empty() {
        blocks.soft.push(SoftBlock::new(
            RuleId::InactiveConsumers,
            format!(
                "{} is referenced by {} planned or inactive consumer(s): {}",
                target,
                idle.len(),
                describe_links(&idle)
            ),
            "Their links will be removed; they will need another provider before going live",
            keys(&idle),
        ));
    }

    if !advisory.is_empty() {
        blocks.soft.push(SoftBlock::new(
            RuleId::Dependents,
            format!(
                "{} MCP(s) depend on {}: {}",
                advisory.len(),
                target,
                describe_links(&advisory)
            ),
            "Dependencies on this MCP will be removed",
            keys(&advisory),
        ));
    }

    match ctx.entity.kind {
        EntityKind::Mcp => {
            let tools = view.children();
            if !tools.is_empty() {
                blocks.soft.push(SoftBlock::new(
                    RuleId::CascadeChildren,
                    format!("{} tool(s) will be deleted with {}", tools.len(), target),
                    describe_nodes(&tools),
                    node_keys(&tools),
                ));
            }
        }
        EntityKind::Tool => {
            let parent_built = view
                .parent()
                .is_some_and(|mcp| mcp.status == Some(Status::Built));
            if ctx.entity.status == Some(Status::Built) && parent_built {
                let parent: Vec<&Node> = view.parent().into_iter().collect();
                blocks.soft.push(SoftBlock::new(
                    RuleId::BuiltCapabilityRemoved,
                    format!("{} is a built tool of a built MCP", target),
                    format!(
                        "{} loses a capability its consumers may already call",
                        describe_nodes(&parent)
                    ),
                    node_keys(&parent),
                ));
            }
        }
        EntityKind::Agent => collaboration_rule(&target, view, blocks),
        EntityKind::Workflow if ctx.entity.is_live() => {
            blocks.soft.push(SoftBlock::new(
                RuleId::LiveWorkflowRetired,
                format!("{} is {}", target, status_name(ctx.entity.status)),
                "Running executions of this workflow lose their definition",
                vec![ctx.entity.key()],
            ));
        }
        _ => {}
    }
}

/// Consumers of MCPs that a structural delete removes along with the target
///
/// The cascade takes every descendant with it, so a descendant MCP's live
/// consumers block the delete exactly as they would block deleting that MCP.
/// Consumers that are removed by the same cascade do not count.
fn cascade_consumer_rules(target: &str, view: &Neighborhood<'_>, blocks: &mut Blocks) {
    let descendants = view.descendants();
    let removed: HashSet<&EntityRef> = descendants
        .iter()
        .map(|n| &n.key)
        .chain(std::iter::once(view.seed))
        .collect();

    let mut agents: Vec<Cascaded<'_>> = Vec::new();
    let mut workflows: Vec<Cascaded<'_>> = Vec::new();
    let mut critical: Vec<Cascaded<'_>> = Vec::new();
    for &mcp in descendants.iter().filter(|n| n.key.kind == EntityKind::Mcp) {
        let local = Neighborhood {
            graph: view.graph,
            seed: &mcp.key,
        };
        let outside = |link: &Link<'_>| link.node.is_live() && !removed.contains(&link.node.key);
        for link in local.consumers(EdgeKind::AgentMcp).into_iter().filter(outside) {
            agents.push(Cascaded { mcp, link });
        }
        for link in local.consumers(EdgeKind::WorkflowLink).into_iter().filter(outside) {
            workflows.push(Cascaded { mcp, link });
        }
        for link in local
            .consumers(EdgeKind::McpDependency)
            .into_iter()
            .filter(|link| link.edge.critical && outside(link))
        {
            critical.push(Cascaded { mcp, link });
        }
    }

    let groups = [
        (
            agents,
            RuleId::ActiveAgentConsumers,
            "Active agents rely on MCPs removed by this delete",
            "active agent(s) use MCPs it owns",
        ),
        (
            workflows,
            RuleId::LiveWorkflowConsumers,
            "Live workflows rely on MCPs removed by this delete",
            "in-progress or active workflow(s) include MCPs it owns",
        ),
        (
            critical,
            RuleId::CriticalDependents,
            "Live MCPs critically depend on MCPs removed by this delete",
            "MCP(s) outside it critically depend on MCPs it owns",
        ),
    ];
    for (found, rule_id, reason, what) in groups {
        if found.is_empty() {
            continue;
        }
        let links: Vec<Link<'_>> = found.iter().map(|c| c.link).collect();
        let detail: Vec<String> = found
            .iter()
            .map(|c| format!("{} -> {}", describe_links(&[c.link]), describe_node(c.mcp)))
            .collect();
        blocks.hard.push(HardBlock {
            rule_id,
            reason: reason.to_string(),
            message: format!(
                "Cannot delete {}: {} {}: {}",
                target,
                keys(&links).len(),
                what,
                detail.join(", ")
            ),
            affected_entities: keys(&links),
        });
    }
}

fn subdomain_delete_rules(target: &str, view: &Neighborhood<'_>, blocks: &mut Blocks) {
    let (live_mcps, planned_mcps): (Vec<&Node>, Vec<&Node>) =
        view.children().into_iter().partition(|n| n.is_live());
    if !live_mcps.is_empty() {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::LiveChildren,
            reason: "Subdomain still owns live MCPs".to_string(),
            message: format!(
                "Cannot delete {}: {} MCP(s) are in progress or built: {}",
                target,
                live_mcps.len(),
                describe_nodes(&live_mcps)
            ),
            affected_entities: node_keys(&live_mcps),
        });
    }

    let (critical, advisory): (Vec<Link<'_>>, Vec<Link<'_>>) = view
        .touching(EdgeKind::Bridge)
        .into_iter()
        .partition(|link| link.edge.critical);
    if !critical.is_empty() {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::CriticalBridges,
            reason: "Subdomain is an endpoint of critical bridges".to_string(),
            message: format!(
                "Cannot delete {}: {} critical bridge(s) connect it to: {}",
                target,
                critical.len(),
                describe_links(&critical)
            ),
            affected_entities: keys(&critical),
        });
    }

    if !planned_mcps.is_empty() {
        blocks.soft.push(SoftBlock::new(
            RuleId::CascadeChildren,
            format!(
                "{} planned MCP(s) will be deleted with {}",
                planned_mcps.len(),
                target
            ),
            describe_nodes(&planned_mcps),
            node_keys(&planned_mcps),
        ));
    }

    if !advisory.is_empty() {
        blocks.soft.push(SoftBlock::new(
            RuleId::AdvisoryBridges,
            format!(
                "{} has {} non-critical bridge(s): {}",
                target,
                advisory.len(),
                describe_links(&advisory)
            ),
            "Cross-domain connections through these bridges will be removed",
            keys(&advisory),
        ));
    }
}

fn collaboration_rule(target: &str, view: &Neighborhood<'_>, blocks: &mut Blocks) {
    let collaborators = view.touching(EdgeKind::AgentCollaboration);
    if !collaborators.is_empty() {
        blocks.soft.push(SoftBlock::new(
            RuleId::AgentCollaborations,
            format!(
                "{} collaborates with {} agent(s): {}",
                target,
                collaborators.len(),
                describe_links(&collaborators)
            ),
            "Collaborating agents lose a hand-off partner",
            keys(&collaborators),
        ));
    }
}

// ============== Status change ==============

fn status_rules(
    ctx: &RuleContext<'_>,
    view: &Neighborhood<'_>,
    new_status: Status,
    blocks: &mut Blocks,
) {
    let target = describe_entity(ctx.entity);

    if let Some(current) = ctx.entity.status {
        if current.is_downgrade_to(new_status) {
            let consumers = view.all_consumers();
            let live: Vec<Link<'_>> = consumers
                .iter()
                .filter(|link| link.node.is_live())
                .cloned()
                .collect();

            if current.is_operational() && !live.is_empty() {
                blocks.hard.push(HardBlock {
                    rule_id: RuleId::StatusDowngradeLiveConsumers,
                    reason: format!("Live consumers assume this entity is {}", current),
                    message: format!(
                        "Cannot change {} from {} to {}: {} live consumer(s) rely on it: {}",
                        target,
                        current,
                        new_status,
                        live.len(),
                        describe_links(&live)
                    ),
                    affected_entities: keys(&live),
                });
            } else if !consumers.is_empty() {
                blocks.soft.push(SoftBlock::new(
                    RuleId::StatusDowngrade,
                    format!(
                        "Changing {} from {} to {} affects {} consumer(s): {}",
                        target,
                        current,
                        new_status,
                        consumers.len(),
                        describe_links(&consumers)
                    ),
                    "Consumers will reference a less mature entity",
                    keys(&consumers),
                ));
            }
        }
    }

    let retiring = ctx.entity.is_live() && !new_status.is_live();
    match ctx.entity.kind {
        EntityKind::Agent if retiring => collaboration_rule(&target, view, blocks),
        EntityKind::Workflow if retiring => {
            blocks.soft.push(SoftBlock::new(
                RuleId::LiveWorkflowRetired,
                format!(
                    "{} is {} and would become {}",
                    target,
                    status_name(ctx.entity.status),
                    new_status
                ),
                "Running executions of this workflow stop being supported",
                vec![ctx.entity.key()],
            ));
        }
        _ => {}
    }
}

// ============== Edit ==============

fn edit_rules(
    ctx: &RuleContext<'_>,
    view: &Neighborhood<'_>,
    changes: &ProposedChanges,
    blocks: &mut Blocks,
) {
    let target = describe_entity(ctx.entity);

    if let Some(parent) = ctx.missing_parent {
        blocks.hard.push(HardBlock {
            rule_id: RuleId::MissingParent,
            reason: "Proposed parent does not exist".to_string(),
            message: format!("Cannot move {} under {}: no such entity", target, parent),
            affected_entities: vec![parent.clone()],
        });
    }

    let mut contract_fields: Vec<&str> = Vec::new();
    if changes
        .name
        .as_ref()
        .is_some_and(|name| name != &ctx.entity.name)
    {
        contract_fields.push("name");
    }
    for (key, value) in &changes.attributes {
        if ctx.config.contract_fields.contains(key) && ctx.entity.attributes.get(key) != Some(value)
        {
            contract_fields.push(key.as_str());
        }
    }
    if !contract_fields.is_empty() {
        let mut dependents = view.all_consumers();
        dependents.extend(view.touching(EdgeKind::Bridge));
        dependents.extend(view.touching(EdgeKind::AgentCollaboration));
        if !dependents.is_empty() {
            blocks.soft.push(SoftBlock::new(
                RuleId::ContractChange,
                format!(
                    "Changing {} of {} alters a contract {} dependent(s) rely on",
                    contract_fields.join(", "),
                    target,
                    dependents.len()
                ),
                format!("Review: {}", describe_links(&dependents)),
                keys(&dependents),
            ));
        }
    }

    if let Some(parent_id) = &changes.parent_id {
        if ctx.entity.parent_id.as_ref() != Some(parent_id) {
            let mut links = view.touching(EdgeKind::Bridge);
            links.extend(view.touching(EdgeKind::McpDependency));
            if !links.is_empty() {
                blocks.soft.push(SoftBlock::new(
                    RuleId::Reparent,
                    format!(
                        "Moving {} to '{}' changes the domain its {} link(s) cross into",
                        target,
                        parent_id,
                        links.len()
                    ),
                    format!("Impact analysis of: {}", describe_links(&links)),
                    keys(&links),
                ));
            }
        }
    }

    if let Some(status) = changes.status {
        status_rules(ctx, view, status, blocks);
    }
}

// ============== Unresolved ==============

fn unresolved_rule(ctx: &RuleContext<'_>, blocks: &mut Blocks) {
    let missing = ctx.graph.unresolved();
    if missing.is_empty() {
        return;
    }
    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
    blocks.soft.push(SoftBlock::new(
        RuleId::UnresolvedReference,
        format!(
            "{} relation endpoint(s) near {} no longer exist: {}",
            missing.len(),
            describe_entity(ctx.entity),
            names.join(", ")
        ),
        "Their dependencies cannot be evaluated and are treated as blocking",
        missing.to_vec(),
    ));
}

// ============== Neighborhood view ==============

/// An edge at the seed together with the entity at its other end
#[derive(Debug, Clone, Copy)]
struct Link<'a> {
    edge: &'a Edge,
    node: &'a Node,
}

struct Neighborhood<'a> {
    graph: &'a Subgraph,
    seed: &'a EntityRef,
}

impl<'a> Neighborhood<'a> {
    /// Entities relying on the seed through `kind`
    fn consumers(&self, kind: EdgeKind) -> Vec<Link<'a>> {
        self.graph
            .edges()
            .iter()
            .filter(|e| e.kind == kind && &e.target == self.seed && &e.source != self.seed)
            .filter_map(|edge| {
                self.graph
                    .node(&edge.source)
                    .map(|node| Link { edge, node })
            })
            .collect()
    }

    fn all_consumers(&self) -> Vec<Link<'a>> {
        let mut links = self.consumers(EdgeKind::AgentMcp);
        links.extend(self.consumers(EdgeKind::WorkflowLink));
        links.extend(self.consumers(EdgeKind::McpDependency));
        links
    }

    /// Edges of `kind` at the seed, in either direction
    fn touching(&self, kind: EdgeKind) -> Vec<Link<'a>> {
        self.graph
            .edges()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|edge| {
                let other = edge.other_end(self.seed)?;
                if other == self.seed {
                    return None;
                }
                self.graph.node(other).map(|node| Link { edge, node })
            })
            .collect()
    }

    fn children(&self) -> Vec<&'a Node> {
        self.graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Hierarchy && &e.source == self.seed)
            .filter_map(|e| self.graph.node(&e.target))
            .collect()
    }

    /// Structural descendants of the seed, nearest first
    fn descendants(&self) -> Vec<&'a Node> {
        let mut found: Vec<&'a Node> = Vec::new();
        let mut seen: HashSet<&'a EntityRef> = HashSet::from([self.seed]);
        let mut queue: VecDeque<&'a EntityRef> = VecDeque::from([self.seed]);
        while let Some(parent) = queue.pop_front() {
            for edge in self.graph.edges() {
                if edge.kind != EdgeKind::Hierarchy || &edge.source != parent {
                    continue;
                }
                if let Some(node) = self.graph.node(&edge.target) {
                    if seen.insert(&node.key) {
                        found.push(node);
                        queue.push_back(&node.key);
                    }
                }
            }
        }
        found
    }

    fn parent(&self) -> Option<&'a Node> {
        self.graph
            .edges()
            .iter()
            .find(|e| e.kind == EdgeKind::Hierarchy && &e.target == self.seed)
            .and_then(|e| self.graph.node(&e.source))
    }
}

/// A consumer link found at a descendant MCP of the target
#[derive(Debug, Clone, Copy)]
struct Cascaded<'a> {
    mcp: &'a Node,
    link: Link<'a>,
}

fn split_live(links: Vec<Link<'_>>) -> (Vec<Link<'_>>, Vec<Link<'_>>) {
    links.into_iter().partition(|link| link.node.is_live())
}

fn keys(links: &[Link<'_>]) -> Vec<EntityRef> {
    let mut keys: Vec<EntityRef> = Vec::with_capacity(links.len());
    for link in links {
        if !keys.contains(&link.node.key) {
            keys.push(link.node.key.clone());
        }
    }
    keys
}

fn node_keys(nodes: &[&Node]) -> Vec<EntityRef> {
    nodes.iter().map(|n| n.key.clone()).collect()
}

fn status_name(status: Option<Status>) -> &'static str {
    status.map(|s| s.as_str()).unwrap_or("live")
}

fn describe_entity(entity: &Entity) -> String {
    format!("{} '{}'", entity.kind, entity.name)
}

fn describe_node(node: &Node) -> String {
    match node.status {
        Some(status) => format!("{} '{}' ({})", node.key.kind, node.name, status),
        None => format!("{} '{}'", node.key.kind, node.name),
    }
}

fn describe_nodes(nodes: &[&Node]) -> String {
    nodes
        .iter()
        .map(|n| describe_node(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_links(links: &[Link<'_>]) -> String {
    links
        .iter()
        .map(|link| match &link.edge.label {
            Some(label) => format!("{} [{}]", describe_node(link.node), label),
            None => describe_node(link.node),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
