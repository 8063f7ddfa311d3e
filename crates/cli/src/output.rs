//! Human-readable terminal output

use console::style;
use engine::{
    BlockType, CheckResult, CriticalityScore, Explanation, ExplanationSource, ImpactAnalysis,
    Path, ProceedOutcome, RiskLevel,
};
use shared::EntityRef;

fn outcome_label(block_type: BlockType) -> String {
    match block_type {
        BlockType::None => style("ALLOWED").green().bold().to_string(),
        BlockType::Soft => style("SOFT BLOCK").yellow().bold().to_string(),
        BlockType::Hard => style("HARD BLOCK").red().bold().to_string(),
    }
}

pub fn print_check(result: &CheckResult, explanation: &Explanation) {
    println!(
        "{} {} {}",
        outcome_label(result.block_type),
        result.action,
        style(&result.entity.key).cyan()
    );
    println!();
    println!("{}", explanation.text.trim_end());
    println!();

    let source = match explanation.source {
        ExplanationSource::Generated => "generated",
        ExplanationSource::Fallback => "fallback",
    };
    println!(
        "{}",
        style(format!(
            "evidence: {} node(s), {} edge(s); explanation: {}",
            result.dependency_graph.nodes.len(),
            result.dependency_graph.edges.len(),
            source
        ))
        .dim()
    );
}

pub fn print_proceed(outcome: &ProceedOutcome, saved: bool) {
    let check = &outcome.check;
    if outcome.success {
        println!(
            "{} {} {}",
            style("✓").green(),
            check.action,
            style(&check.entity.key).cyan()
        );
        for block in &check.soft_blocks {
            println!("  overridden [{}] {}", block.rule_id, block.warning);
        }
        if !saved {
            println!(
                "{}",
                style("catalog file unchanged (use --save to write it back)").dim()
            );
        }
    } else {
        println!(
            "{} {} {}",
            style("✗").red(),
            check.action,
            style(&check.entity.key).cyan()
        );
        for block in &check.hard_blocks {
            println!("  [{}] {}", block.rule_id, block.message);
        }
    }
    if let Some(id) = outcome.audit_entry_id {
        println!("{}", style(format!("audit entry: {}", id)).dim());
    }
}

pub fn print_impact(impact: &ImpactAnalysis) {
    let risk = match impact.risk_level {
        RiskLevel::Low => style(impact.risk_level.to_string()).green(),
        RiskLevel::Medium => style(impact.risk_level.to_string()).yellow(),
        RiskLevel::High => style(impact.risk_level.to_string()).red(),
    };
    println!(
        "Impact of subdomain '{}': {} other domain(s), risk {}",
        impact.subdomain.name, impact.total_impact, risk
    );
    println!(
        "  {} bridge(s), {} MCP dependenc(ies)",
        impact.bridges.len(),
        impact.mcp_dependencies.len()
    );

    if !impact.affected_domains.is_empty() {
        println!();
        println!("  {:<32} {:>6}", style("DOMAIN").bold(), style("EDGES").bold());
        for domain in &impact.affected_domains {
            println!("  {:<32} {:>6}", domain.name, domain.bridge_count);
        }
    }
}

pub fn print_path(from: &EntityRef, to: &EntityRef, path: Option<&Path>) {
    let Some(path) = path else {
        println!("No path from {} to {}", style(from).cyan(), style(to).cyan());
        return;
    };

    println!(
        "Path from {} to {}: {} hop(s), weight {}",
        style(from).cyan(),
        style(to).cyan(),
        path.distance,
        path.total_weight
    );
    for (i, node) in path.nodes.iter().enumerate() {
        println!("  {} {}", style(&node.key).cyan(), node.name);
        if let Some(edge) = path.edges.get(i) {
            println!("    {} {}", style("↓").dim(), style(edge.kind).dim());
        }
    }
}

pub fn print_ranking(ranked: &[CriticalityScore]) {
    if ranked.is_empty() {
        println!("No MCPs in catalog");
        return;
    }
    println!(
        "  {:<4} {:<32} {:>5} {:>4} {:>4}",
        style("#").bold(),
        style("MCP").bold(),
        style("SCORE").bold(),
        style("IN").bold(),
        style("OUT").bold()
    );
    for (i, score) in ranked.iter().enumerate() {
        println!(
            "  {:<4} {:<32} {:>5} {:>4} {:>4}",
            i + 1,
            score.mcp.name,
            score.score,
            score.incoming,
            score.outgoing
        );
    }
}
