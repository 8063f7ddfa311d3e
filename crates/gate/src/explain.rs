//! Human-readable explanations of gate decisions
//!
//! An optional external [`Explainer`] may turn a [`CheckResult`] into prose.
//! Whenever it is missing, disabled, slow or failing, the deterministic
//! [`render_fallback`] text is used instead. Explanation never fails the
//! caller and never delays the decision itself.

use crate::result::{BlockType, CheckResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{Action, ExplainConfig};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("explanation service is not configured")]
    NotConfigured,

    #[error("explanation service failed: {0}")]
    Service(String),
}

/// External text-generation collaborator
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        result: &CheckResult,
        entity_name: &str,
        action: &Action,
    ) -> Result<String, ExplainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub text: String,
    pub source: ExplanationSource,
}

pub struct ExplanationService {
    explainer: Option<Arc<dyn Explainer>>,
    config: ExplainConfig,
}

impl ExplanationService {
    /// Service that always renders the fallback text
    pub fn fallback_only() -> Self {
        Self {
            explainer: None,
            config: ExplainConfig::default(),
        }
    }

    pub fn new(explainer: Arc<dyn Explainer>, config: ExplainConfig) -> Self {
        Self {
            explainer: Some(explainer),
            config,
        }
    }

    pub async fn explain(
        &self,
        result: &CheckResult,
        entity_name: &str,
        action: &Action,
    ) -> Explanation {
        let fallback = || Explanation {
            text: render_fallback(result, entity_name, action),
            source: ExplanationSource::Fallback,
        };

        let explainer = match &self.explainer {
            Some(explainer) if self.config.enabled => explainer,
            _ => return fallback(),
        };

        let call = explainer.explain(result, entity_name, action);
        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Explanation {
                text,
                source: ExplanationSource::Generated,
            },
            Ok(Ok(_)) => {
                warn!(entity = entity_name, "Explanation service returned empty text");
                fallback()
            }
            Ok(Err(err)) => {
                warn!(entity = entity_name, error = %err, "Explanation service failed");
                fallback()
            }
            Err(_) => {
                warn!(
                    entity = entity_name,
                    timeout_ms = self.config.timeout_ms,
                    "Explanation service timed out"
                );
                fallback()
            }
        }
    }
}

fn describe_action(action: &Action) -> String {
    match action {
        Action::Delete => "delete".to_string(),
        Action::Edit { changes } => {
            let mut fields: Vec<&str> = Vec::new();
            if changes.name.is_some() {
                fields.push("name");
            }
            if changes.status.is_some() {
                fields.push("status");
            }
            if changes.parent_id.is_some() {
                fields.push("parent");
            }
            if changes.description.is_some() {
                fields.push("description");
            }
            fields.extend(changes.attributes.keys().map(String::as_str));
            format!("edit ({})", fields.join(", "))
        }
        Action::StatusChange { new_status } => format!("change status to {}", new_status),
    }
}

/// Deterministic plain-text rendering of a decision
///
/// Identical inputs always produce identical text.
pub fn render_fallback(result: &CheckResult, entity_name: &str, action: &Action) -> String {
    Fallback {
        result,
        entity_name,
        action,
    }
    .to_string()
}

struct Fallback<'a> {
    result: &'a CheckResult,
    entity_name: &'a str,
    action: &'a Action,
}

impl fmt::Display for Fallback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        let outcome = match result.block_type {
            BlockType::None => "ALLOWED",
            BlockType::Soft => "WARNING (justification required to proceed)",
            BlockType::Hard => "BLOCKED",
        };

        writeln!(
            f,
            "Action: {} {} '{}'",
            describe_action(self.action),
            result.entity.key.kind,
            self.entity_name
        )?;
        writeln!(f, "Outcome: {}", outcome)?;

        if !result.hard_blocks.is_empty() {
            writeln!(f, "\nHard blocks:")?;
            for (i, block) in result.hard_blocks.iter().enumerate() {
                writeln!(f, "  {}. [{}] {}", i + 1, block.rule_id, block.message)?;
            }
        }

        if !result.soft_blocks.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for (i, block) in result.soft_blocks.iter().enumerate() {
                writeln!(f, "  {}. [{}] {}", i + 1, block.rule_id, block.warning)?;
                writeln!(f, "     Impact: {}", block.impact)?;
            }
        }

        match result.block_type {
            BlockType::Hard => writeln!(
                f,
                "\nThis change cannot proceed until the blocking dependencies are resolved."
            ),
            BlockType::Soft => writeln!(
                f,
                "\nThis change may proceed once a justification is recorded."
            ),
            BlockType::None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Blocks, HardBlock, RuleId, SoftBlock};
    use analysis::{Node, Subgraph};
    use shared::{ActionKind, EntityRef, ProposedChanges, Status};
    use std::time::Duration;

    fn result(blocks: Blocks) -> CheckResult {
        CheckResult::from_blocks(
            Node {
                key: EntityRef::mcp("roster"),
                name: "Rostering".to_string(),
                status: Some(Status::Built),
                parent: None,
            },
            ActionKind::Delete,
            blocks,
            &Subgraph::new(),
        )
    }

    fn hard_result() -> CheckResult {
        result(Blocks {
            hard: vec![HardBlock {
                rule_id: RuleId::ActiveAgentConsumers,
                reason: "Active agents rely on this MCP".to_string(),
                message: "Cannot delete mcp 'Rostering': 1 active agent(s) use it".to_string(),
                affected_entities: vec![EntityRef::agent("a1")],
            }],
            soft: vec![SoftBlock::new(RuleId::CascadeChildren, "2 tools", "lost", vec![])],
        })
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Explainer for Fixed {
        async fn explain(&self, _: &CheckResult, _: &str, _: &Action) -> Result<String, ExplainError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Explainer for Failing {
        async fn explain(&self, _: &CheckResult, _: &str, _: &Action) -> Result<String, ExplainError> {
            Err(ExplainError::Service("503".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Explainer for Slow {
        async fn explain(&self, _: &CheckResult, _: &str, _: &Action) -> Result<String, ExplainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    // ============== Fallback text ==============

    #[test]
    fn test_fallback_lists_every_block() {
        let text = render_fallback(&hard_result(), "Rostering", &Action::Delete);
        assert!(text.starts_with("Action: delete mcp 'Rostering'"));
        assert!(text.contains("Outcome: BLOCKED"));
        assert!(text.contains("1. [active_agent_consumers] Cannot delete"));
        assert!(text.contains("1. [cascade_children] 2 tools"));
        assert!(text.contains("Impact: lost"));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let result = hard_result();
        assert_eq!(
            render_fallback(&result, "Rostering", &Action::Delete),
            render_fallback(&result, "Rostering", &Action::Delete)
        );
    }

    #[test]
    fn test_fallback_soft_layout() {
        let soft = result(Blocks {
            hard: vec![],
            soft: vec![SoftBlock::new(RuleId::CascadeChildren, "2 tools", "lost", vec![])],
        });
        assert_eq!(
            render_fallback(&soft, "Rostering", &Action::Delete),
            "Action: delete mcp 'Rostering'\n\
             Outcome: WARNING (justification required to proceed)\n\
             \n\
             Warnings:\n\
             \x20 1. [cascade_children] 2 tools\n\
             \x20    Impact: lost\n\
             \n\
             This change may proceed once a justification is recorded.\n"
        );
    }

    #[test]
    fn test_fallback_allowed() {
        let text = render_fallback(
            &result(Blocks::default()),
            "Rostering",
            &Action::edit(ProposedChanges::new().rename("Crew Rostering")),
        );
        assert!(text.contains("edit (name)"));
        assert!(text.contains("Outcome: ALLOWED"));
        assert!(!text.contains("Hard blocks"));
    }

    // ============== Service ==============

    #[tokio::test]
    async fn test_no_explainer_uses_fallback() {
        let explanation = ExplanationService::fallback_only()
            .explain(&hard_result(), "Rostering", &Action::Delete)
            .await;
        assert_eq!(explanation.source, ExplanationSource::Fallback);
    }

    #[tokio::test]
    async fn test_generated_text_used() {
        let service = ExplanationService::new(Arc::new(Fixed("Two agents need it.")), ExplainConfig::default());
        let explanation = service.explain(&hard_result(), "Rostering", &Action::Delete).await;
        assert_eq!(explanation.source, ExplanationSource::Generated);
        assert_eq!(explanation.text, "Two agents need it.");
    }

    #[tokio::test]
    async fn test_failure_and_empty_text_fall_back() {
        let failing = ExplanationService::new(Arc::new(Failing), ExplainConfig::default());
        let explanation = failing.explain(&hard_result(), "Rostering", &Action::Delete).await;
        assert_eq!(explanation.source, ExplanationSource::Fallback);

        let empty = ExplanationService::new(Arc::new(Fixed("  ")), ExplainConfig::default());
        let explanation = empty.explain(&hard_result(), "Rostering", &Action::Delete).await;
        assert_eq!(explanation.source, ExplanationSource::Fallback);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let config = ExplainConfig {
            enabled: true,
            timeout_ms: 10,
        };
        let service = ExplanationService::new(Arc::new(Slow), config);
        let explanation = service.explain(&hard_result(), "Rostering", &Action::Delete).await;
        assert_eq!(explanation.source, ExplanationSource::Fallback);
        assert!(explanation.text.contains("BLOCKED"));
    }

    #[tokio::test]
    async fn test_disabled_skips_explainer() {
        let config = ExplainConfig {
            enabled: false,
            timeout_ms: 1_000,
        };
        let service = ExplanationService::new(Arc::new(Fixed("generated")), config);
        let explanation = service.explain(&hard_result(), "Rostering", &Action::Delete).await;
        assert_eq!(explanation.source, ExplanationSource::Fallback);
    }
}
