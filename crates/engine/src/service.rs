//! DependencyService - caller-facing façade

use analysis::{
    find_path, CriticalityScore, CriticalityScorer, GraphBuilder, ImpactAnalysis, ImpactAnalyzer,
    Path, SubgraphRequest,
};
use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSink};
use gate::{BlockType, CheckResult, DependencyGate, Explainer, Explanation, ExplanationService};
use serde::Serialize;
use shared::{
    Action, CatalogError, EdgeKind, EngineConfig, EntityRef, Mutation, ProposedChanges, Result,
    Status,
};
use std::sync::Arc;
use store::{CatalogWriter, EntityStore, InMemoryStore};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of [`DependencyService::proceed_with_soft_block`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceedOutcome {
    pub success: bool,
    /// The re-validation performed right before committing
    pub check: CheckResult,
    pub mutation_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_entry_id: Option<Uuid>,
}

/// DependencyService - checks, overrides and analyses over one catalog
pub struct DependencyService {
    store: Arc<dyn EntityStore>,
    writer: Arc<dyn CatalogWriter>,
    gate: DependencyGate,
    builder: GraphBuilder,
    analyzer: ImpactAnalyzer,
    scorer: CriticalityScorer,
    audit: Arc<dyn AuditSink>,
    explanations: ExplanationService,
    config: EngineConfig,
}

impl DependencyService {
    /// Create a service reading from `store` and committing through `writer`
    pub fn new(
        store: Arc<dyn EntityStore>,
        writer: Arc<dyn CatalogWriter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gate: DependencyGate::new(store.clone(), config.gate.clone()),
            builder: GraphBuilder::new(store.clone()),
            analyzer: ImpactAnalyzer::new(store.clone(), config.impact),
            scorer: CriticalityScorer::new(config.criticality),
            audit: Arc::new(AuditLogger::default()),
            explanations: ExplanationService::fallback_only(),
            store,
            writer,
            config,
        }
    }

    /// Read and write through the same in-memory catalog
    pub fn in_memory(store: Arc<InMemoryStore>, config: EngineConfig) -> Self {
        Self::new(store.clone(), store, config)
    }

    /// Builder: replace the default in-memory audit trail
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Builder: attach an external explanation service
    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explanations = ExplanationService::new(explainer, self.config.explain);
        self
    }

    // ========== Getters ==========

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    // ========== Checks ==========

    pub async fn check_delete(&self, target: &EntityRef) -> Result<CheckResult> {
        self.check(target, &Action::Delete).await
    }

    pub async fn check_edit(
        &self,
        target: &EntityRef,
        changes: ProposedChanges,
    ) -> Result<CheckResult> {
        self.check(target, &Action::edit(changes)).await
    }

    pub async fn check_status_change(
        &self,
        target: &EntityRef,
        new_status: Status,
    ) -> Result<CheckResult> {
        self.check(target, &Action::status_change(new_status)).await
    }

    /// Run the gate for any action; hard blocks are reported to the audit sink
    pub async fn check(&self, target: &EntityRef, action: &Action) -> Result<CheckResult> {
        let result = self.gate.check_action(target, action).await?;
        if result.is_hard_blocked() {
            self.record(hard_block_entry(target, &result, None, None));
        }
        Ok(result)
    }

    /// Commit a soft-blocked (or unblocked) mutation with a recorded justification
    ///
    /// The action is re-checked first. A hard block found at that point
    /// refuses the mutation and is reported as such; it is returned as an
    /// unsuccessful outcome rather than an error.
    pub async fn proceed_with_soft_block(
        &self,
        target: &EntityRef,
        action: &Action,
        reason: &str,
        actor: &str,
    ) -> Result<ProceedOutcome> {
        let reason = reason.trim();
        let min = self.config.gate.min_reason_length;
        if reason.chars().count() < min {
            return Err(CatalogError::validation(
                "reason",
                format!("must be at least {} characters", min),
            ));
        }
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(CatalogError::validation("actor", "must not be empty"));
        }

        let check = self.gate.check_action(target, action).await?;
        if check.is_hard_blocked() {
            let entry = hard_block_entry(target, &check, Some(actor), Some(reason));
            let audit_entry_id = self.record(entry);
            warn!(
                entity = %target,
                actor,
                rules = check.hard_blocks.len(),
                "Override refused: re-validation found hard blocks"
            );
            return Ok(ProceedOutcome {
                success: false,
                check,
                mutation_applied: false,
                audit_entry_id,
            });
        }

        self.writer
            .apply(&Mutation::new(target.clone(), action.clone()))
            .await?;

        let event_type = match check.block_type {
            BlockType::Soft => AuditEventType::SoftBlockOverride,
            _ => AuditEventType::ActionApplied,
        };
        let entry = AuditEntry::new(event_type, target.clone(), action.kind())
            .with_actor(actor)
            .with_reason(reason)
            .with_rule_ids(check.rule_ids().iter().map(|r| r.as_str()))
            .with_affected(check.affected_entities());
        let audit_entry_id = self.record(entry);

        info!(
            entity = %target,
            action = %action.kind(),
            actor,
            overridden = check.soft_blocks.len(),
            "Mutation applied"
        );
        Ok(ProceedOutcome {
            success: true,
            check,
            mutation_applied: true,
            audit_entry_id,
        })
    }

    /// Text rendering of a decision; never fails
    pub async fn explain(&self, result: &CheckResult, action: &Action) -> Explanation {
        self.explanations
            .explain(result, &result.entity.name, action)
            .await
    }

    // ========== Analyses ==========

    pub async fn analyze_impact(&self, subdomain_id: &str) -> Result<ImpactAnalysis> {
        self.analyzer.analyze(subdomain_id).await
    }

    /// Shortest path over the configured relation kinds
    ///
    /// Both endpoints must exist; `None` means they are not connected.
    pub async fn find_path(&self, source: &EntityRef, target: &EntityRef) -> Result<Option<Path>> {
        for key in [source, target] {
            if self.store.get_entity(key).await?.is_none() {
                return Err(CatalogError::not_found(key));
            }
        }

        let request = SubgraphRequest::universe(self.config.path.kinds.clone())
            .with_seed(source.clone())
            .with_undirected(self.config.path.undirected.clone())
            .with_stable_order(self.config.path.stable_order);
        let graph = self.builder.build(&request).await?;
        Ok(find_path(&graph, source, target))
    }

    /// Every MCP ranked by dependency fan-in and fan-out
    pub async fn rank_critical_mcps(&self) -> Result<Vec<CriticalityScore>> {
        let request = SubgraphRequest::universe(vec![EdgeKind::McpDependency]);
        let graph = self.builder.build(&request).await?;
        Ok(self.scorer.score_subgraph(&graph))
    }

    /// Hand an entry to the audit sink; a failing sink only logs
    fn record(&self, entry: AuditEntry) -> Option<Uuid> {
        let id = entry.id;
        match self.audit.record(&entry) {
            Ok(()) => Some(id),
            Err(err) => {
                warn!(
                    sink = self.audit.name(),
                    entity = %entry.entity,
                    error = %err,
                    "Failed to write audit entry"
                );
                None
            }
        }
    }
}

fn hard_block_entry(
    target: &EntityRef,
    result: &CheckResult,
    actor: Option<&str>,
    reason: Option<&str>,
) -> AuditEntry {
    let mut entry = AuditEntry::new(AuditEventType::HardBlock, target.clone(), result.action)
        .with_rule_ids(result.hard_blocks.iter().map(|b| b.rule_id.as_str()))
        .with_affected(result.affected_entities());
    entry.actor = actor.map(str::to_string);
    entry.reason = reason.map(str::to_string);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit::AuditError;
    use shared::{Entity, EntityKind, Relation};

    fn catalog() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new()
            .with_entity(Entity::new(EntityKind::Domain, "flight", "Flight Operations"))
            .unwrap()
            .with_entity(Entity::new(EntityKind::Subdomain, "crew", "Crew").with_parent("flight"))
            .unwrap()
            .with_entity(
                Entity::new(EntityKind::Mcp, "roster", "Rostering")
                    .with_parent("crew")
                    .with_status(Status::Built),
            )
            .unwrap()
            .with_entity(
                Entity::new(EntityKind::Mcp, "pairing", "Pairing")
                    .with_parent("crew")
                    .with_status(Status::Built),
            )
            .unwrap()
            .with_entity(
                Entity::new(EntityKind::Workflow, "nightly", "Nightly Roster")
                    .with_status(Status::Planned),
            )
            .unwrap()
            .with_relation(Relation::workflow_mcp("w1", "nightly", "roster"))
            .unwrap()
            .with_relation(Relation::mcp_dependency("d1", "pairing", "roster"))
            .unwrap();
        Arc::new(store)
    }

    fn service(store: Arc<InMemoryStore>) -> (DependencyService, Arc<AuditLogger>) {
        let audit = Arc::new(AuditLogger::new(100));
        let service =
            DependencyService::in_memory(store, EngineConfig::default()).with_audit_sink(audit.clone());
        (service, audit)
    }

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _: &AuditEntry) -> std::result::Result<(), AuditError> {
            Err(AuditError::Lock)
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    // ============== Proceed ==============

    #[tokio::test]
    async fn test_short_reason_rejected_without_mutation() {
        let store = catalog();
        let (service, audit) = service(store.clone());

        let err = service
            .proceed_with_soft_block(&EntityRef::mcp("roster"), &Action::Delete, " too short ", "ops")
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(store.entity_count().unwrap(), 5);
        assert_eq!(audit.get_stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_blank_actor_rejected() {
        let (service, _) = service(catalog());
        let err = service
            .proceed_with_soft_block(
                &EntityRef::mcp("roster"),
                &Action::Delete,
                "migrating to new MCP version",
                "  ",
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("actor"));
    }

    #[tokio::test]
    async fn test_override_applies_and_audits() {
        let store = catalog();
        let (service, audit) = service(store.clone());

        let outcome = service
            .proceed_with_soft_block(
                &EntityRef::mcp("roster"),
                &Action::Delete,
                "migrating to new MCP version",
                "ops-lead",
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.mutation_applied);
        assert!(store.get_entity(&EntityRef::mcp("roster")).await.unwrap().is_none());

        let entry = &audit.get_recent(1)[0];
        assert_eq!(Some(entry.id), outcome.audit_entry_id);
        assert_eq!(entry.event_type, AuditEventType::SoftBlockOverride);
        assert_eq!(entry.actor.as_deref(), Some("ops-lead"));
        assert!(entry.affected_entities.contains(&EntityRef::workflow("nightly")));
    }

    #[tokio::test]
    async fn test_unblocked_action_audited_as_applied() {
        let (service, audit) = service(catalog());
        let outcome = service
            .proceed_with_soft_block(
                &EntityRef::mcp("pairing"),
                &Action::edit(ProposedChanges::new().attribute("owner", "crew-it")),
                "ownership moved to crew IT",
                "ops-lead",
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(audit.get_recent(1)[0].event_type, AuditEventType::ActionApplied);
    }

    #[tokio::test]
    async fn test_hard_block_refuses_override() {
        let store = catalog();
        store
            .insert_entity(Entity::new(EntityKind::Agent, "planner", "Planner").with_status(Status::Active))
            .unwrap();
        store
            .insert_relation(Relation::agent_mcp("l1", "planner", "roster", true))
            .unwrap();
        let (service, audit) = service(store.clone());

        let outcome = service
            .proceed_with_soft_block(
                &EntityRef::mcp("roster"),
                &Action::Delete,
                "migrating to new MCP version",
                "ops-lead",
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(!outcome.mutation_applied);
        assert!(store.get_entity(&EntityRef::mcp("roster")).await.unwrap().is_some());
        let denial = &audit.get_recent_denials(1)[0];
        assert_eq!(denial.reason.as_deref(), Some("migrating to new MCP version"));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_decision() {
        let store = catalog();
        let service = DependencyService::in_memory(store.clone(), EngineConfig::default())
            .with_audit_sink(Arc::new(BrokenSink));

        let outcome = service
            .proceed_with_soft_block(
                &EntityRef::mcp("roster"),
                &Action::Delete,
                "migrating to new MCP version",
                "ops-lead",
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.audit_entry_id, None);
    }

    // ============== Checks and analyses ==============

    #[tokio::test]
    async fn test_check_hard_block_is_audited() {
        let store = catalog();
        store
            .insert_entity(Entity::new(EntityKind::Agent, "planner", "Planner").with_status(Status::Active))
            .unwrap();
        store
            .insert_relation(Relation::agent_mcp("l1", "planner", "roster", true))
            .unwrap();
        let (service, audit) = service(store);

        let result = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
        assert!(result.is_hard_blocked());
        assert_eq!(audit.get_stats().denial_count, 1);
        assert_eq!(audit.get_recent(1)[0].actor, None);
    }

    #[tokio::test]
    async fn test_soft_check_is_not_audited() {
        let (service, audit) = service(catalog());
        let result = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
        assert_eq!(result.block_type, BlockType::Soft);
        assert_eq!(audit.get_stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_find_path_requires_both_ends() {
        let (service, _) = service(catalog());
        let err = service
            .find_path(&EntityRef::subdomain("crew"), &EntityRef::subdomain("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_rank_critical_mcps() {
        let (service, _) = service(catalog());
        let ranked = service.rank_critical_mcps().await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].mcp.key, EntityRef::mcp("roster"));
        assert_eq!(ranked[0].incoming, 1);
    }

    #[tokio::test]
    async fn test_explain_without_explainer_uses_fallback() {
        let (service, _) = service(catalog());
        let result = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
        let explanation = service.explain(&result, &Action::Delete).await;
        assert!(explanation.text.contains("Action: delete mcp 'Rostering'"));
    }
}
