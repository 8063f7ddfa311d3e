//! End-to-end behavior of the dependency service over an in-memory catalog

use engine::{
    AuditEventType, AuditLogger, AuditSink, BlockType, DependencyService, JsonlAuditSink,
    RiskLevel, RuleId,
};
use rstest::rstest;
use shared::{
    Action, EdgeKind, EngineConfig, Entity, EntityKind, EntityRef, PathConfig, ProposedChanges,
    Relation, Status,
};
use std::sync::Arc;
use store::{EntityStore, InMemoryStore};

fn entity(kind: EntityKind, id: &str, parent: Option<&str>, status: Option<Status>) -> Entity {
    let mut entity = Entity::new(kind, id, id.to_uppercase());
    if let Some(parent) = parent {
        entity = entity.with_parent(parent);
    }
    if let Some(status) = status {
        entity = entity.with_status(status);
    }
    entity
}

/// Two domains: `flight` (crew, ops) and `ground` (fuel, catering, gates)
fn airline() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    for e in [
        entity(EntityKind::Domain, "flight", None, None),
        entity(EntityKind::Domain, "ground", None, None),
        entity(EntityKind::Subdomain, "crew", Some("flight"), None),
        entity(EntityKind::Subdomain, "ops", Some("flight"), None),
        entity(EntityKind::Subdomain, "fuel", Some("ground"), None),
        entity(EntityKind::Subdomain, "catering", Some("ground"), None),
        entity(EntityKind::Subdomain, "gates", Some("ground"), None),
        entity(EntityKind::Subdomain, "island", Some("ground"), None),
        entity(EntityKind::Mcp, "roster", Some("crew"), Some(Status::Built)),
        entity(EntityKind::Mcp, "legacy", Some("crew"), Some(Status::Built)),
    ] {
        store.insert_entity(e).unwrap();
    }
    Arc::new(store)
}

fn service(store: Arc<InMemoryStore>) -> (DependencyService, Arc<AuditLogger>) {
    let audit = Arc::new(AuditLogger::new(1000));
    let sink: Arc<dyn AuditSink> = audit.clone();
    let service = DependencyService::in_memory(store, EngineConfig::default()).with_audit_sink(sink);
    (service, audit)
}

fn bridges_only() -> EngineConfig {
    EngineConfig {
        path: PathConfig {
            kinds: vec![EdgeKind::Bridge],
            undirected: vec![EdgeKind::Bridge],
            stable_order: true,
        },
        ..EngineConfig::default()
    }
}

// ============== Gate scenarios ==============

#[tokio::test]
async fn test_active_primary_agent_hard_blocks_delete() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Agent, "planner", None, Some(Status::Active)))
        .unwrap();
    store
        .insert_relation(Relation::agent_mcp("l1", "planner", "roster", true))
        .unwrap();
    let (service, audit) = service(store);

    let result = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();

    assert!(!result.allowed);
    assert_eq!(result.block_type, BlockType::Hard);
    assert!(result.hard_blocks[0]
        .affected_entities
        .contains(&EntityRef::agent("planner")));
    assert!(result.hard_blocks[0].message.contains("PLANNER"));
    assert_eq!(audit.get_stats().denial_count, 1);
}

#[tokio::test]
async fn test_planned_workflow_soft_blocks_then_override_succeeds() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Workflow, "turnaround", None, Some(Status::Planned)))
        .unwrap();
    store
        .insert_relation(Relation::workflow_mcp("w1", "turnaround", "roster"))
        .unwrap();
    let (service, audit) = service(store.clone());

    let check = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
    assert_eq!(check.block_type, BlockType::Soft);
    assert!(!check.allowed);
    assert!(check.hard_blocks.is_empty());

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
    assert!(store.get_entity(&EntityRef::mcp("roster")).await.unwrap().is_none());
    // Links to the deleted MCP go with it
    assert_eq!(store.relation_count().unwrap(), 0);
    assert_eq!(audit.get_stats().override_count, 1);
}

#[tokio::test]
async fn test_reason_below_minimum_performs_no_mutation() {
    let store = airline();
    let (service, audit) = service(store.clone());

    let err = service
        .proceed_with_soft_block(&EntityRef::mcp("roster"), &Action::Delete, "because", "ops")
        .await
        .unwrap_err();

    assert!(err.is_client_error());
    assert!(store.get_entity(&EntityRef::mcp("roster")).await.unwrap().is_some());
    assert_eq!(audit.get_stats().total_entries, 0);
}

#[tokio::test]
async fn test_check_delete_is_idempotent() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Mcp, "pairing", Some("ops"), Some(Status::Built)))
        .unwrap();
    store
        .insert_relation(Relation::mcp_dependency("d1", "pairing", "roster"))
        .unwrap();
    let (service, _) = service(store);

    let first = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
    let second = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
    assert_eq!(first, second);
}

#[rstest]
#[case::no_consumers(0, 0, BlockType::None)]
#[case::planned_only(0, 1, BlockType::Soft)]
#[case::one_active(1, 1, BlockType::Hard)]
#[case::many_active(3, 2, BlockType::Hard)]
#[tokio::test]
async fn test_severity_grows_with_active_consumers(
    #[case] active: usize,
    #[case] planned: usize,
    #[case] expected: BlockType,
) {
    let store = airline();
    for i in 0..active {
        let id = format!("active-{i}");
        store
            .insert_entity(entity(EntityKind::Agent, &id, None, Some(Status::Active)))
            .unwrap();
        store
            .insert_relation(Relation::agent_mcp(format!("la{i}"), id, "legacy", false))
            .unwrap();
    }
    for i in 0..planned {
        let id = format!("planned-{i}");
        store
            .insert_entity(entity(EntityKind::Agent, &id, None, Some(Status::Planned)))
            .unwrap();
        store
            .insert_relation(Relation::agent_mcp(format!("lp{i}"), id, "legacy", false))
            .unwrap();
    }
    let (service, _) = service(store);

    let result = service.check_delete(&EntityRef::mcp("legacy")).await.unwrap();
    assert_eq!(result.block_type, expected);
    assert_eq!(result.allowed, expected == BlockType::None);
}

#[tokio::test]
async fn test_status_downgrade_with_live_consumer_is_hard() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Workflow, "boarding", None, Some(Status::Active)))
        .unwrap();
    store
        .insert_relation(Relation::workflow_mcp("w1", "boarding", "roster"))
        .unwrap();
    let (service, _) = service(store);

    let result = service
        .check_status_change(&EntityRef::mcp("roster"), Status::Planned)
        .await
        .unwrap();
    assert!(result.is_hard_blocked());
}

#[tokio::test]
async fn test_contract_rename_is_soft_when_consumed() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Workflow, "boarding", None, Some(Status::Active)))
        .unwrap();
    store
        .insert_relation(Relation::workflow_mcp("w1", "boarding", "roster"))
        .unwrap();
    let (service, _) = service(store);

    let result = service
        .check_edit(
            &EntityRef::mcp("roster"),
            ProposedChanges::new().rename("Crew Rostering v2"),
        )
        .await
        .unwrap();
    assert_eq!(result.block_type, BlockType::Soft);
}

#[tokio::test]
async fn test_override_refused_when_hard_block_appears() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Workflow, "turnaround", None, Some(Status::Planned)))
        .unwrap();
    store
        .insert_relation(Relation::workflow_mcp("w1", "turnaround", "roster"))
        .unwrap();
    let (service, audit) = service(store.clone());

    let check = service.check_delete(&EntityRef::mcp("roster")).await.unwrap();
    assert_eq!(check.block_type, BlockType::Soft);

    // Someone activates a consumer between the check and the override
    store
        .insert_entity(entity(EntityKind::Agent, "planner", None, Some(Status::Active)))
        .unwrap();
    store
        .insert_relation(Relation::agent_mcp("l1", "planner", "roster", true))
        .unwrap();

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
    assert_eq!(outcome.check.block_type, BlockType::Hard);
    assert!(store.get_entity(&EntityRef::mcp("roster")).await.unwrap().is_some());

    let denial = &audit.get_recent_denials(1)[0];
    assert_eq!(denial.event_type, AuditEventType::HardBlock);
    assert_eq!(denial.actor.as_deref(), Some("ops-lead"));
}

#[tokio::test]
async fn test_subdomain_delete_respects_consumers_of_its_mcps() {
    let store = airline();
    for e in [
        entity(EntityKind::Mcp, "stands", Some("gates"), Some(Status::Planned)),
        entity(EntityKind::Agent, "planner", None, Some(Status::Active)),
    ] {
        store.insert_entity(e).unwrap();
    }
    store
        .insert_relation(Relation::agent_mcp("l1", "planner", "stands", true))
        .unwrap();
    let (service, audit) = service(store.clone());

    // Deleting the MCP directly is already refused
    let direct = service.check_delete(&EntityRef::mcp("stands")).await.unwrap();
    assert_eq!(direct.block_type, BlockType::Hard);

    let check = service
        .check_delete(&EntityRef::subdomain("gates"))
        .await
        .unwrap();
    assert_eq!(check.block_type, BlockType::Hard);
    let block = check
        .hard_blocks
        .iter()
        .find(|b| b.rule_id == RuleId::ActiveAgentConsumers)
        .unwrap();
    assert!(block.affected_entities.contains(&EntityRef::agent("planner")));
    assert!(block.message.contains("STANDS"));

    let outcome = service
        .proceed_with_soft_block(
            &EntityRef::subdomain("gates"),
            &Action::Delete,
            "gates moving to the airport authority",
            "ops-lead",
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(store.get_entity(&EntityRef::subdomain("gates")).await.unwrap().is_some());
    assert!(store.get_entity(&EntityRef::mcp("stands")).await.unwrap().is_some());
    assert_eq!(audit.get_stats().override_count, 0);
}

#[tokio::test]
async fn test_concurrent_checks_agree() {
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Workflow, "turnaround", None, Some(Status::Planned)))
        .unwrap();
    store
        .insert_relation(Relation::workflow_mcp("w1", "turnaround", "roster"))
        .unwrap();
    let (service, _) = service(store);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.check_delete(&EntityRef::mcp("roster")).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jsonl_trail_keeps_every_concurrent_denial() {
    let dir = tempfile::tempdir().unwrap();
    let store = airline();
    store
        .insert_entity(entity(EntityKind::Agent, "planner", None, Some(Status::Active)))
        .unwrap();
    store
        .insert_relation(Relation::agent_mcp("l1", "planner", "roster", true))
        .unwrap();
    let jsonl = Arc::new(JsonlAuditSink::new(dir.path().join("audit.jsonl")));
    let sink: Arc<dyn AuditSink> = jsonl.clone();
    let service = Arc::new(
        DependencyService::in_memory(store, EngineConfig::default()).with_audit_sink(sink),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.check_delete(&EntityRef::mcp("roster")).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().block_type, BlockType::Hard);
    }

    let entries = jsonl.read_entries().unwrap();
    assert_eq!(entries.len(), 8);
    assert!(entries
        .iter()
        .all(|e| e.event_type == AuditEventType::HardBlock));
}

// ============== Impact ==============

#[tokio::test]
async fn test_three_bridges_into_one_domain_count_once() {
    let store = airline();
    for (i, to) in ["fuel", "catering", "gates"].iter().enumerate() {
        store
            .insert_relation(Relation::bridge(format!("b{i}"), "crew", *to))
            .unwrap();
    }
    let (service, _) = service(store);

    let impact = service.analyze_impact("crew").await.unwrap();
    assert_eq!(impact.total_impact, 1);
    assert_eq!(impact.bridges.len(), 3);
    assert_eq!(impact.affected_domains[0].domain, EntityRef::domain("ground"));
    assert_eq!(impact.affected_domains[0].bridge_count, 3);
}

#[tokio::test]
async fn test_isolated_subdomain_has_no_impact() {
    let (service, _) = service(airline());

    let impact = service.analyze_impact("island").await.unwrap();
    assert_eq!(impact.total_impact, 0);
    assert!(impact.bridges.is_empty());
    assert!(impact.mcp_dependencies.is_empty());
    assert_eq!(impact.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn test_impact_of_missing_subdomain_is_not_found() {
    let (service, _) = service(airline());
    let err = service.analyze_impact("nowhere").await.unwrap_err();
    assert!(err.is_client_error());
}

// ============== Paths and ranking ==============

#[tokio::test]
async fn test_bridge_paths_are_symmetric() {
    let store = airline();
    store
        .insert_relation(Relation::bridge("b1", "crew", "ops"))
        .unwrap();
    store
        .insert_relation(Relation::bridge("b2", "ops", "fuel"))
        .unwrap();
    let service = DependencyService::in_memory(store, bridges_only());

    let forward = service
        .find_path(&EntityRef::subdomain("crew"), &EntityRef::subdomain("fuel"))
        .await
        .unwrap()
        .unwrap();
    let backward = service
        .find_path(&EntityRef::subdomain("fuel"), &EntityRef::subdomain("crew"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(forward.distance, 2);
    assert_eq!(forward.distance, backward.distance);
}

#[tokio::test]
async fn test_disjoint_islands_have_no_path() {
    let store = airline();
    store
        .insert_relation(Relation::bridge("b1", "crew", "ops"))
        .unwrap();
    let service = DependencyService::in_memory(store, bridges_only());

    let path = service
        .find_path(&EntityRef::subdomain("crew"), &EntityRef::subdomain("island"))
        .await
        .unwrap();
    assert!(path.is_none());
}

#[tokio::test]
async fn test_fan_in_outranks_fan_out() {
    let store = airline();
    for id in ["a", "b", "c", "d", "e", "hub", "leaf"] {
        store
            .insert_entity(entity(EntityKind::Mcp, id, Some("ops"), Some(Status::Planned)))
            .unwrap();
    }
    // hub: 3 incoming (score 6); leaf: 5 outgoing (score 5)
    for (i, dependent) in ["a", "b", "c"].iter().enumerate() {
        store
            .insert_relation(Relation::mcp_dependency(format!("in{i}"), *dependent, "hub"))
            .unwrap();
    }
    for (i, provider) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        store
            .insert_relation(Relation::mcp_dependency(format!("out{i}"), "leaf", *provider))
            .unwrap();
    }
    let (service, _) = service(store);

    let ranked = service.rank_critical_mcps().await.unwrap();
    let position = |id: &str| {
        ranked
            .iter()
            .position(|s| s.mcp.key == EntityRef::mcp(id))
            .unwrap()
    };

    assert_eq!(ranked[0].mcp.key, EntityRef::mcp("hub"));
    assert_eq!(ranked[0].score, 6);
    assert!(position("hub") < position("leaf"));
    assert_eq!(ranked[position("leaf")].score, 5);
}

#[tokio::test]
async fn test_outcome_serializes_camel_case() {
    let store = airline();
    let (service, _) = service(store);

    let outcome = service
        .proceed_with_soft_block(
            &EntityRef::mcp("legacy"),
            &Action::edit(ProposedChanges::new().attribute("owner", "crew-it")),
            "ownership moved to crew IT",
            "ops-lead",
        )
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["mutationApplied"], true);
    assert_eq!(json["check"]["blockType"], "none");
    assert!(json["auditEntryId"].is_string());
}
