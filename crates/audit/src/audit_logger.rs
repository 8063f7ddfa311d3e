//! AuditLogger - bounded in-memory audit trail

use serde::{Deserialize, Serialize};
use shared::{ActionKind, EntityRef};
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Error writing to or reading from an audit sink
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit sink lock poisoned")]
    Lock,
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub entity: EntityRef,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub rule_ids: Vec<String>,
    #[serde(default)]
    pub affected_entities: Vec<EntityRef>,
    pub success: bool,
}

/// Types of audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A check or proceed attempt was refused by a hard block
    HardBlock,
    /// A soft-blocked mutation went ahead with a justification
    SoftBlockOverride,
    /// A mutation with no blocks was applied
    ActionApplied,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, entity: EntityRef, action: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type,
            actor: None,
            entity,
            action,
            reason: None,
            rule_ids: Vec::new(),
            affected_entities: Vec::new(),
            success: event_type != AuditEventType::HardBlock,
        }
    }

    /// Builder: who asked
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Builder: justification given
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Builder: rules that fired
    pub fn with_rule_ids<I, S>(mut self, rule_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule_ids = rule_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: snapshot of the affected entities
    pub fn with_affected(mut self, affected: Vec<EntityRef>) -> Self {
        self.affected_entities = affected;
        self
    }
}

/// Destination for audit entries
///
/// `record` is synchronous and is called inline from async service methods,
/// so implementations should return quickly.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    fn name(&self) -> &str;
}

/// Audit logger
///
/// Keeps the most recent `max_entries` entries; older ones are dropped.
#[derive(Debug)]
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl AuditLogger {
    /// Create a new AuditLogger
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries: max_entries.max(1),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::Lock)?;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.snapshot(|_| true, limit)
    }

    /// Most recent hard blocks first
    pub fn get_recent_denials(&self, limit: usize) -> Vec<AuditEntry> {
        self.snapshot(|e| !e.success, limit)
    }

    /// Most recent overrides first
    pub fn get_recent_overrides(&self, limit: usize) -> Vec<AuditEntry> {
        self.snapshot(
            |e| e.event_type == AuditEventType::SoftBlockOverride,
            limit,
        )
    }

    fn snapshot(&self, keep: impl Fn(&AuditEntry) -> bool, limit: usize) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .rev()
                .filter(|e| keep(e))
                .take(limit)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn get_stats(&self) -> AuditStats {
        let Ok(entries) = self.entries.lock() else {
            return AuditStats::default();
        };
        let count = |t: AuditEventType| entries.iter().filter(|e| e.event_type == t).count();
        AuditStats {
            total_entries: entries.len(),
            denial_count: entries.iter().filter(|e| !e.success).count(),
            override_count: count(AuditEventType::SoftBlockOverride),
            applied_count: count(AuditEventType::ActionApplied),
        }
    }

    /// Export as JSON, oldest first
    pub fn export_json(&self) -> Result<serde_json::Value, AuditError> {
        let entries = self.entries.lock().map_err(|_| AuditError::Lock)?;
        Ok(serde_json::to_value(entries.iter().collect::<Vec<_>>())?)
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.log(entry.clone())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_entries: usize,
    pub denial_count: usize,
    pub override_count: usize,
    pub applied_count: usize,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(10000)
    }
}
