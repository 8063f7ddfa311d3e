//! # Opsgraph Audit
//!
//! Write-only audit trail for gate decisions: hard blocks, soft-block
//! overrides and applied mutations. Sinks are fire-and-forget from the
//! engine's point of view; a failing sink never changes a decision.

mod audit_logger;
mod jsonl;

pub use audit_logger::{
    AuditEntry, AuditError, AuditEventType, AuditLogger, AuditSink, AuditStats,
};
pub use jsonl::JsonlAuditSink;
