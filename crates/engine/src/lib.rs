//! # Opsgraph Engine
//!
//! [`DependencyService`] is the single entry point for callers. It owns the
//! store handles, the gate, the analyzers and the audit sink, and exposes
//! the check, proceed and analysis operations.

mod service;

pub use service::{DependencyService, ProceedOutcome};

// Re-export the result types callers receive
pub use analysis::{CriticalityScore, ImpactAnalysis, Path, RiskLevel};
pub use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSink, JsonlAuditSink};
pub use gate::{BlockType, CheckResult, Explainer, Explanation, ExplanationSource, RuleId};
