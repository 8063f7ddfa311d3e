//! # Opsgraph Gate
//!
//! Hard/soft block decisions for proposed catalog mutations.
//!
//! - [`DependencyGate`] validates the action and reads the target's neighborhood
//! - [`rules::evaluate`] is the pure, ordered rule set
//! - [`CheckResult`] carries the decision and its evidence graph
//! - [`ExplanationService`] renders decisions as text, with a deterministic fallback

pub mod explain;
pub mod gate;
pub mod result;
pub mod rules;

pub use explain::{
    render_fallback, Explainer, ExplainError, Explanation, ExplanationService, ExplanationSource,
};
pub use gate::{validate_action, DependencyGate};
pub use result::{
    BlockType, Blocks, CheckResult, DependencyGraph, HardBlock, RuleId, SoftBlock,
};
