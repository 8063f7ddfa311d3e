//! # Opsgraph Analysis
//!
//! Read-only graph analysis over the catalog:
//! - [`GraphBuilder`] materializes per-request subgraphs from the store
//! - [`find_path`] breadth-first shortest path
//! - [`CriticalityScorer`] ranks MCPs by dependency fan-in/fan-out
//! - [`ImpactAnalyzer`] folds a subdomain's relations into affected domains

pub mod criticality;
pub mod impact;
pub mod path;
pub mod subgraph;

pub use criticality::{CriticalityScore, CriticalityScorer};
pub use impact::{AffectedDomain, ImpactAnalysis, ImpactAnalyzer, RiskLevel};
pub use path::{find_path, Path};
pub use subgraph::{Adjacent, Edge, GraphBuilder, Node, Scope, Subgraph, SubgraphRequest};
