//! # Opsgraph Store
//!
//! Query ports for the catalog plus the backends shipped with Opsgraph:
//! an in-memory store seeded from snapshots, and a primary/replica
//! combinator with per-call retry.

pub mod in_memory;
pub mod port;
pub mod replica;
pub mod retry;
pub mod snapshot;

pub use in_memory::InMemoryStore;
pub use port::{CatalogWriter, EntityStore, RelationFilter};
pub use replica::ReplicaStore;
pub use retry::RetryPolicy;
pub use snapshot::CatalogSnapshot;
