//! Primary store with an optional read replica
//!
//! The replica (a graph database mirror kept in sync by its own job) answers
//! reads when present and preferred. It is eventually consistent: replica lag
//! can only make evidence slightly stale, never structurally different, so
//! gate decisions do not depend on which backend answered.
//!
//! When the replica reports `UpstreamUnavailable` the same call is repeated
//! against the primary. The fallback applies to that call only; the next call
//! tries the replica again.

use crate::port::{EntityStore, RelationFilter};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use shared::{Entity, EntityKind, EntityRef, Relation, RelationKind, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

pub struct ReplicaStore {
    primary: Arc<dyn EntityStore>,
    replica: Option<Arc<dyn EntityStore>>,
    prefer_replica: bool,
    retry: RetryPolicy,
}

impl ReplicaStore {
    pub fn new(primary: Arc<dyn EntityStore>, retry: RetryPolicy) -> Self {
        Self {
            primary,
            replica: None,
            prefer_replica: true,
            retry,
        }
    }

    /// Builder: attach a read replica
    pub fn with_replica(mut self, replica: Arc<dyn EntityStore>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Builder: route reads to the primary even when a replica is attached
    pub fn prefer_primary(mut self) -> Self {
        self.prefer_replica = false;
        self
    }

    fn active_replica(&self) -> Option<&Arc<dyn EntityStore>> {
        self.replica.as_ref().filter(|_| self.prefer_replica)
    }

    async fn read<'a, T, F, Fut>(&'a self, operation: &str, f: F) -> Result<T>
    where
        F: Fn(&'a dyn EntityStore) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(replica) = self.active_replica() {
            match f(replica.as_ref()).await {
                Err(err) if err.is_retryable() => {
                    warn!(
                        operation,
                        replica = replica.name(),
                        error = %err,
                        "Replica unavailable, reading from primary"
                    );
                }
                other => return other,
            }
        }

        let primary = self.primary.as_ref();
        self.retry.run(operation, || f(primary)).await
    }
}

#[async_trait]
impl EntityStore for ReplicaStore {
    async fn get_entity(&self, entity: &EntityRef) -> Result<Option<Entity>> {
        self.read("get_entity", |store| store.get_entity(entity))
            .await
    }

    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.read("list_entities", |store| store.list_entities(kind))
            .await
    }

    async fn list_relations(
        &self,
        kind: RelationKind,
        filter: &RelationFilter,
    ) -> Result<Vec<Relation>> {
        self.read("list_relations", |store| store.list_relations(kind, filter))
            .await
    }

    async fn list_children(&self, parent: &EntityRef) -> Result<Vec<Entity>> {
        self.read("list_children", |store| store.list_children(parent))
            .await
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}
