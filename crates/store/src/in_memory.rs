//! In-memory entity store
//!
//! Thread-safe backend used by the CLI (loaded from a catalog snapshot) and by
//! tests. Rows are returned in insertion order, which makes fetch order, and
//! therefore path tie-breaking, reproducible.

use crate::port::{CatalogWriter, EntityStore, RelationFilter};
use async_trait::async_trait;
use shared::{
    Action, CatalogError, Entity, EntityKind, EntityRef, Mutation, ProposedChanges, Relation,
    RelationKind, Result,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    entities: HashMap<EntityRef, Entity>,
    order: Vec<EntityRef>,
    relations: Vec<Relation>,
}

/// In-memory catalog
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    name: String,
    inner: Arc<RwLock<Inner>>,
    offline: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            name: "in-memory".to_string(),
            inner: Arc::new(RwLock::new(Inner::default())),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builder: name reported in logs and upstream errors
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Simulate an outage: every read and write fails with `UpstreamUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.ensure_online()?;
        self.inner
            .read()
            .map_err(|_| CatalogError::unavailable(&self.name, "Failed to acquire read lock"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.ensure_online()?;
        self.inner
            .write()
            .map_err(|_| CatalogError::unavailable(&self.name, "Failed to acquire write lock"))
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::unavailable(&self.name, "store is offline"));
        }
        Ok(())
    }

    // ========== Loading ==========

    /// Insert or replace an entity. Replacing keeps the original position.
    pub fn insert_entity(&self, entity: Entity) -> Result<()> {
        let mut inner = self.write()?;
        let key = entity.key();
        if inner.entities.insert(key.clone(), entity).is_none() {
            inner.order.push(key);
        }
        Ok(())
    }

    /// Insert or replace a relation row by id within its table
    pub fn insert_relation(&self, relation: Relation) -> Result<()> {
        let mut inner = self.write()?;
        match inner
            .relations
            .iter()
            .position(|r| r.kind == relation.kind && r.id == relation.id)
        {
            Some(index) => inner.relations[index] = relation,
            None => inner.relations.push(relation),
        }
        Ok(())
    }

    /// Builder: add an entity
    pub fn with_entity(self, entity: Entity) -> Result<Self> {
        self.insert_entity(entity)?;
        Ok(self)
    }

    /// Builder: add a relation
    pub fn with_relation(self, relation: Relation) -> Result<Self> {
        self.insert_relation(relation)?;
        Ok(self)
    }

    // ========== Getters ==========

    /// Every entity, in insertion order
    pub fn all_entities(&self) -> Result<Vec<Entity>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|key| inner.entities.get(key).cloned())
            .collect())
    }

    /// Every relation row, in insertion order
    pub fn all_relations(&self) -> Result<Vec<Relation>> {
        Ok(self.read()?.relations.clone())
    }

    pub fn entity_count(&self) -> Result<usize> {
        Ok(self.read()?.entities.len())
    }

    pub fn relation_count(&self) -> Result<usize> {
        Ok(self.read()?.relations.len())
    }
}

impl Inner {
    fn children_of(&self, parent: &EntityRef) -> Vec<EntityRef> {
        let Some(child_kind) = parent.kind.child_kind() else {
            return Vec::new();
        };
        self.order
            .iter()
            .filter(|key| key.kind == child_kind)
            .filter(|key| {
                self.entities
                    .get(key)
                    .and_then(|e| e.parent_id.as_deref())
                    == Some(parent.id.as_str())
            })
            .cloned()
            .collect()
    }

    /// Remove an entity and its structural descendants, plus every relation
    /// touching a removed row
    fn delete_cascade(&mut self, root: &EntityRef) -> usize {
        let mut removed: HashSet<EntityRef> = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(key) = stack.pop() {
            stack.extend(self.children_of(&key));
            removed.insert(key);
        }

        for key in &removed {
            self.entities.remove(key);
        }
        self.order.retain(|key| !removed.contains(key));
        self.relations
            .retain(|r| !removed.contains(&r.source) && !removed.contains(&r.target));
        removed.len()
    }

    fn apply_changes(&mut self, target: &EntityRef, changes: &ProposedChanges) -> Result<()> {
        if let Some(status) = changes.status {
            target.kind.validate_status(status)?;
        }
        if let Some(parent_id) = &changes.parent_id {
            let parent_kind = target.kind.parent_kind().ok_or_else(|| {
                CatalogError::validation(
                    "parentId",
                    format!("{} entities have no structural parent", target.kind),
                )
            })?;
            let parent = EntityRef::new(parent_kind, parent_id.clone());
            if !self.entities.contains_key(&parent) {
                return Err(CatalogError::not_found(&parent));
            }
        }

        let entity = self
            .entities
            .get_mut(target)
            .ok_or_else(|| CatalogError::not_found(target))?;

        if let Some(name) = &changes.name {
            entity.name = name.clone();
        }
        if let Some(status) = changes.status {
            entity.status = Some(status);
        }
        if let Some(parent_id) = &changes.parent_id {
            entity.parent_id = Some(parent_id.clone());
        }
        if let Some(description) = &changes.description {
            entity.description = Some(description.clone());
        }
        for (key, value) in &changes.attributes {
            // null clears the attribute
            if value.is_null() {
                entity.attributes.remove(key);
            } else {
                entity.attributes.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get_entity(&self, entity: &EntityRef) -> Result<Option<Entity>> {
        Ok(self.read()?.entities.get(entity).cloned())
    }

    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter(|key| key.kind == kind)
            .filter_map(|key| inner.entities.get(key).cloned())
            .collect())
    }

    async fn list_relations(
        &self,
        kind: RelationKind,
        filter: &RelationFilter,
    ) -> Result<Vec<Relation>> {
        let inner = self.read()?;
        Ok(inner
            .relations
            .iter()
            .filter(|r| r.kind == kind && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn list_children(&self, parent: &EntityRef) -> Result<Vec<Entity>> {
        let inner = self.read()?;
        Ok(inner
            .children_of(parent)
            .iter()
            .filter_map(|key| inner.entities.get(key).cloned())
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl CatalogWriter for InMemoryStore {
    async fn apply(&self, mutation: &Mutation) -> Result<()> {
        let mut inner = self.write()?;
        let target = &mutation.target;
        if !inner.entities.contains_key(target) {
            return Err(CatalogError::not_found(target));
        }

        match &mutation.action {
            Action::Delete => {
                let removed = inner.delete_cascade(target);
                debug!(entity = %target, removed, "Deleted entity");
            }
            Action::Edit { changes } => {
                inner.apply_changes(target, changes)?;
                debug!(entity = %target, "Edited entity");
            }
            Action::StatusChange { new_status } => {
                target.kind.validate_status(*new_status)?;
                if let Some(entity) = inner.entities.get_mut(target) {
                    entity.status = Some(*new_status);
                }
                debug!(entity = %target, status = %new_status, "Changed status");
            }
        }
        Ok(())
    }
}
