//! Mutations that callers propose against catalogued entities

use crate::entity::{EntityRef, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field changes for an edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// New structural parent id (re-parenting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form attribute changes (endpoint, protocol, dependency type, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl ProposedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: rename
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: change status
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Builder: move under another parent
    pub fn reparent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Builder: change a free-form attribute
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.parent_id.is_none()
            && self.description.is_none()
            && self.attributes.is_empty()
    }
}

/// A proposed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Delete,
    Edit {
        changes: ProposedChanges,
    },
    #[serde(rename_all = "camelCase")]
    StatusChange {
        new_status: Status,
    },
}

impl Action {
    pub fn edit(changes: ProposedChanges) -> Self {
        Action::Edit { changes }
    }

    pub fn status_change(new_status: Status) -> Self {
        Action::StatusChange { new_status }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Delete => ActionKind::Delete,
            Action::Edit { .. } => ActionKind::Edit,
            Action::StatusChange { .. } => ActionKind::StatusChange,
        }
    }

    /// Status the entity would end up with, if the action changes it
    pub fn target_status(&self) -> Option<Status> {
        match self {
            Action::StatusChange { new_status } => Some(*new_status),
            Action::Edit { changes } => changes.status,
            Action::Delete => None,
        }
    }
}

/// Discriminant of [`Action`], used in results and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Delete,
    Edit,
    StatusChange,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Delete => "delete",
            ActionKind::Edit => "edit",
            ActionKind::StatusChange => "status_change",
        };
        f.write_str(name)
    }
}

/// An action bound to its target, as committed through the store's write port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub target: EntityRef,
    #[serde(flatten)]
    pub action: Action,
}

impl Mutation {
    pub fn new(target: EntityRef, action: Action) -> Self {
        Self { target, action }
    }
}
