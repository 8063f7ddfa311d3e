//! CLI Commands

pub mod analyze;
pub mod check;
pub mod init;

pub use analyze::{CriticalCommand, ImpactCommand, PathCommand};
pub use check::{CheckCommand, ProceedCommand};
pub use init::InitCommand;

use anyhow::Context as _;
use clap::{Args, Subcommand};
use engine::{DependencyService, JsonlAuditSink};
use serde::Serialize;
use serde_json::Value;
use shared::{Action, EngineConfig, EntityRef, ProposedChanges, Status};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{CatalogSnapshot, InMemoryStore, ReplicaStore, RetryPolicy};

/// Settings shared by every command that reads the catalog
pub struct Context {
    pub catalog: PathBuf,
    pub config: EngineConfig,
    pub audit_log: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub fn new(
        catalog: PathBuf,
        config: Option<&Path>,
        audit_log: Option<PathBuf>,
        json: bool,
    ) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            catalog,
            config,
            audit_log,
            json,
        })
    }

    pub fn load_store(&self) -> anyhow::Result<Arc<InMemoryStore>> {
        let snapshot = CatalogSnapshot::load(&self.catalog)
            .with_context(|| format!("failed to load catalog {}", self.catalog.display()))?;
        Ok(Arc::new(snapshot.into_store()?))
    }

    /// Reads are retried per the configured policy; writes go straight to the store
    pub fn service(&self, store: Arc<InMemoryStore>) -> DependencyService {
        let reader = ReplicaStore::new(store.clone(), RetryPolicy::from(self.config.retry));
        let service = DependencyService::new(Arc::new(reader), store, self.config.clone());
        match &self.audit_log {
            Some(path) => service.with_audit_sink(Arc::new(JsonlAuditSink::new(path.clone()))),
            None => service,
        }
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// The mutation being checked or applied
#[derive(Debug, Subcommand)]
pub enum ActionSpec {
    /// Delete an entity
    Delete {
        /// Target as kind:id, e.g. mcp:roster
        target: EntityRef,
    },
    /// Edit fields of an entity
    Edit {
        /// Target as kind:id
        target: EntityRef,
        #[command(flatten)]
        changes: EditArgs,
    },
    /// Change the lifecycle status of an entity
    Status {
        /// Target as kind:id
        target: EntityRef,
        /// New status, e.g. planned, in_progress, built, active
        status: Status,
    },
}

impl ActionSpec {
    pub fn target(&self) -> &EntityRef {
        match self {
            ActionSpec::Delete { target }
            | ActionSpec::Edit { target, .. }
            | ActionSpec::Status { target, .. } => target,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            ActionSpec::Delete { .. } => Action::Delete,
            ActionSpec::Edit { changes, .. } => Action::edit(changes.to_changes()),
            ActionSpec::Status { status, .. } => Action::status_change(*status),
        }
    }
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub status: Option<Status>,

    /// New structural parent id
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Attribute change as key=value; the value is parsed as JSON when possible
    #[arg(long = "set", value_parser = parse_attribute)]
    pub attributes: Vec<(String, Value)>,
}

impl EditArgs {
    pub fn to_changes(&self) -> ProposedChanges {
        let mut changes = ProposedChanges::new();
        changes.name = self.name.clone();
        changes.status = self.status;
        changes.parent_id = self.parent.clone();
        changes.description = self.description.clone();
        for (key, value) in &self.attributes {
            changes = changes.attribute(key.clone(), value.clone());
        }
        changes
    }
}

fn parse_attribute(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("attribute name must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
