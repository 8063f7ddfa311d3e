//! opsgraph init command

use clap::Args;
use shared::EngineConfig;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "catalog.yaml";
pub const CONFIG_FILE: &str = "opsgraph.yaml";

const SAMPLE_CATALOG: &str = r#"domains:
  - id: flight-ops
    name: Flight Operations
  - id: ground-ops
    name: Ground Operations
subdomains:
  - id: crew
    name: Crew Management
    domainId: flight-ops
  - id: dispatch
    name: Flight Dispatch
    domainId: flight-ops
  - id: fueling
    name: Fueling
    domainId: ground-ops
mcps:
  - id: roster
    name: Crew Rostering
    subdomainId: crew
    status: built
  - id: pairing
    name: Crew Pairing
    subdomainId: crew
    status: in_progress
  - id: fuel-planner
    name: Fuel Planner
    subdomainId: fueling
    status: planned
tools:
  - id: roster-publish
    name: Publish Roster
    mcpId: roster
    status: built
agents:
  - id: roster-agent
    name: Roster Agent
    status: active
    primaryMcpId: roster
  - id: fuel-agent
    name: Fuel Agent
    status: planned
    mcpIds:
      - fuel-planner
workflows:
  - id: nightly-roster
    name: Nightly Roster Publication
    status: planned
bridges:
  - id: crew-dispatch
    sourceSubdomainId: crew
    targetSubdomainId: dispatch
    bridgeType: data
    strength: 7
    isCritical: true
  - id: dispatch-fueling
    sourceSubdomainId: dispatch
    targetSubdomainId: fueling
    bridgeType: process
    strength: 5
mcpDependencies:
  - id: pairing-roster
    mcpId: pairing
    dependsOnMcpId: roster
    dependencyType: data
workflowMcps:
  - id: nightly-roster-uses-pairing
    workflowId: nightly-roster
    mcpId: pairing
    isRequired: true
"#;

#[derive(Debug, Args)]
pub struct InitCommand {
    /// Directory to initialize
    #[arg(default_value = ".")]
    pub directory: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.directory)?;

        let config = serde_yaml::to_string(&EngineConfig::default())?;
        self.write(&self.directory.join(CATALOG_FILE), SAMPLE_CATALOG)?;
        self.write(&self.directory.join(CONFIG_FILE), &config)?;

        println!("✓ Opsgraph catalog initialized in {}", self.directory.display());
        Ok(())
    }

    fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        if path.exists() && !self.force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
