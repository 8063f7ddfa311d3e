//! Opsgraph CLI - dependency checks against a catalog snapshot
//!
//! Usage:
//!   opsgraph init [dir]                          - Write a sample catalog and config
//!   opsgraph check delete mcp:roster             - Classify a deletion
//!   opsgraph check edit mcp:roster --name X      - Classify an edit
//!   opsgraph check status mcp:roster planned     - Classify a status change
//!   opsgraph proceed --reason R --actor A delete mcp:roster
//!   opsgraph impact crew                         - Cross-domain impact of a subdomain
//!   opsgraph path --from subdomain:a --to subdomain:b
//!   opsgraph critical --top 5                    - Rank MCPs by criticality

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{
    CheckCommand, Context, CriticalCommand, ImpactCommand, InitCommand, PathCommand,
    ProceedCommand,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opsgraph")]
#[command(about = "Opsgraph - dependency and impact analysis for the operations catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog snapshot (YAML or JSON)
    #[arg(short, long, global = true, default_value = "catalog.yaml")]
    catalog: PathBuf,

    /// Engine configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append audit entries to this JSON Lines file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample catalog and configuration
    Init(InitCommand),
    /// Check whether a mutation is allowed
    Check(CheckCommand),
    /// Apply a soft-blocked mutation with a justification
    Proceed(ProceedCommand),
    /// Cross-domain impact of a subdomain
    Impact(ImpactCommand),
    /// Shortest dependency path between two entities
    Path(PathCommand),
    /// Rank MCPs by criticality
    Critical(CriticalCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init(cmd) = &cli.command {
        return cmd.run();
    }

    let ctx = Context::new(cli.catalog, cli.config.as_deref(), cli.audit_log, cli.json)?;
    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Check(cmd) => cmd.run(&ctx).await,
        Commands::Proceed(cmd) => cmd.run(&ctx).await,
        Commands::Impact(cmd) => cmd.run(&ctx).await,
        Commands::Path(cmd) => cmd.run(&ctx).await,
        Commands::Critical(cmd) => cmd.run(&ctx).await,
    }
}
