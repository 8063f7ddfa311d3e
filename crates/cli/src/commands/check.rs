//! opsgraph check / proceed commands

use super::{ActionSpec, Context};
use crate::output;
use clap::Args;
use serde_json::json;
use store::CatalogSnapshot;

#[derive(Debug, Args)]
pub struct CheckCommand {
    #[command(subcommand)]
    pub action: ActionSpec,
}

impl CheckCommand {
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let service = ctx.service(ctx.load_store()?);
        let action = self.action.action();

        let result = service.check(self.action.target(), &action).await?;
        let explanation = service.explain(&result, &action).await;

        if ctx.json {
            ctx.print_json(&json!({ "result": result, "explanation": explanation }))
        } else {
            output::print_check(&result, &explanation);
            Ok(())
        }
    }
}

#[derive(Debug, Args)]
pub struct ProceedCommand {
    /// Justification recorded in the audit trail
    #[arg(long)]
    pub reason: String,

    /// Who is applying the change
    #[arg(long)]
    pub actor: String,

    /// Write the updated catalog back to the snapshot file
    #[arg(long)]
    pub save: bool,

    #[command(subcommand)]
    pub action: ActionSpec,
}

impl ProceedCommand {
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let store = ctx.load_store()?;
        let service = ctx.service(store.clone());
        let target = self.action.target();

        let outcome = service
            .proceed_with_soft_block(target, &self.action.action(), &self.reason, &self.actor)
            .await?;

        if outcome.mutation_applied && self.save {
            CatalogSnapshot::from_store(&store)?.save(&ctx.catalog)?;
            tracing::info!(path = %ctx.catalog.display(), "Catalog snapshot updated");
        }

        if ctx.json {
            ctx.print_json(&outcome)?;
        } else {
            output::print_proceed(&outcome, self.save);
        }

        if !outcome.success {
            anyhow::bail!("{} was not changed: hard blocks remain", target);
        }
        Ok(())
    }
}
