//! opsgraph impact / path / critical commands

use super::Context;
use crate::output;
use clap::Args;
use shared::EntityRef;

#[derive(Debug, Args)]
pub struct ImpactCommand {
    /// Subdomain id
    pub subdomain: String,
}

impl ImpactCommand {
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let service = ctx.service(ctx.load_store()?);
        let impact = service.analyze_impact(&self.subdomain).await?;

        if ctx.json {
            ctx.print_json(&impact)
        } else {
            output::print_impact(&impact);
            Ok(())
        }
    }
}

#[derive(Debug, Args)]
pub struct PathCommand {
    /// Start as kind:id
    #[arg(long)]
    pub from: EntityRef,

    /// End as kind:id
    #[arg(long)]
    pub to: EntityRef,
}

impl PathCommand {
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let service = ctx.service(ctx.load_store()?);
        let path = service.find_path(&self.from, &self.to).await?;

        if ctx.json {
            ctx.print_json(&path)
        } else {
            output::print_path(&self.from, &self.to, path.as_ref());
            Ok(())
        }
    }
}

#[derive(Debug, Args)]
pub struct CriticalCommand {
    /// Show only the highest-ranked MCPs
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

impl CriticalCommand {
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let service = ctx.service(ctx.load_store()?);
        let mut ranked = service.rank_critical_mcps().await?;
        ranked.truncate(self.top);

        if ctx.json {
            ctx.print_json(&ranked)
        } else {
            output::print_ranking(&ranked);
            Ok(())
        }
    }
}
