use clap::Parser;
use crewmem::MemoryCoordinator;
use crewmem::memory::cleanup_log::CleanupReason;

use crate::commands::parse_tenant;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct CleanupCommand {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,
}

impl CleanupCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&self.tenant)?;
        let report = coordinator.cleanup(&tenant, CleanupReason::OnDemand).await?;

        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => {
                let mut table = new_table(["Store", "Removed"]);
                table.add_row(["Short-term".to_string(), report.short_term.to_string()]);
                table.add_row(["Long-term".to_string(), report.long_term.to_string()]);
                table.add_row(["Entities".to_string(), report.entity.to_string()]);
                println!("{table}");
                println!(
                    "Removed {} records in {:.3}s",
                    report.total, report.duration_seconds
                );
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct ConsolidateCommand {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,
}

impl ConsolidateCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&self.tenant)?;
        let report = coordinator.consolidate(&tenant).await?;

        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => println!(
                "Consolidated {} of {} recent short-term memories (threshold {:.2})",
                report.consolidated, report.evaluated, report.threshold
            ),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct ClearCommand {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(long, help = "Confirm deletion of every memory for the tenant")]
    pub yes: bool,
}

impl ClearCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        if !self.yes {
            return Err("Refusing to clear memory without --yes".into());
        }
        let tenant = parse_tenant(&self.tenant)?;
        let report = coordinator.clear_all(&tenant).await?;

        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => println!(
                "Cleared {} records ({} short-term, {} long-term, {} entities)",
                report.total, report.short_term, report.long_term, report.entity
            ),
        }
        Ok(())
    }
}
