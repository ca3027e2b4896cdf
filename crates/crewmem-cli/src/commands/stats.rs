use clap::Parser;
use crewmem::MemoryCoordinator;

use crate::commands::parse_tenant;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,
}

impl StatsCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&self.tenant)?;
        let stats = coordinator.stats(&tenant).await?;

        match format {
            OutputFormat::Json => print_json(&stats)?,
            OutputFormat::Table => {
                println!("Memory statistics for {}", stats.tenant_id);
                println!("======================\n");

                let mut table = new_table(["Store", "Count", "Limit", "Utilization"]);
                table.add_row([
                    "Short-term".to_string(),
                    stats.counts.short_term.to_string(),
                    stats.limits.short_term_max_entries.to_string(),
                    format!("{:.1}%", stats.utilization.short_term_percent),
                ]);
                table.add_row([
                    "Long-term".to_string(),
                    stats.counts.long_term.to_string(),
                    stats.limits.long_term_max_entries.to_string(),
                    format!("{:.1}%", stats.utilization.long_term_percent),
                ]);
                table.add_row([
                    "Entities".to_string(),
                    stats.counts.entity.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]);
                table.add_row([
                    "Relationships".to_string(),
                    stats.counts.relationships.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]);
                println!("{table}\n");
                println!("Total: {} memories", stats.counts.total);

                if !stats.recent_cleanups.is_empty() {
                    println!("\nRecent cleanups");
                    let mut cleanups = new_table(["When", "Reason", "Removed", "Duration"]);
                    for entry in &stats.recent_cleanups {
                        cleanups.add_row([
                            format_timestamp(&entry.created_at),
                            entry.reason.to_string(),
                            entry.entries_removed.to_string(),
                            format!("{:.3}s", entry.duration_seconds),
                        ]);
                    }
                    println!("{cleanups}");
                }
            }
        }

        Ok(())
    }
}
