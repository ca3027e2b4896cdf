use clap::{Parser, Subcommand};
use crewmem::MemoryCoordinator;
use crewmem::config::{MemoryConfigPatch, MemoryConfiguration};

use crate::commands::parse_tenant;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show a tenant's memory configuration")]
    Show(ShowArgs),

    #[clap(about = "Update a tenant's memory configuration from a JSON patch")]
    Set(SetArgs),
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,
}

#[derive(Parser)]
pub struct SetArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(help = r#"JSON object, e.g. '{"short_term_max_entries": 200}'"#)]
    pub patch: String,
}

impl ConfigCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        let config = match &self.command {
            ConfigSubcommand::Show(args) => {
                coordinator.config(&parse_tenant(&args.tenant)?).await?
            }
            ConfigSubcommand::Set(args) => {
                let value: serde_json::Value = serde_json::from_str(&args.patch)?;
                let patch = MemoryConfigPatch::from_json(value)?;
                if patch.is_empty() {
                    return Err("Patch contains no recognized configuration fields".into());
                }
                coordinator
                    .update_config(&parse_tenant(&args.tenant)?, &patch)
                    .await?
            }
        };

        match format {
            OutputFormat::Json => print_json(&config)?,
            OutputFormat::Table => print_table(&config),
        }
        Ok(())
    }
}

fn print_table(config: &MemoryConfiguration) {
    let policy = &config.policy;
    println!("Configuration for {}", config.tenant_id);
    println!("==============================\n");

    let mut table = new_table(["Setting", "Value"]);
    let rows = [
        ("short_term_retention_hours", policy.short_term_retention_hours.to_string()),
        ("short_term_max_entries", policy.short_term_max_entries.to_string()),
        ("long_term_consolidation_threshold", format!("{:.2}", policy.long_term_consolidation_threshold)),
        ("long_term_max_entries", policy.long_term_max_entries.to_string()),
        ("entity_confidence_threshold", format!("{:.2}", policy.entity_confidence_threshold)),
        ("entity_similarity_threshold", format!("{:.2}", policy.entity_similarity_threshold)),
        ("embedding_provider", policy.embedding_provider.clone()),
        ("embedding_model", policy.embedding_model.clone()),
        ("cleanup_enabled", policy.cleanup_enabled.to_string()),
        ("cleanup_interval_hours", policy.cleanup_interval_hours.to_string()),
    ];
    for (key, value) in rows {
        table.add_row([key.to_string(), value]);
    }
    println!("{table}\n");
    println!(
        "Created {}, updated {}",
        format_timestamp(&config.created_at),
        format_timestamp(&config.updated_at)
    );
}
