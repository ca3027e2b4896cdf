use clap::{Parser, Subcommand};
use crewmem::MemoryCoordinator;
use crewmem::memory::types::{RelationshipDirection, parse_record_id};

use crate::commands::parse_tenant;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct EntityCommand {
    #[clap(subcommand)]
    pub command: EntitySubcommand,
}

#[derive(Subcommand)]
pub enum EntitySubcommand {
    #[clap(about = "List entities of one type")]
    List(ListArgs),

    #[clap(about = "Show an entity's relationships")]
    Relationships(RelationshipArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(long, short = 't', help = "Entity type, e.g. person or organization")]
    pub r#type: String,

    #[clap(long, short, default_value = "20", help = "Maximum number of entities")]
    pub limit: usize,
}

#[derive(Parser)]
pub struct RelationshipArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(help = "Entity ID (UUID format)")]
    pub id: String,

    #[clap(long, short = 't', help = "Only this relationship type")]
    pub r#type: Option<String>,
}

impl EntityCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            EntitySubcommand::List(args) => Self::list(coordinator, args, format).await,
            EntitySubcommand::Relationships(args) => {
                Self::relationships(coordinator, args, format).await
            }
        }
    }

    async fn list(coordinator: &MemoryCoordinator, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let entities = coordinator
            .entities_by_type(&tenant, &args.r#type, args.limit)
            .await?;

        match format {
            OutputFormat::Json => print_json(&entities)?,
            OutputFormat::Table => {
                if entities.is_empty() {
                    println!("No {} entities found.", args.r#type);
                    return Ok(());
                }
                let mut table =
                    new_table(["ID", "Name", "Confidence", "Mentions", "Description", "Updated"]);
                for entity in &entities {
                    table.add_row([
                        truncate_string(&entity.id.to_string(), 8),
                        entity.name.clone(),
                        format!("{:.2}", entity.confidence),
                        entity.mention_count.to_string(),
                        truncate_string(entity.description.as_deref().unwrap_or("-"), 40),
                        format_timestamp(&entity.last_updated),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    async fn relationships(
        coordinator: &MemoryCoordinator,
        args: &RelationshipArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let id = parse_record_id(&args.id)?;
        let views = coordinator
            .relationships(&tenant, id, args.r#type.as_deref())
            .await?;

        match format {
            OutputFormat::Json => print_json(&views)?,
            OutputFormat::Table => {
                if views.is_empty() {
                    println!("No relationships found.");
                    return Ok(());
                }
                let mut table = new_table(["Direction", "Type", "Entity", "Strength", "Context"]);
                for view in &views {
                    let direction = match view.direction {
                        RelationshipDirection::Outgoing => "->",
                        RelationshipDirection::Incoming => "<-",
                    };
                    table.add_row([
                        direction.to_string(),
                        view.relationship.relationship_type.clone(),
                        format!("{} ({})", view.other_entity.name, view.other_entity.entity_type),
                        format!("{:.2}", view.relationship.strength),
                        truncate_string(view.relationship.context.as_deref().unwrap_or("-"), 40),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }
}
