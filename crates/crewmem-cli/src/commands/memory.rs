use clap::{Parser, Subcommand};
use crewmem::memory::params::{RetrieveOptions, SearchParams};
use crewmem::memory::short_term::DEFAULT_CONTEXT_LIMIT;
use crewmem::memory::types::{MemoryRecord, Record, parse_record_id};
use crewmem::{MemoryCoordinator, MemoryKind};

use crate::commands::parse_tenant;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List the newest memories of one kind")]
    Recent(RecentArgs),

    #[clap(about = "Similarity search across memory kinds")]
    Search(SearchArgs),

    #[clap(about = "Show the recent conversation, oldest first")]
    Context(ContextArgs),

    #[clap(about = "List high-importance insights")]
    Insights(InsightsArgs),

    #[clap(about = "Show one memory")]
    Show(IdArgs),

    #[clap(about = "Delete one memory")]
    Delete(IdArgs),
}

#[derive(Parser)]
pub struct RecentArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(long, short, default_value = "short_term", help = "Memory kind (short_term, long_term, entity)")]
    pub kind: MemoryKind,

    #[clap(long, short, default_value = "20", help = "Maximum number of memories to display")]
    pub limit: usize,

    #[clap(long, short = 't', help = "Filter by content type")]
    pub content_type: Option<String>,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(help = "Query text")]
    pub query: String,

    #[clap(long, short, help = "Restrict to these kinds (repeatable)")]
    pub kind: Vec<MemoryKind>,

    #[clap(long, short, default_value = "10", help = "Maximum results per kind")]
    pub limit: usize,

    #[clap(long, default_value = "0.5", help = "Minimum similarity in [0, 1]")]
    pub threshold: f32,
}

#[derive(Parser)]
pub struct ContextArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(long, short, default_value_t = DEFAULT_CONTEXT_LIMIT, help = "Number of turns")]
    pub limit: usize,

    #[clap(long, short, help = "Restrict to one execution")]
    pub execution: Option<String>,
}

#[derive(Parser)]
pub struct InsightsArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(long, short, default_value = "10", help = "Maximum number of insights")]
    pub limit: usize,
}

#[derive(Parser)]
pub struct IdArgs {
    #[clap(help = "Tenant (crew) id")]
    pub tenant: String,

    #[clap(help = "Memory kind (short_term, long_term, entity)")]
    pub kind: MemoryKind,

    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,
}

impl MemoryCommand {
    pub async fn execute(&self, coordinator: &MemoryCoordinator, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::Recent(args) => Self::recent(coordinator, args, format).await,
            MemorySubcommand::Search(args) => Self::search(coordinator, args, format).await,
            MemorySubcommand::Context(args) => Self::context(coordinator, args, format).await,
            MemorySubcommand::Insights(args) => Self::insights(coordinator, args, format).await,
            MemorySubcommand::Show(args) => Self::show(coordinator, args, format).await,
            MemorySubcommand::Delete(args) => Self::delete(coordinator, args, format).await,
        }
    }

    async fn recent(coordinator: &MemoryCoordinator, args: &RecentArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let records = coordinator
            .recent(&tenant, args.kind, args.limit, args.content_type.as_deref())
            .await?;
        print_records(&records, format)
    }

    async fn search(coordinator: &MemoryCoordinator, args: &SearchArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let mut options = RetrieveOptions {
            search: SearchParams::new(args.limit, args.threshold),
            ..Default::default()
        };
        if !args.kind.is_empty() {
            options = options.with_kinds(args.kind.iter().copied());
        }

        let results = coordinator.retrieve(&tenant, &args.query, &options).await?;

        match format {
            OutputFormat::Json => print_json(&results)?,
            OutputFormat::Table => {
                for (kind, hits) in &results {
                    println!("{} ({} results)", kind.label(), hits.len());
                    if hits.is_empty() {
                        continue;
                    }
                    let mut table = new_table(["ID", "Content", "Similarity", "Score", "Created"]);
                    for hit in hits {
                        table.add_row([
                            truncate_string(&hit.record.id().to_string(), 8),
                            truncate_string(hit.record.content(), 50),
                            format!("{:.3}", hit.similarity),
                            format!("{:.3}", hit.score),
                            format_timestamp(&hit.record.created_at()),
                        ]);
                    }
                    println!("{table}\n");
                }
            }
        }
        Ok(())
    }

    async fn context(coordinator: &MemoryCoordinator, args: &ContextArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let turns = coordinator
            .conversation_context(&tenant, args.limit, args.execution.as_deref())
            .await?;

        match format {
            OutputFormat::Json => print_json(&turns)?,
            OutputFormat::Table => {
                if turns.is_empty() {
                    println!("No conversation turns found.");
                    return Ok(());
                }
                let mut table = new_table(["When", "Type", "Agent", "Content"]);
                for turn in &turns {
                    table.add_row([
                        format_timestamp(&turn.created_at),
                        turn.content_type.clone(),
                        turn.agent_id.clone().unwrap_or_else(|| "-".to_string()),
                        truncate_string(&turn.content, 60),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    async fn insights(coordinator: &MemoryCoordinator, args: &InsightsArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let insights = coordinator.insights(&tenant, args.limit).await?;

        match format {
            OutputFormat::Json => print_json(&insights)?,
            OutputFormat::Table => {
                if insights.is_empty() {
                    println!("No insights found.");
                    return Ok(());
                }
                let mut table = new_table(["ID", "Summary", "Importance", "Tags", "Created"]);
                for insight in &insights {
                    table.add_row([
                        truncate_string(&insight.id.to_string(), 8),
                        truncate_string(insight.summary.as_deref().unwrap_or(&insight.content), 50),
                        format!("{:.2}", insight.importance),
                        insight.tags.join(", "),
                        format_timestamp(&insight.created_at),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    async fn show(coordinator: &MemoryCoordinator, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let id = parse_record_id(&args.id)?;
        let record = coordinator
            .get(&tenant, args.kind, id)
            .await?
            .ok_or_else(|| format!("No {} found with id {id}", args.kind.label()))?;

        match format {
            OutputFormat::Json => print_json(&record)?,
            OutputFormat::Table => {
                println!("ID:       {}", record.id());
                println!("Kind:     {}", record.kind());
                println!("Type:     {}", record.content_type());
                println!("Created:  {}", format_timestamp(&record.created_at()));
                if let Some(score) = record.relevance_score() {
                    println!("Score:    {score:.2}");
                }
                if let Some(metadata) = record.metadata().filter(|m| !m.is_empty()) {
                    println!("Metadata: {}", serde_json::to_string(metadata)?);
                }
                println!("\n{}", record.content());
            }
        }
        Ok(())
    }

    async fn delete(coordinator: &MemoryCoordinator, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let tenant = parse_tenant(&args.tenant)?;
        let id = parse_record_id(&args.id)?;
        let deleted = coordinator.delete(&tenant, args.kind, id).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "id": id.to_string(),
                "kind": args.kind,
                "deleted": deleted,
            }))?,
            OutputFormat::Table if deleted => println!("Deleted {} {id}", args.kind.label()),
            OutputFormat::Table => println!("No {} found with id {id}", args.kind.label()),
        }
        Ok(())
    }
}

fn print_records(records: &[MemoryRecord], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(records)?,
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No memories found.");
                return Ok(());
            }
            let mut table = new_table(["ID", "Content", "Type", "Score", "Created"]);
            for record in records {
                table.add_row([
                    truncate_string(&record.id().to_string(), 8),
                    truncate_string(record.content(), 50),
                    record.content_type().to_string(),
                    record
                        .relevance_score()
                        .map(|s| format!("{s:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                    format_timestamp(&record.created_at()),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
