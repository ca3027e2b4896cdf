pub mod config;
pub mod entity;
pub mod maintenance;
pub mod memory;
pub mod stats;

pub use config::ConfigCommand;
pub use entity::EntityCommand;
pub use maintenance::{CleanupCommand, ClearCommand, ConsolidateCommand};
pub use memory::MemoryCommand;
pub use stats::StatsCommand;

use crewmem::TenantId;

use crate::error::CliResult;

pub(crate) fn parse_tenant(raw: &str) -> CliResult<TenantId> {
    Ok(TenantId::new(raw)?)
}
