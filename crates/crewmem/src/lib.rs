//! crewmem - Multi-tier semantic memory for AI agent crews
//!
//! Each tenant (a crew or workspace) gets three isolated stores: short-term
//! conversational memory, long-term consolidated knowledge, and an entity
//! graph. The [`MemoryCoordinator`] is the single entry point; the
//! [`MemoryScheduler`] runs periodic cleanup and consolidation.

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use adapter::{AdapterItem, CrewMemoryAdapter};
pub use coordinator::MemoryCoordinator;
pub use error::{CrewMemError, Result};
pub use memory::types::{MemoryKind, TenantId};
pub use scheduler::MemoryScheduler;
