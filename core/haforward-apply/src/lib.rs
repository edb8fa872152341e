//! Receiving side of cross-node forwarding.
//!
//! This crate provides:
//! - Host collaborator traits the apply path mutates local state through
//! - [`InFlightSet`], the per-handler guard against duplicate concurrent applies
//! - The [`staleness`] check gating forwarded change re-indexes
//! - One handler per command kind, and [`CommandDispatcher`] routing decoded
//!   commands to them with the forwarded flag set
//! - The [`catchup`] scheduler re-driving the apply path for missed updates

mod cache;
pub mod catchup;
mod change;
mod config;
mod dispatcher;
mod entity;
mod error;
mod event;
mod handler;
mod host;
mod inflight;
mod project_list;
pub mod staleness;

pub use cache::CacheEvictionHandler;
pub use catchup::{AutoReindexScheduler, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use change::ChangeIndexHandler;
pub use config::{ApplyConfig, AutoReindexConfig};
pub use dispatcher::{ApplyHosts, CommandDispatcher};
pub use entity::EntityIndexHandler;
pub use error::{ApplyError, ApplyResult, HostError, HostResult};
pub use event::EventHandler;
pub use host::{
    CacheHost, ChangeStateReader, EntityScanner, EventHost, IndexHost, ModifiedEntity,
    ProjectListHost,
};
pub use inflight::{InFlightGuard, InFlightSet};
pub use project_list::ProjectListHandler;
pub use staleness::StalenessChecker;
