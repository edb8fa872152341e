//! Node-level glue for cross-node forwarding: the HTTP receiver and the
//! configuration document shared by every component of one instance.

mod config;
mod server;

pub use config::HaConfig;
pub use server::{build_router, status_for};
