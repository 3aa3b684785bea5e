//! qbench server
// (c) 2024 Ross Younger

pub mod handler;
mod main_loop;
pub mod reporter;
pub mod stats;

pub use main_loop::{server_main, CredentialSource, Server, ServerJob};
pub use stats::{ServerStats, StatsSnapshot};
