//! Command Line Interface for qbench
// (c) 2024 Ross Younger

mod args;
mod cli_main;
pub(crate) mod styles;

pub use cli_main::{client_cli, server_cli};
