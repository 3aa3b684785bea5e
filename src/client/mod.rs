//! qbench client
// (c) 2024 Ross Younger

mod endpoint;
pub mod job;
mod main_loop;
mod meter;
pub mod sender;

pub use job::{ClientJob, ServerTrust};
pub use main_loop::client_main;
pub use sender::SendReport;
