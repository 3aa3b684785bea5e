//! QUIC throughput benchmark: client & server library
// (c) 2024 Ross Younger

//! The client ([`client`]) opens one QUIC connection and one stream to a server,
//! writes filler data as fast as the stream will take it for a fixed time, and reports the
//! throughput it achieved.
//!
//! The server ([`server`]) accepts any number of concurrent connections, reads and discards
//! their data, and keeps per-connection and global byte counts which it reports periodically.

/// X509 certificate helpers
pub mod cert;
mod cli;
pub use cli::{client_cli, server_cli};
pub mod client;
pub mod config;
pub mod os;
pub mod server;
pub mod transport;
pub mod util;

/// Version string, as determined at build time
pub const VERSION_STRING: &str = env!("QBENCH_VERSION_STRING");
