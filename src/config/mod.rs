// (c) 2024 Ross Younger
//! # Configuration management
//!
//! qbench obtains run-time configuration from the following sources, in order of priority:
//! 1. Command-line options
//! 2. A configuration file named on the command line (`--config FILE`)
//! 3. The user's configuration file (typically `~/.qbench.toml`)
//! 4. The system-wide configuration file (typically `/etc/qbench.toml`)
//! 5. Hard-wired defaults
//!
//! Each option may appear in multiple places, but only the highest-priority value is used.
//! The same configuration files are read by both the client and the server.
//!
//! ## File format
//!
//! Configuration files are TOML. Bandwidth fields may be given as plain integers or as
//! strings with an SI suffix.
//!
//! ### Example
//!
//! ```text
//! # We have a 1Gbit LAN, and the far end is close by
//! rx = "125M"
//! rtt = 5
//! congestion = "bbr"
//! # must match on client and server
//! alpn = "qbench-lab"
//! ```
//!
//! ## Configurable options
//!
//! The full list of supported fields is defined by [Configuration].
//! `--show-config` outputs the list of fields, their current values, and where each value came from.

mod structure;
pub use structure::Configuration;

mod manager;
pub use manager::Manager;

pub(crate) const BASE_CONFIG_FILENAME: &str = "qbench.toml";
