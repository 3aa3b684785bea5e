//! OS abstraction layer
// (c) 2024 Ross Younger

use std::path::PathBuf;

use anyhow::Result;

/// OS abstraction trait providing access to socket options
pub trait SocketOptions {
    /// Wrapper for getsockopt `SO_SNDBUF`.
    /// On Linux, this call halves the number returned from the kernel.
    /// This takes account of kernel behaviour: the internal buffer
    /// allocation is _double_ the size you set with setsockopt,
    /// and getsockopt returns the doubled value.
    fn get_sendbuf(&self) -> Result<usize>;
    /// Wrapper for setsockopt `SO_SNDBUF`
    fn set_sendbuf(&mut self, size: usize) -> Result<()>;
    /// Wrapper for setsockopt `SO_SNDBUFFORCE` (where available; will error if not supported on system)
    fn force_sendbuf(&mut self, size: usize) -> Result<()>;

    /// Wrapper for getsockopt `SO_RCVBUF`.
    /// On Linux, this call halves the number returned from the kernel.
    fn get_recvbuf(&self) -> Result<usize>;
    /// Wrapper for setsockopt `SO_RCVBUF`
    fn set_recvbuf(&mut self, size: usize) -> Result<()>;
    /// Wrapper for setsockopt `SO_RCVBUFFORCE` (where available; will error if not supported on system)
    fn force_recvbuf(&mut self, size: usize) -> Result<()>;
}

/// General platform abstraction trait.
/// The active implementation is re-exported from this module as `Platform`.
///
/// Usage:
/// ```
///    use qbench::os::Platform;
///    use qbench::os::AbstractPlatform as _;
///    println!("{:?}", Platform::system_config_path());
/// ```
pub trait AbstractPlatform {
    /// Outputs helpful information for the sysadmin about kernel UDP buffer limits
    fn print_udp_buffer_size_help_message(rmem: u64, wmem: u64);

    /// The directory to store user configuration files in.
    ///
    /// On Unix platforms this is the traditional home directory.
    ///
    /// If somehow we could not determine the directory to use, returns None.
    fn user_config_dir() -> Option<PathBuf>;

    /// The absolute path to the user configuration file, if one is defined on this platform.
    fn user_config_path() -> Option<PathBuf>;

    /// The absolute path to the system configuration file, if one is defined on this platform.
    fn system_config_path() -> Option<PathBuf>;
}

#[cfg(any(unix, doc))]
mod unix;

#[cfg(any(unix, doc))]
pub use unix::Platform;

static_assertions::assert_cfg!(unix, "This OS is not yet supported");
