// OS abstraction layer for qbench - Unix implementation
// (c) 2024 Ross Younger

use super::{AbstractPlatform, SocketOptions};
use crate::config::BASE_CONFIG_FILENAME;

use anyhow::Result;
use nix::sys::socket::{self, sockopt};
use std::{net::UdpSocket, path::PathBuf};

fn bsdish() -> bool {
    cfg!(any(
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "freebsd",
        target_os = "macos"
    ))
}

#[cfg(target_os = "linux")]
const KERNEL_DIVISOR: usize = 2;
#[cfg(not(target_os = "linux"))]
const KERNEL_DIVISOR: usize = 1;

impl SocketOptions for UdpSocket {
    fn get_sendbuf(&self) -> Result<usize> {
        Ok(socket::getsockopt(self, sockopt::SndBuf)? / KERNEL_DIVISOR)
    }

    fn set_sendbuf(&mut self, size: usize) -> Result<()> {
        socket::setsockopt(self, sockopt::SndBuf, &size)?;
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn force_sendbuf(&mut self, size: usize) -> Result<()> {
        socket::setsockopt(self, sockopt::SndBufForce, &size)?;
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn force_sendbuf(&mut self, _size: usize) -> Result<()> {
        anyhow::bail!("SO_SNDBUFFORCE is not supported on this platform")
    }

    fn get_recvbuf(&self) -> Result<usize> {
        Ok(socket::getsockopt(self, sockopt::RcvBuf)? / KERNEL_DIVISOR)
    }

    fn set_recvbuf(&mut self, size: usize) -> Result<()> {
        socket::setsockopt(self, sockopt::RcvBuf, &size)?;
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn force_recvbuf(&mut self, size: usize) -> Result<()> {
        socket::setsockopt(self, sockopt::RcvBufForce, &size)?;
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn force_recvbuf(&mut self, _size: usize) -> Result<()> {
        anyhow::bail!("SO_RCVBUFFORCE is not supported on this platform")
    }
}

#[derive(Debug, Clone, Copy)]
/// OS abstraction layer for Unix-like platforms
pub struct Platform {}

impl AbstractPlatform for Platform {
    fn print_udp_buffer_size_help_message(rmem: u64, wmem: u64) {
        println!(
            r"For best performance, it is necessary to set the kernel UDP buffer size limits.
This program attempts to automatically set buffer sizes for itself,
but this requires elevated privileges."
        );

        if bsdish() {
            // Received wisdom about BSD kernels leads me to recommend 115% of the max. I'm not sure this is necessary.
            let size = std::cmp::max(rmem, wmem) * 115 / 100;
            println!(
                r"
To set the kernel limits immediately, run the following command as root:
    sysctl -w kern.ipc.maxsockbuf={size}
To have this setting apply at boot, add this line to /etc/sysctl.conf:
    kern.ipc.maxsockbuf={size}
            "
            );
        } else {
            println!(
                r"
To set the kernel limits immediately, run the following command as root:
    sysctl -w net.core.rmem_max={rmem} -w net.core.wmem_max={wmem}

To have this setting apply at boot, on most Linux distributions you
can create a file /etc/sysctl.d/60-qbench.conf containing:
    net.core.rmem_max={rmem}
    net.core.wmem_max={wmem}
"
            );
        }
    }

    fn user_config_dir() -> Option<PathBuf> {
        // home directory for now
        dirs::home_dir()
    }

    fn user_config_path() -> Option<PathBuf> {
        // ~/.<filename> for now
        let mut d = Self::user_config_dir()?;
        d.push(format!(".{BASE_CONFIG_FILENAME}"));
        Some(d)
    }

    fn system_config_path() -> Option<PathBuf> {
        // /etc/<filename> for now
        let mut p = PathBuf::from("/etc");
        p.push(BASE_CONFIG_FILENAME);
        Some(p)
    }
}
