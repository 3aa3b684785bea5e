// qbench client job description
// (c) 2024 Ross Younger

use std::time::Duration;

use rustls_pki_types::CertificateDer;

use crate::util::AddressFamily;

/// How the client decides whether to trust the server's certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTrust {
    /// Accept whatever certificate the server presents.
    /// Benchmark servers usually run with throwaway credentials.
    Insecure,
    /// Require the server to present this certificate
    Pinned(Vec<CertificateDer<'static>>),
}

/// Everything the client needs to know to carry out one benchmark run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientJob {
    /// Server hostname or address
    pub host: String,
    /// Server UDP port
    pub port: u16,
    /// Size of each write, in bytes
    pub size: usize,
    /// How long to send for
    pub duration: Duration,
    /// Restricts DNS resolution of `host`
    pub address_family: AddressFamily,
    /// Name to present in TLS SNI; defaults to `host`
    pub server_name: Option<String>,
    /// Server certificate trust mode
    pub trust: ServerTrust,
    /// Print detailed connection statistics after the run
    pub statistics: bool,
}

impl ClientJob {
    /// Default packet size
    pub const DEFAULT_SIZE: usize = 1400;
    /// Default run time
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

    /// Creates a job with default size, duration and trust settings
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            size: Self::DEFAULT_SIZE,
            duration: Self::DEFAULT_DURATION,
            address_family: AddressFamily::Any,
            server_name: None,
            trust: ServerTrust::Insecure,
            statistics: false,
        }
    }

    /// The TLS server name to use when connecting
    #[must_use]
    pub fn tls_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }
}
