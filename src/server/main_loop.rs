// qbench server event loop
// (c) 2024 Ross Younger

use std::{
    net::{SocketAddr, UdpSocket},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context as _, Result};
use human_repr::HumanDuration as _;
use quinn::{crypto::rustls::QuicServerConfig, rustls, EndpointConfig};
use tokio::{task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument as _};

use super::{
    handler::handle_connection,
    reporter::run_reporter,
    stats::{ServerStats, StatsSnapshot},
};
use crate::{
    cert::Credentials,
    config::Configuration,
    transport::{create_config, ThroughputMode},
    util::{backoff::ExponentialBackoff, socket::set_udp_buffer_sizes},
};

/// Bound on the wait for connection handlers, and then the endpoint, at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the server's TLS credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// PEM certificate chain and private key files
    Files {
        /// Certificate chain file
        cert: PathBuf,
        /// Private key file
        key: PathBuf,
    },
    /// Ephemeral self-signed certificate, generated at startup
    SelfSigned,
}

impl CredentialSource {
    /// Loads or generates the credentials
    pub fn load(&self) -> Result<Credentials> {
        match self {
            CredentialSource::Files { cert, key } => Credentials::from_pem_files(cert, key),
            CredentialSource::SelfSigned => Credentials::generate(),
        }
    }
}

/// Server run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerJob {
    /// Address and port to listen on
    pub listen: SocketAddr,
    /// TLS credentials
    pub credentials: CredentialSource,
}

impl ServerJob {
    /// Default listen address
    pub const DEFAULT_LISTEN: &'static str = "0.0.0.0:8888";
}

/// A bound, not yet running, benchmark server
#[derive(Debug)]
pub struct Server {
    endpoint: quinn::Endpoint,
    stats: Arc<ServerStats>,
    report_interval: Duration,
}

fn server_config(credentials: &Credentials, config: &Configuration) -> Result<quinn::ServerConfig> {
    let mut tls_config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13])?
    .with_no_client_auth()
    .with_single_cert(credentials.cert_chain(), credentials.private_key())
    .context("server certificate and key are not usable")?;
    // N.B.: in ServerConfig docs, max_early_data_size should be set to u32::MAX
    tls_config.max_early_data_size = u32::MAX;
    tls_config.alpn_protocols = vec![config.alpn.as_bytes().to_vec()];

    let qsc = QuicServerConfig::try_from(tls_config)?;
    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(qsc));
    let _ = server_config.transport_config(create_config(config, ThroughputMode::Rx)?);
    Ok(server_config)
}

impl Server {
    /// Binds the listening endpoint
    pub fn bind(
        listen: SocketAddr,
        credentials: &Credentials,
        config: &Configuration,
    ) -> Result<Self> {
        let server_config = server_config(credentials, config)?;
        let mut socket =
            UdpSocket::bind(listen).with_context(|| format!("failed to listen on {listen}"))?;
        let _ = set_udp_buffer_sizes(
            &mut socket,
            None,
            Some(Configuration::recv_buffer().try_into()?),
        )?;
        let runtime =
            quinn::default_runtime().ok_or_else(|| anyhow::anyhow!("no async runtime found"))?;
        let endpoint =
            quinn::Endpoint::new(EndpointConfig::default(), Some(server_config), socket, runtime)?;
        Ok(Self {
            endpoint,
            stats: Arc::new(ServerStats::default()),
            report_interval: config.report_interval_duration(),
        })
    }

    /// The address we actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Shared statistics
    #[must_use]
    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Accepts connections until `cancel` fires (or the endpoint closes), then shuts down.
    ///
    /// Returns the final totals.
    pub async fn run(self, cancel: CancellationToken) -> StatsSnapshot {
        // Everything we spawn stops when we do, whatever the reason
        let shutdown = cancel.child_token();
        let reporter = tokio::spawn(run_reporter(
            self.stats.clone(),
            self.report_interval,
            shutdown.clone(),
            |s| info!("{s}"),
        ));

        let mut tasks = JoinSet::new();
        let mut backoff = ExponentialBackoff::default();
        loop {
            let incoming = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                i = self.endpoint.accept() => i,
            };
            let Some(incoming) = incoming else {
                info!("Endpoint closed");
                break;
            };
            match incoming.accept() {
                Ok(connecting) => {
                    backoff.reset();
                    let id = self.stats.register_connection();
                    trace!("spawning handler for connection {id}");
                    let _ = tasks.spawn(
                        handle_connection(connecting, id, self.stats.clone(), shutdown.clone())
                            .instrument(tracing::trace_span!("conn", id)),
                    );
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "failed to accept connection: {e}; retrying in {}",
                        delay.human_duration()
                    );
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => (),
                    }
                }
            }
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    warn!("connection handler failed: {e}");
                }
            }
        }

        // Closedown ----------------------
        debug!("shutting down");
        shutdown.cancel();
        self.endpoint.close(0u32.into(), b"server shutting down");
        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!("connection handler failed: {e}");
                }
            }
        };
        if timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!("connection handlers did not finish in time");
        }
        let _ = reporter.await;
        let _ = timeout(SHUTDOWN_TIMEOUT, self.endpoint.wait_idle())
            .await
            .inspect_err(|_| warn!("QUIC shutdown timed out"));
        let totals = self.stats.snapshot();
        debug!("final {totals}");
        totals
    }
}

/// Server entrypoint: loads credentials, binds and runs until cancelled
pub async fn server_main(
    job: &ServerJob,
    config: &Configuration,
    cancel: CancellationToken,
) -> Result<StatsSnapshot> {
    let credentials = job.credentials.load()?;
    let server = Server::bind(job.listen, &credentials, config)?;
    info!("Listening on {}", server.local_addr()?);
    Ok(server.run(cancel).await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{CredentialSource, Server, ServerJob};
    use crate::{cert::Credentials, config::Configuration};

    #[test]
    fn default_listen_parses() {
        let _: std::net::SocketAddr = ServerJob::DEFAULT_LISTEN.parse().unwrap();
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let src = CredentialSource::Files {
            cert: "/nonexistent/server.cert".into(),
            key: "/nonexistent/server.key".into(),
        };
        assert!(src.load().is_err());
        assert!(CredentialSource::SelfSigned.load().is_ok());
    }

    #[tokio::test]
    async fn bind_and_cancel() {
        let creds = Credentials::generate().unwrap();
        let server = Server::bind(
            "127.0.0.1:0".parse().unwrap(),
            &creds,
            &Configuration::default(),
        )
        .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run(cancel.clone()));
        cancel.cancel();
        let totals = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(totals.connections, 0);
        assert_eq!(totals.bytes_received, 0);
    }
}
