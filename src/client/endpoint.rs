// qbench client endpoint setup
// (c) 2024 Ross Younger

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as _, Result};
use quinn::{
    crypto::rustls::QuicClientConfig,
    rustls::{
        self,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::CryptoProvider,
        pki_types::{CertificateDer, ServerName, UnixTime},
        DigitallySignedStruct, RootCertStore, SignatureScheme,
    },
    EndpointConfig,
};
use tracing::{span, trace, warn, Level};

use super::job::{ClientJob, ServerTrust};
use crate::{
    config::Configuration,
    transport::{create_config, ThroughputMode},
    util::socket::{bind_unspecified_for, set_udp_buffer_sizes},
};

/// Accepts any server certificate, while still checking handshake signatures
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl SkipServerVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self(Arc::new(rustls::crypto::ring::default_provider())))
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn tls_config(trust: &ServerTrust) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13])?;
    let config = match trust {
        ServerTrust::Insecure => {
            warn!("Server certificate will not be verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(SkipServerVerification::new())
                .with_no_client_auth()
        }
        ServerTrust::Pinned(certs) => {
            let mut root_store = RootCertStore::empty();
            for c in certs {
                root_store
                    .add(c.clone())
                    .context("adding server certificate to trust store")?;
            }
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
    };
    Ok(config)
}

/// Creates the client endpoint, bound to an ephemeral port of the right address family for `server_addr`
pub(crate) fn create_endpoint(
    server_addr: &SocketAddr,
    job: &ClientJob,
    config: &Configuration,
) -> Result<quinn::Endpoint> {
    let _span = span!(Level::TRACE, "create_endpoint").entered();
    let mut tls = tls_config(&job.trust)?;
    tls.alpn_protocols = vec![config.alpn.as_bytes().to_vec()];
    tls.enable_early_data = true;

    let mut client_config =
        quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(Arc::new(tls))?));
    let _ = client_config.transport_config(create_config(config, ThroughputMode::Tx)?);

    trace!("bind & configure socket");
    let mut socket = bind_unspecified_for(server_addr)?;
    let _ = set_udp_buffer_sizes(
        &mut socket,
        Some(Configuration::send_buffer().try_into()?),
        None,
    )?;

    let runtime =
        quinn::default_runtime().ok_or_else(|| anyhow::anyhow!("no async runtime found"))?;
    let mut endpoint = quinn::Endpoint::new(EndpointConfig::default(), None, socket, runtime)?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}
