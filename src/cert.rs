// X509 certificate management
// (c) 2024 Ross Younger

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context as _, Result};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// In-memory representation of X509 credentials (for TLS)
#[derive(Debug)]
pub struct Credentials {
    /// X509 certificate chain, leaf first
    pub chain: Vec<CertificateDer<'static>>,
    /// Keypair the leaf certificate relates to
    pub keypair: PrivateKeyDer<'static>,
}

impl Credentials {
    /// Creates an ephemeral self-signed certificate for the local hostname
    pub fn generate() -> Result<Self> {
        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or("unknown.host.invalid".to_string());
        tracing::trace!("Creating certificate with hostname {hostname}");
        let raw = rcgen::generate_simple_self_signed([hostname, "localhost".to_string()])?;
        Ok(Credentials {
            chain: vec![raw.cert.der().clone()],
            keypair: PrivateKeyDer::Pkcs8(raw.key_pair.serialize_der().into()),
        })
    }

    /// Reads a PEM certificate chain and a PEM private key
    pub fn from_pem_files(cert: &Path, key: &Path) -> Result<Self> {
        let chain = read_certificates(cert)?;
        let mut reader = BufReader::new(
            File::open(key).with_context(|| format!("opening key file {}", key.display()))?,
        );
        let keypair = rustls_pemfile::private_key(&mut reader)
            .with_context(|| format!("reading key file {}", key.display()))?
            .with_context(|| format!("no private key found in {}", key.display()))?;
        Ok(Self { chain, keypair })
    }

    /// Cloning accessor
    #[must_use]
    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        self.chain.clone()
    }

    /// Cloning accessor for the key
    #[must_use]
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.keypair.clone_key()
    }
}

/// Reads all certificates from a PEM file. It is an error for there to be none.
pub fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(
        File::open(path)
            .with_context(|| format!("opening certificate file {}", path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificate file {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::{read_certificates, Credentials};
    use crate::util::make_test_tempfile;

    #[test]
    fn generate_works() {
        let c = Credentials::generate().unwrap();
        assert_eq!(c.cert_chain().len(), 1);
    }

    #[test]
    fn pem_round_trip() {
        let raw = rcgen::generate_simple_self_signed(["bench.example".to_string()]).unwrap();
        let (cert, _d1) = make_test_tempfile(&raw.cert.pem(), "server.cert");
        let (key, _d2) = make_test_tempfile(&raw.key_pair.serialize_pem(), "server.key");
        let creds = Credentials::from_pem_files(&cert, &key).unwrap();
        assert_eq!(creds.chain[0].as_ref(), raw.cert.der().as_ref());
        assert_eq!(
            creds.private_key().secret_der(),
            raw.key_pair.serialize_der().as_slice()
        );
    }

    #[test]
    fn missing_files() {
        let err = Credentials::from_pem_files(
            "/no/such/server.cert".as_ref(),
            "/no/such/server.key".as_ref(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("server.cert"));
    }

    #[test]
    fn not_a_certificate() {
        let (path, _dir) = make_test_tempfile("hello world\n", "server.cert");
        let err = read_certificates(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn key_missing_from_file() {
        let raw = rcgen::generate_simple_self_signed(["bench.example".to_string()]).unwrap();
        let (cert, _d1) = make_test_tempfile(&raw.cert.pem(), "server.cert");
        let (key, _d2) = make_test_tempfile(&raw.cert.pem(), "server.key");
        let err = Credentials::from_pem_files(&cert, &key).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }
}
