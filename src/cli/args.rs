// qbench command-line arguments
// (c) 2024 Ross Younger

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use serde::Serialize;

use crate::{
    cert::read_certificates,
    client::{ClientJob, ServerTrust},
    server::{CredentialSource, ServerJob},
    transport::CongestionControllerType,
    util::{AddressFamily, HumanU64},
};

const HELP_TEMPLATE: &str = "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
";

/// Options common to both programs
#[derive(Debug, Clone, clap::Args)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CommonArgs {
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=qbench=trace` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"), conflicts_with("quiet"))]
    pub debug: bool,

    /// Quiet mode
    ///
    /// Switches off progress display and informational logging, which includes the
    /// server's periodic and per-connection reports. Errors and final results are still output.
    #[arg(short, long, action)]
    pub quiet: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, action, help_heading("Debug"), value_name("FILE"))]
    pub log_file: Option<PathBuf>,

    /// Reads an additional configuration file, which takes precedence over the system and user files
    #[arg(long, value_name("FILE"), help_heading("Configuration"))]
    pub config: Option<PathBuf>,

    /// Outputs the configuration, and where each setting came from, then exits
    #[arg(long, action, help_heading("Configuration"))]
    pub show_config: bool,

    /// Outputs additional information about kernel UDP buffer sizes and platform-specific tips
    #[arg(long, action, help_heading("Network tuning"), display_order(50))]
    pub help_buffers: bool,
}

impl CommonArgs {
    pub(crate) fn trace_level(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

/// Command-line overrides for [`Configuration`](crate::config::Configuration) fields.
///
/// Unset fields are not serialized, so they do not mask values from configuration files.
#[derive(Debug, Clone, Default, clap::Args, Serialize)]
pub(crate) struct ConfigOverrides {
    /// The maximum network bandwidth we expect to receive, in bytes per second.
    /// SI suffixes are accepted, e.g. `12M`.
    #[arg(long, value_name("bytes"), help_heading("Network tuning"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx: Option<HumanU64>,

    /// The maximum network bandwidth we expect to send, in bytes per second, if different from `rx`
    #[arg(long, value_name("bytes"), help_heading("Network tuning"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<HumanU64>,

    /// The expected network round trip time, in milliseconds
    #[arg(long, value_name("ms"), help_heading("Network tuning"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u16>,

    /// Congestion control algorithm
    #[arg(long, value_name("alg"), ignore_case(true), help_heading("Network tuning"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion: Option<CongestionControllerType>,

    /// Initial congestion window, in bytes (0 lets the algorithm decide)
    #[arg(long, value_name("bytes"), help_heading("Network tuning"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_congestion_window: Option<u64>,

    /// Maximum number of concurrent streams per connection
    #[arg(long, value_name("n"), help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_streams: Option<u32>,

    /// Connection idle timeout, in seconds
    #[arg(long, value_name("sec"), help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u16>,

    /// Keep-alive interval, in seconds
    #[arg(long, value_name("sec"), help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<u16>,

    /// ALPN protocol identifier; client and server must agree
    #[arg(long, value_name("id"), help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
}

/// QUIC throughput benchmark client.
///
/// Streams filler data to a qbench server for a fixed time, then reports the achieved throughput.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "qbench-client",
    author,
    version(crate::VERSION_STRING),
    about,
    long_about = None,
    infer_long_args(true),
    help_template(HELP_TEMPLATE),
    styles = super::styles::CLAP_STYLES
)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct ClientArgs {
    /// Server to connect to (hostname or address)
    #[arg(short, long, default_value("localhost"), help_heading("Benchmark"))]
    pub server: String,

    /// Server UDP port
    #[arg(short, long, default_value_t = 8888, help_heading("Benchmark"))]
    pub port: u16,

    /// Size of each write, in bytes. SI suffixes are accepted, e.g. `64k`.
    #[arg(
        short = 'b',
        long,
        default_value("1400"),
        value_name("bytes"),
        help_heading("Benchmark")
    )]
    pub size: HumanU64,

    /// Test duration, in seconds
    #[arg(
        short,
        long,
        default_value_t = 10,
        value_name("sec"),
        help_heading("Benchmark")
    )]
    pub time: u64,

    /// Outputs additional connection statistics after the run
    #[arg(long, alias("stats"), action, conflicts_with("quiet"))]
    pub statistics: bool,

    /// Forces IPv4 connection [default: autodetect]
    #[arg(short = '4', long, action, help_heading("Connection"))]
    pub ipv4: bool,
    /// Forces IPv6 connection [default: autodetect]
    #[arg(
        short = '6',
        long,
        action,
        conflicts_with("ipv4"),
        help_heading("Connection")
    )]
    pub ipv6: bool,

    /// Verifies the server against this PEM certificate.
    ///
    /// By default the server's certificate is not verified.
    #[arg(long, value_name("FILE"), help_heading("Connection"))]
    pub server_cert: Option<PathBuf>,

    /// TLS server name to request [default: the server host]
    #[arg(long, value_name("name"), help_heading("Connection"))]
    pub server_name: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl ClientArgs {
    pub(crate) fn address_family(&self) -> AddressFamily {
        if self.ipv4 {
            AddressFamily::IPv4
        } else if self.ipv6 {
            AddressFamily::IPv6
        } else {
            AddressFamily::Any
        }
    }

    /// Converts the arguments into a job. Reads the server certificate, if one was given.
    pub(crate) fn job(&self) -> anyhow::Result<ClientJob> {
        let size = self.size.to_usize().context("--size")?;
        if size == 0 {
            anyhow::bail!("--size must be at least 1 byte");
        }
        let trust = match &self.server_cert {
            Some(path) => ServerTrust::Pinned(read_certificates(path)?),
            None => ServerTrust::Insecure,
        };
        Ok(ClientJob {
            size,
            duration: Duration::from_secs(self.time),
            address_family: self.address_family(),
            server_name: self.server_name.clone(),
            trust,
            statistics: self.statistics,
            ..ClientJob::new(&self.server, self.port)
        })
    }
}

/// QUIC throughput benchmark server.
///
/// Accepts connections from qbench clients and measures the data they send.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "qbench-server",
    author,
    version(crate::VERSION_STRING),
    about,
    long_about = None,
    infer_long_args(true),
    help_template(HELP_TEMPLATE),
    styles = super::styles::CLAP_STYLES
)]
pub(crate) struct ServerArgs {
    /// Address and UDP port to listen on
    #[arg(long, default_value(ServerJob::DEFAULT_LISTEN), value_name("ADDR:PORT"))]
    pub listen: SocketAddr,

    /// PEM certificate (chain) file
    #[arg(
        long,
        default_value("./server.cert"),
        value_name("FILE"),
        conflicts_with("self_signed")
    )]
    pub cert: PathBuf,

    /// PEM private key file
    #[arg(
        long,
        default_value("./server.key"),
        value_name("FILE"),
        conflicts_with("self_signed")
    )]
    pub key: PathBuf,

    /// Generates an ephemeral self-signed certificate instead of reading one
    #[arg(long, action)]
    pub self_signed: bool,

    /// Interval between statistics reports, in seconds
    #[arg(long, value_name("sec"))]
    pub report_interval: Option<u16>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl ServerArgs {
    pub(crate) fn job(&self) -> ServerJob {
        let credentials = if self.self_signed {
            CredentialSource::SelfSigned
        } else {
            CredentialSource::Files {
                cert: self.cert.clone(),
                key: self.key.clone(),
            }
        };
        ServerJob {
            listen: self.listen,
            credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::{ClientArgs, ServerArgs};
    use crate::{
        client::ServerTrust,
        server::CredentialSource,
        transport::CongestionControllerType,
        util::{make_test_tempfile, AddressFamily},
    };

    #[test]
    fn client_defaults() {
        let args = ClientArgs::try_parse_from(["qbench-client"]).unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.host, "localhost");
        assert_eq!(job.port, 8888);
        assert_eq!(job.size, 1400);
        assert_eq!(job.duration, Duration::from_secs(10));
        assert_eq!(job.address_family, AddressFamily::Any);
        assert_eq!(job.trust, ServerTrust::Insecure);
    }

    #[test]
    fn client_flags() {
        let args = ClientArgs::try_parse_from([
            "qbench-client",
            "-s",
            "bench.example",
            "-p",
            "4433",
            "-b",
            "64k",
            "-t",
            "3",
            "-4",
            "--congestion",
            "BBR",
        ])
        .unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.host, "bench.example");
        assert_eq!(job.port, 4433);
        assert_eq!(job.size, 64_000);
        assert_eq!(job.duration, Duration::from_secs(3));
        assert_eq!(job.address_family, AddressFamily::IPv4);
        assert_eq!(
            args.overrides.congestion,
            Some(CongestionControllerType::Bbr)
        );
    }

    #[test]
    fn zero_size_rejected() {
        let args = ClientArgs::try_parse_from(["qbench-client", "-b", "0"]).unwrap();
        assert!(args.job().is_err());
    }

    #[test]
    fn family_conflict() {
        assert!(ClientArgs::try_parse_from(["qbench-client", "-4", "-6"]).is_err());
    }

    #[test]
    fn pinned_certificate() {
        let raw = rcgen::generate_simple_self_signed(["bench.example".to_string()]).unwrap();
        let (path, _dir) = make_test_tempfile(&raw.cert.pem(), "server.cert");
        let path = path.to_string_lossy().to_string();
        let args =
            ClientArgs::try_parse_from(["qbench-client", "--server-cert", &path]).unwrap();
        let job = args.job().unwrap();
        assert!(matches!(job.trust, ServerTrust::Pinned(ref v) if v.len() == 1));
    }

    #[test]
    fn server_defaults() {
        let args = ServerArgs::try_parse_from(["qbench-server"]).unwrap();
        let job = args.job();
        assert_eq!(job.listen.to_string(), "0.0.0.0:8888");
        assert_eq!(
            job.credentials,
            CredentialSource::Files {
                cert: "./server.cert".into(),
                key: "./server.key".into()
            }
        );
    }

    #[test]
    fn server_self_signed() {
        let args = ServerArgs::try_parse_from(["qbench-server", "--self-signed"]).unwrap();
        assert_eq!(args.job().credentials, CredentialSource::SelfSigned);
        assert!(
            ServerArgs::try_parse_from(["qbench-server", "--self-signed", "--cert", "x"]).is_err()
        );
    }

    #[test]
    fn overrides_serialize_sparsely() {
        let args = ClientArgs::try_parse_from(["qbench-client", "--rtt", "50"]).unwrap();
        let json = serde_json::to_string(&args.overrides).unwrap();
        assert_eq!(json, r#"{"rtt":50}"#);
    }
}
