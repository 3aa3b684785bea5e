//! Configuration structure
// (c) 2024 Ross Younger

use std::time::Duration;

use human_repr::{HumanCount as _, HumanDuration as _};
use serde::{Deserialize, Serialize};

use crate::{transport::CongestionControllerType, util::HumanU64};

/// The set of configurable options supported by qbench.
///
/// **Note:** The implementation of `default()` for this struct returns qbench's hard-wired configuration defaults.
///
/// None of the members of this struct are optional. Command-line overrides are merged
/// in separately, so wherever the user does not provide a value, values read from lower priority sources
/// (configuration files and system defaults) obtain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    // TRANSPORT PARAMETERS ============================================================================
    /// The maximum network bandwidth we expect receiving data FROM the remote system,
    /// in bytes per second.
    pub rx: HumanU64,
    /// The maximum network bandwidth we expect sending data TO the remote system,
    /// if it is different from the bandwidth FROM the system. 0 means "same as `rx`".
    pub tx: HumanU64,
    /// The expected network Round Trip time to the target system, in milliseconds.
    pub rtt: u16,
    /// The congestion control algorithm to use.
    pub congestion: CongestionControllerType,
    /// The initial value for the sending congestion control window; 0 means the algorithm decides.
    pub initial_congestion_window: u64,

    // CONNECTION PARAMETERS ===========================================================================
    /// Maximum number of concurrent bidirectional streams the peer may open
    pub max_streams: u32,
    /// Idle timeout for QUIC connections, in seconds
    pub idle_timeout: u16,
    /// Keep-alive interval for QUIC connections, in seconds
    pub keepalive: u16,
    /// ALPN protocol identifier. Client and server must agree on this.
    pub alpn: String,

    // SERVER PARAMETERS ===============================================================================
    /// Interval between aggregate statistics reports from the server, in seconds
    pub report_interval: u16,
}

impl Configuration {
    /// Computes the theoretical bandwidth-delay product for outbound data
    #[must_use]
    pub fn bandwidth_delay_product_tx(&self) -> u64 {
        self.tx().saturating_mul(u64::from(self.rtt)) / 1000
    }
    /// Computes the theoretical bandwidth-delay product for inbound data
    #[must_use]
    pub fn bandwidth_delay_product_rx(&self) -> u64 {
        self.rx().saturating_mul(u64::from(self.rtt)) / 1000
    }
    #[must_use]
    /// Receive bandwidth (accessor)
    pub fn rx(&self) -> u64 {
        *self.rx
    }
    #[must_use]
    /// Transmit bandwidth (accessor)
    pub fn tx(&self) -> u64 {
        match *self.tx {
            0 => self.rx(),
            tx => tx,
        }
    }
    /// RTT accessor as Duration
    #[must_use]
    pub fn rtt_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.rtt))
    }

    /// UDP kernel sending buffer size to use
    #[must_use]
    pub fn send_buffer() -> u64 {
        // UDP kernel buffers of 2MB have proven sufficient to get close to line speed on a 300Mbit downlink with 300ms RTT.
        2_097_152
    }
    /// UDP kernel receive buffer size to use
    #[must_use]
    pub fn recv_buffer() -> u64 {
        2_097_152
    }

    /// QUIC receive window
    #[must_use]
    pub fn recv_window(&self) -> u64 {
        // The theoretical in-flight limit appears to be sufficient
        self.bandwidth_delay_product_rx()
    }

    /// QUIC send window
    #[must_use]
    pub fn send_window(&self) -> u64 {
        // There might be random added latency en route, so provide for a larger send window than theoretical.
        self.bandwidth_delay_product_tx().saturating_mul(2)
    }

    /// Accessor for `idle_timeout`, as a Duration
    #[must_use]
    pub fn idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.idle_timeout.into())
    }

    /// Accessor for `keepalive`, as a Duration
    #[must_use]
    pub fn keepalive_duration(&self) -> Duration {
        Duration::from_secs(self.keepalive.into())
    }

    /// Accessor for `report_interval`, as a Duration
    #[must_use]
    pub fn report_interval_duration(&self) -> Duration {
        Duration::from_secs(self.report_interval.into())
    }

    /// Checks for values which would make no sense at runtime
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.alpn.is_empty() {
            anyhow::bail!("alpn must not be empty");
        }
        // Either would size the QUIC flow control windows at zero, and nothing would flow
        if *self.rx == 0 {
            anyhow::bail!("rx must be greater than zero");
        }
        if self.rtt == 0 {
            anyhow::bail!("rtt must be at least 1 millisecond");
        }
        if self.keepalive == 0 {
            anyhow::bail!("keepalive must be at least 1 second");
        }
        if self.report_interval == 0 {
            anyhow::bail!("report_interval must be at least 1 second");
        }
        if self.keepalive >= self.idle_timeout {
            anyhow::bail!(
                "keepalive ({}s) must be shorter than idle_timeout ({}s)",
                self.keepalive,
                self.idle_timeout
            );
        }
        Ok(())
    }

    /// Formats the transport-related options for display
    #[must_use]
    pub fn format_transport_config(&self) -> String {
        let iwind = match self.initial_congestion_window {
            0 => "<default>".to_string(),
            s => s.human_count_bytes().to_string(),
        };
        let (tx, rx) = (self.tx(), self.rx());
        format!(
            "rx {rx} ({rxbits}), tx {tx} ({txbits}), rtt {rtt}, congestion algorithm {congestion:?} with initial window {iwind}",
            tx = tx.human_count_bytes(),
            txbits = tx.saturating_mul(8).human_count("bit"),
            rx = rx.human_count_bytes(),
            rxbits = rx.saturating_mul(8).human_count("bit"),
            rtt = self.rtt_duration().human_duration(),
            congestion = self.congestion,
        )
    }
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns qbench's hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            // Transport
            rx: 12_500_000.into(),
            tx: 0.into(),
            rtt: 300,
            congestion: CongestionControllerType::Cubic,
            initial_congestion_window: 0,

            // Connection
            max_streams: 1000,
            idle_timeout: 60,
            keepalive: 5,
            alpn: "qbench".into(),

            // Server
            report_interval: 10,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Configuration;

    #[test]
    fn flattened() {
        let v = Configuration::default();
        let j = serde_json::to_value(&v).unwrap();
        assert!(j.get("rtt").is_some());
        assert!(j.get("alpn").is_some());
        assert_eq!(j["rx"], 12_500_000);
    }

    #[test]
    fn tx_follows_rx() {
        let mut c = Configuration {
            rx: 1000.into(),
            ..Default::default()
        };
        assert_eq!(c.tx(), 1000);
        c.tx = 42.into();
        assert_eq!(c.tx(), 42);
    }

    #[test]
    fn windows() {
        let c = Configuration {
            rx: 10_000_000.into(),
            rtt: 100,
            ..Default::default()
        };
        assert_eq!(c.recv_window(), 1_000_000);
        assert_eq!(c.send_window(), 2_000_000);
    }

    #[test]
    fn defaults_are_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn keepalive_must_be_shorter_than_idle() {
        let c = Configuration {
            keepalive: 30,
            idle_timeout: 30,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_rtt_rejected() {
        let c = Configuration {
            rtt: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_rx_rejected() {
        let c = Configuration {
            rx: 0.into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
        // tx alone may be zero; it follows rx
        let c = Configuration {
            tx: 0.into(),
            ..Default::default()
        };
        c.validate().unwrap();
    }

    #[test]
    fn huge_bandwidth_saturates() {
        let c = Configuration {
            rx: 1_000_000_000_000_000.into(),
            rtt: u16::MAX,
            ..Default::default()
        };
        c.validate().unwrap();
        assert_eq!(c.recv_window(), u64::MAX / 1000);
        assert_eq!(c.send_window(), u64::MAX / 1000 * 2);
        let c = Configuration {
            rx: u64::MAX.into(),
            ..Default::default()
        };
        assert!(c.format_transport_config().contains("rtt"));
    }

    #[test]
    fn empty_alpn_rejected() {
        let c = Configuration {
            alpn: String::new(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }
}
