// Statistics processing and output
// (c) 2024 Ross Younger

use human_repr::{HumanCount as _, HumanDuration as _, HumanThroughput as _};
use quinn::ConnectionStats;
use std::{fmt::Display, time::Duration};
use tracing::{info, warn};

/// Human friendly output helper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRate {
    /// Bytes per second; if None, we were unable to compute a rate.
    rate: Option<f64>,
}

impl DataRate {
    /// Computes a rate from a byte count and an elapsed time
    #[must_use]
    pub fn new(bytes: u64, time: Duration) -> Self {
        if time.is_zero() || bytes == 0 {
            return Self { rate: None };
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = (bytes as f64) / time.as_secs_f64();
        Self { rate: Some(rate) }
    }

    /// Bytes per second, if known
    #[must_use]
    pub fn byte_rate(&self) -> Option<f64> {
        self.rate
    }

    /// Decimal megabits per second.
    ///
    /// Yields exactly 0.0 when no rate could be computed.
    #[must_use]
    pub fn megabit_rate(&self) -> f64 {
        self.rate.map_or(0.0, |r| r * 8. / 1_000_000.)
    }
}

impl Display for DataRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.byte_rate() {
            None => f.write_str("unknown"),
            Some(rate) => rate.human_throughput_bytes().fmt(f),
        }
    }
}

/// Logs the interesting parts of a QUIC connection's statistics.
///
/// Loss and congestion are always worth a warning; the rest is reported only when `verbose`.
pub(crate) fn output_statistics(stats: &ConnectionStats, payload_bytes: u64, verbose: bool) {
    if stats.path.congestion_events > 0 {
        warn!(
            "Congestion events: {}",
            stats.path.congestion_events.human_count_bare()
        );
    }
    if stats.path.lost_packets > 0 {
        warn!(
            "Lost packets: {} ({})",
            stats.path.lost_packets.human_count_bare(),
            stats.path.lost_bytes.human_count_bytes()
        );
    }
    if !verbose {
        return;
    }
    info!("Sent packets: {}", stats.path.sent_packets);
    info!(
        "Path MTU {}, round-trip time {}",
        stats.path.current_mtu,
        stats.path.rtt.human_duration()
    );
    info!(
        "{} datagrams sent, {} received",
        stats.udp_tx.datagrams.human_count_bare(),
        stats.udp_rx.datagrams.human_count_bare()
    );
    let total_bytes = stats.udp_tx.bytes + stats.udp_rx.bytes;
    if payload_bytes != 0 {
        #[allow(clippy::cast_precision_loss)]
        let overhead_pct =
            100. * (total_bytes.saturating_sub(payload_bytes)) as f64 / payload_bytes as f64;
        info!(
            "{total_bytes} total bytes transferred for {payload_bytes} bytes payload ({overhead_pct:.2}% overhead)"
        );
    }
}
