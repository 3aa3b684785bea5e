//! QUIC transport configuration
// (c) 2024 Ross Younger

use std::{str::FromStr, sync::Arc};

use anyhow::Result;
use human_repr::{HumanCount as _, HumanDuration as _};
use quinn::{
    congestion::{BbrConfig, CubicConfig},
    IdleTimeout, TransportConfig,
};
use serde::{de, Deserialize, Serialize};
use strum::VariantNames;
use tracing::debug;

use crate::config::Configuration;

/// Specifies whether to configure to maximise transmission throughput or receive throughput.
/// The client only sends; the server only receives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThroughputMode {
    /// We expect to send a lot but not receive
    Tx,
    /// We expect to receive a lot but not send much
    Rx,
}

/// Selects the congestion control algorithm to use
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")] // N.B. this applies to EnumString, not Display
pub enum CongestionControllerType {
    /// The congestion algorithm TCP uses. This is good for most cases.
    Cubic,
    /// (Use with caution!) An experimental algorithm created by Google,
    /// which increases goodput in some situations
    /// (particularly long and fat connections where the intervening
    /// buffers are shallow). However this comes at the cost of having
    /// more data in-flight, and much greater packet retransmission.
    Bbr,
}

impl<'de> Deserialize<'de> for CongestionControllerType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_ascii_lowercase();
        // requires strum::EnumString && strum::VariantNames && #[strum(serialize_all = "lowercase")]
        FromStr::from_str(&lower)
            .map_err(|_| de::Error::unknown_variant(&s, CongestionControllerType::VARIANTS))
    }
}

/// Creates a `quinn::TransportConfig` for the endpoint setup
pub fn create_config(params: &Configuration, mode: ThroughputMode) -> Result<Arc<TransportConfig>> {
    let mut config = TransportConfig::default();
    let _ = config
        .max_concurrent_bidi_streams(params.max_streams.into())
        .max_concurrent_uni_streams(0u8.into())
        .keep_alive_interval(Some(params.keepalive_duration()))
        .max_idle_timeout(Some(IdleTimeout::try_from(
            params.idle_timeout_duration(),
        )?))
        .allow_spin(true);

    match mode {
        ThroughputMode::Tx => {
            let _ = config
                .send_window(params.send_window())
                .datagram_send_buffer_size(Configuration::send_buffer().try_into()?);
        }
        ThroughputMode::Rx => {
            let _ = config
                .stream_receive_window(params.recv_window().try_into()?)
                .datagram_receive_buffer_size(Some(Configuration::recv_buffer().try_into()?));
        }
    }

    let window = params.initial_congestion_window;
    match params.congestion {
        CongestionControllerType::Cubic => {
            let mut cubic = CubicConfig::default();
            if window != 0 {
                let _ = cubic.initial_window(window);
            }
            let _ = config.congestion_controller_factory(Arc::new(cubic));
        }
        CongestionControllerType::Bbr => {
            let mut bbr = BbrConfig::default();
            if window != 0 {
                let _ = bbr.initial_window(window);
            }
            let _ = config.congestion_controller_factory(Arc::new(bbr));
        }
    }

    debug!(
        "Network configuration: {}",
        params.format_transport_config()
    );
    debug!(
        "Connection configuration: max streams {ms}, idle timeout {it}, keepalive {ka}",
        ms = params.max_streams,
        it = params.idle_timeout_duration().human_duration(),
        ka = params.keepalive_duration().human_duration(),
    );
    debug!(
        "Buffer configuration: send window {sw}, buffer {sb}; recv window {rw}, buffer {rb}",
        sw = params.send_window().human_count_bytes(),
        sb = Configuration::send_buffer().human_count_bytes(),
        rw = params.recv_window().human_count_bytes(),
        rb = Configuration::recv_buffer().human_count_bytes()
    );

    Ok(config.into())
}
