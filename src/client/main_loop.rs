// qbench client event loop
// (c) 2024 Ross Younger

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context as _, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, trace_span, warn, Instrument as _};

use super::{
    endpoint::create_endpoint,
    job::ClientJob,
    meter::InstaMeterRunner,
    sender::{filler_packet, send_loop, SendReport},
};
use crate::{config::Configuration, util::lookup_host_by_family};

/// How long we wait for the server to acknowledge the end of the stream, and for the endpoint to drain
const CLOSEDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} sent; {msg}";

fn progress_bar_for(display: &MultiProgress, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = display.add(
        ProgressBar::new_spinner().with_style(ProgressStyle::with_template(SPINNER_TEMPLATE)?),
    );
    bar.enable_steady_tick(Duration::from_millis(150));
    Ok(bar)
}

/// Main client entrypoint: connects, sends for the configured time, and reports.
///
/// Interruption by `cancel` is not an error; the returned report is flagged accordingly.
// Caution: As we are using ProgressBar, anything to be printed to console should go via tracing or display.println() !
pub async fn client_main(
    job: &ClientJob,
    config: &Configuration,
    display: &MultiProgress,
    cancel: &CancellationToken,
    quiet: bool,
) -> Result<SendReport> {
    run(job, config, display, cancel, quiet)
        .instrument(trace_span!("CLIENT"))
        .await
}

async fn run(
    job: &ClientJob,
    config: &Configuration,
    display: &MultiProgress,
    cancel: &CancellationToken,
    quiet: bool,
) -> Result<SendReport> {
    if job.size == 0 {
        anyhow::bail!("packet size must be at least 1 byte");
    }

    let ip = lookup_host_by_family(&job.host, job.address_family)?;
    let server_addr = SocketAddr::new(ip, job.port);
    let endpoint = create_endpoint(&server_addr, job, config)?;
    debug!("Opening QUIC connection to {server_addr}");
    debug!("Local endpoint address is {:?}", endpoint.local_addr()?);

    let connecting = endpoint
        .connect(server_addr, job.tls_name())
        .with_context(|| format!("failed to start connecting to {server_addr}"))?;
    let connection = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!("Interrupted while connecting");
            endpoint.close(0u32.into(), b"interrupted");
            return Ok(SendReport { interrupted: true, ..Default::default() });
        }
        c = connecting => c.with_context(|| format!("failed to connect to {server_addr}"))?,
    };
    info!("Connected to {server_addr}");

    let (mut send, _recv) = connection
        .open_bi()
        .await
        .context("failed to open stream")?;

    let packet = filler_packet(job.size);
    let bar = progress_bar_for(display, quiet)?;
    bar.set_message("starting");
    let mut meter = InstaMeterRunner::new(&bar);
    meter.start().await;
    let report = send_loop(&mut send, &packet, job.duration, cancel, &bar).await;
    meter.stop().await;
    bar.finish_and_clear();

    // Closedown ----------------------
    trace!("finishing stream");
    let _ = send
        .finish()
        .inspect_err(|e| debug!("could not finish stream: {e}"));
    if !report.interrupted {
        // The server closes the connection once it has read everything we sent
        let _ = timeout(CLOSEDOWN_TIMEOUT, connection.closed())
            .await
            .inspect_err(|_| warn!("server did not close the connection in time"));
    }
    let stats = connection.stats();
    connection.close(0u32.into(), b"finished");
    endpoint.close(0u32.into(), b"finished");
    let _ = timeout(CLOSEDOWN_TIMEOUT, endpoint.wait_idle())
        .await
        .inspect_err(|_| warn!("QUIC shutdown timed out"));

    crate::util::stats::output_statistics(&stats, report.bytes_sent, job.statistics);
    Ok(report)
}
