// Per-connection handling
// (c) 2024 Ross Younger

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stats::{megabytes, ConnectionTally, ServerStats};

/// Size of the reusable read buffer
pub const READ_BUFFER_SIZE: usize = 2048;

/// Why a stream stopped being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Orderly end of data
    Finished,
    /// Server shutdown
    Cancelled,
    /// Read error (already logged)
    Failed,
}

/// Progress notification for one boundary crossed, with the connection's cumulative count
fn progress_line(tally: &ConnectionTally, boundary: u64) -> String {
    format!(
        "Connection {}: passed {:.0} MB, {:.2} MB received so far",
        tally.id,
        megabytes(boundary),
        megabytes(tally.bytes)
    )
}

/// Reads and discards everything from `stream`, counting it into `tally` and `stats`.
///
/// Emits one progress line per [`PROGRESS_INTERVAL`](super::stats::PROGRESS_INTERVAL) boundary crossed.
pub async fn drain_stream<R>(
    stream: &mut R,
    tally: &mut ConnectionTally,
    stats: &ServerStats,
    cancel: &CancellationToken,
) -> StreamEnd
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            r = stream.read(&mut buf) => r,
        };
        match result {
            Ok(0) => return StreamEnd::Finished,
            Ok(n) => {
                let n = n as u64;
                stats.add_bytes(n);
                for boundary in tally.record(n) {
                    info!("{}", progress_line(tally, boundary));
                }
            }
            Err(e) => {
                warn!("Connection {}: read error: {e}", tally.id);
                return StreamEnd::Failed;
            }
        }
    }
}

/// Handles one connection: completes the handshake, accepts one stream and drains it.
///
/// Errors are logged, never propagated. Returns the number of bytes received.
pub async fn handle_connection(
    connecting: quinn::Connecting,
    id: u64,
    stats: Arc<ServerStats>,
    cancel: CancellationToken,
) -> u64 {
    let connection = tokio::select! {
        biased;
        () = cancel.cancelled() => return 0,
        c = connecting => match c {
            Ok(c) => c,
            Err(e) => {
                warn!("Connection {id}: handshake failed: {e}");
                return 0;
            }
        },
    };
    let remote = connection.remote_address();
    info!("Connection {id}: accepted from {remote}");

    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        s = connection.accept_bi() => s
            .inspect_err(|e| warn!("Connection {id}: no stream opened: {e}"))
            .ok(),
    };
    let mut tally = ConnectionTally::new(id);
    if let Some((_send, mut recv)) = stream {
        let end = drain_stream(&mut recv, &mut tally, &stats, &cancel).await;
        debug!("Connection {id}: stream ended: {end:?}");
    }
    info!(
        "Connection {id} from {remote} closed: received {} bytes ({:.2} MB)",
        tally.bytes,
        megabytes(tally.bytes)
    );
    connection.close(0u32.into(), b"done");
    tally.bytes
}
