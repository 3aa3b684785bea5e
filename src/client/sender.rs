// qbench client send loop
// (c) 2024 Ross Younger

use std::{fmt::Display, time::Duration};

use human_repr::{HumanCount as _, HumanDuration as _};
use indicatif::ProgressBar;
use num_format::{Locale, ToFormattedString as _};
use tokio::io::{AsyncWrite, AsyncWriteExt as _};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::util::stats::DataRate;

/// Pause after a failed write before trying again
pub const WRITE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Creates the filler buffer we send: `byte[i] = i mod 256`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn filler_packet(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Outcome of a send loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Bytes in completed writes
    pub bytes_sent: u64,
    /// Number of completed writes
    pub packets_sent: u64,
    /// Wall-clock time the loop ran for
    pub elapsed: Duration,
    /// Whether the loop was cut short by cancellation
    pub interrupted: bool,
}

impl SendReport {
    /// Achieved rate, in decimal megabits per second. Exactly zero if nothing was sent.
    #[must_use]
    pub fn throughput_mbps(&self) -> f64 {
        DataRate::new(self.bytes_sent, self.elapsed).megabit_rate()
    }
}

impl Display for SendReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.interrupted {
            writeln!(f, "Test interrupted; partial results follow")?;
        }
        writeln!(
            f,
            "Sent {} bytes ({}) in {} packets",
            self.bytes_sent.to_formatted_string(&Locale::en),
            self.bytes_sent.human_count_bytes(),
            self.packets_sent.to_formatted_string(&Locale::en),
        )?;
        writeln!(
            f,
            "Elapsed time: {:.2}s ({})",
            self.elapsed.as_secs_f64(),
            self.elapsed.human_duration()
        )?;
        write!(f, "Throughput: {:.2} Mbit/s", self.throughput_mbps())
    }
}

/// Writes `packet` to `stream` repeatedly until `duration` has elapsed or `cancel` fires.
///
/// Only complete writes are counted. A failed write is logged and retried after
/// [`WRITE_ERROR_BACKOFF`]; it never ends the loop by itself.
pub async fn send_loop<W>(
    stream: &mut W,
    packet: &[u8],
    duration: Duration,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> SendReport
where
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let len = packet.len() as u64;
    let mut report = SendReport::default();

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                report.interrupted = true;
                break;
            }
            () = &mut deadline => break,
            r = stream.write_all(packet) => r,
        };
        match result {
            Ok(()) => {
                report.packets_sent += 1;
                report.bytes_sent += len;
                progress.inc(len);
            }
            Err(e) => {
                warn!("write failed: {e}");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        report.interrupted = true;
                        break;
                    }
                    () = tokio::time::sleep(WRITE_ERROR_BACKOFF) => (),
                }
            }
        }
    }
    report.elapsed = start.elapsed();
    debug!(
        "send loop finished: {} packets, interrupted={}",
        report.packets_sent, report.interrupted
    );
    report
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use assertables::{assert_ge, assert_gt};
    use indicatif::ProgressBar;
    use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite};
    use tokio_util::sync::CancellationToken;

    use super::{filler_packet, send_loop, SendReport};

    /// Fails the first `failures` writes, then accepts everything
    struct FlakyWriter {
        failures: usize,
        attempts: usize,
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.attempts += 1;
            if self.attempts <= self.failures {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "nope")))
            } else {
                Poll::Ready(Ok(buf.len()))
            }
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> u64 {
        let mut buf = [0u8; 4096];
        let mut total = 0u64;
        while let Ok(n) = reader.read(&mut buf).await {
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        total
    }

    #[test]
    fn filler_pattern() {
        let p = filler_packet(600);
        assert_eq!(p.len(), 600);
        assert_eq!(p[0], 0);
        assert_eq!(p[255], 255);
        assert_eq!(p[256], 0);
        assert_eq!(p[599], (599 % 256) as u8);
        assert!(filler_packet(0).is_empty());
    }

    #[test]
    fn zero_report() {
        let r = SendReport {
            elapsed: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(r.throughput_mbps() == 0.0);
        assert!(SendReport::default().throughput_mbps() == 0.0);
    }

    #[test]
    fn throughput_formula() {
        let r = SendReport {
            bytes_sent: 1000 * 5000,
            packets_sent: 5000,
            elapsed: Duration::from_secs(4),
            interrupted: false,
        };
        // 5e6 bytes * 8 / 4s / 1e6 = 10 Mbit/s
        assert!((r.throughput_mbps() - 10.0).abs() < 1e-9);
        let s = r.to_string();
        assert!(s.contains("5,000,000 bytes"));
        assert!(s.contains("5,000 packets"));
        assert!(s.contains("10.00 Mbit/s"));
    }

    #[tokio::test]
    async fn counts_whole_packets() {
        let (mut tx, rx) = tokio::io::duplex(65536);
        let reader = tokio::spawn(drain(rx));
        let packet = filler_packet(1000);
        let cancel = CancellationToken::new();
        let bar = ProgressBar::hidden();
        let report = send_loop(&mut tx, &packet, Duration::from_millis(100), &cancel, &bar).await;
        drop(tx);
        let received = reader.await.unwrap();
        assert!(!report.interrupted);
        assert_ge!(report.packets_sent, 1);
        assert_eq!(report.bytes_sent, report.packets_sent * 1000);
        assert_ge!(received, report.bytes_sent);
        assert_ge!(report.elapsed, Duration::from_millis(100));
        assert_gt!(report.throughput_mbps(), 0.0);
        assert_eq!(bar.position(), report.bytes_sent);
    }

    #[tokio::test]
    async fn write_errors_are_not_fatal() {
        let mut w = FlakyWriter {
            failures: 3,
            attempts: 0,
        };
        let cancel = CancellationToken::new();
        let report = send_loop(
            &mut w,
            &[0u8; 10],
            Duration::from_millis(25),
            &cancel,
            &ProgressBar::hidden(),
        )
        .await;
        // three failures cost at least 30ms, which outlasts the deadline
        assert_eq!(report.packets_sent, 0);
        assert!(report.throughput_mbps() == 0.0);
        assert_ge!(w.attempts, 2);
    }

    #[tokio::test]
    async fn recovers_after_write_errors() {
        let (tx, rx) = tokio::io::duplex(65536);
        let reader = tokio::spawn(drain(rx));
        let mut w = FlakyThenReal {
            failures: 2,
            inner: tx,
        };
        let cancel = CancellationToken::new();
        let report = send_loop(
            &mut w,
            &filler_packet(100),
            Duration::from_millis(100),
            &cancel,
            &ProgressBar::hidden(),
        )
        .await;
        drop(w);
        let _ = reader.await.unwrap();
        assert_ge!(report.packets_sent, 1);
        assert_eq!(report.bytes_sent, report.packets_sent * 100);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (mut tx, _rx) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = send_loop(
            &mut tx,
            &filler_packet(100),
            Duration::from_secs(10),
            &cancel,
            &ProgressBar::hidden(),
        )
        .await;
        assert!(report.interrupted);
        assert_eq!(report.packets_sent, 0);
        assert!(report.throughput_mbps() == 0.0);
        assert!(report.to_string().contains("interrupted"));
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_partial_results() {
        let (mut tx, rx) = tokio::io::duplex(65536);
        let _reader = tokio::spawn(drain(rx));
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        let _h = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            c2.cancel();
        });
        let report = send_loop(
            &mut tx,
            &filler_packet(1000),
            Duration::from_secs(30),
            &cancel,
            &ProgressBar::hidden(),
        )
        .await;
        assert!(report.interrupted);
        assert_eq!(report.bytes_sent, report.packets_sent * 1000);
        assert!(report.elapsed < Duration::from_secs(30));
    }

    /// Fails a few writes, then passes through to a real stream
    struct FlakyThenReal {
        failures: usize,
        inner: tokio::io::DuplexStream,
    }

    impl AsyncWrite for FlakyThenReal {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "flaky")));
            }
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }
        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }
        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }
}
