// Server-side accounting
// (c) 2024 Ross Younger

use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

/// A progress line is printed each time a connection's byte count crosses a multiple of this
pub const PROGRESS_INTERVAL: u64 = 100_000_000;

/// Converts a byte count to decimal megabytes, for display
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1_000_000.
}

/// Global counters, shared by every connection handler.
///
/// Each counter is individually consistent; a [`StatsSnapshot`] of the pair is best-effort.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections: AtomicU64,
    bytes_received: AtomicU64,
}

impl ServerStats {
    /// Counts a new connection and returns its id (the first is 1)
    pub fn register_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds to the global received byte count
    pub fn add_bytes(&self, n: u64) {
        let _ = self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Reads both counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections accepted so far
    pub connections: u64,
    /// Total payload bytes received across all connections
    pub bytes_received: u64,
}

impl Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total: {} connections, received {:.2} MB of data",
            self.connections,
            megabytes(self.bytes_received)
        )
    }
}

/// The progress boundaries passed when a count moves from `before` to `after`.
///
/// Yields every multiple of [`PROGRESS_INTERVAL`] in `(before, after]`, in ascending order.
pub fn boundaries_crossed(before: u64, after: u64) -> impl Iterator<Item = u64> {
    (before / PROGRESS_INTERVAL + 1..=after / PROGRESS_INTERVAL).map(|k| k * PROGRESS_INTERVAL)
}

/// Per-connection byte counter, owned by the connection's handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTally {
    /// Connection id, as assigned by the accept loop
    pub id: u64,
    /// Bytes received on this connection
    pub bytes: u64,
}

impl ConnectionTally {
    /// Constructor
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id, bytes: 0 }
    }

    /// Adds `n` bytes and returns the progress boundaries this crossed
    pub fn record(&mut self, n: u64) -> impl Iterator<Item = u64> {
        let before = self.bytes;
        self.bytes = before.saturating_add(n);
        boundaries_crossed(before, self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{boundaries_crossed, ConnectionTally, ServerStats, StatsSnapshot};

    #[test]
    fn boundaries() {
        let b: Vec<_> = boundaries_crossed(0, 250_000_000).collect();
        assert_eq!(b, [100_000_000, 200_000_000]);
        assert_eq!(boundaries_crossed(0, 99_999_999).count(), 0);
        assert_eq!(
            boundaries_crossed(99_999_999, 100_000_000).collect::<Vec<_>>(),
            [100_000_000]
        );
        // already reported
        assert_eq!(boundaries_crossed(100_000_000, 199_999_999).count(), 0);
        assert_eq!(boundaries_crossed(5, 5).count(), 0);
    }

    #[test]
    fn tally_reports_each_boundary_once() {
        let mut t = ConnectionTally::new(7);
        let mut seen = Vec::new();
        for _ in 0..30 {
            seen.extend(t.record(10_000_000));
        }
        assert_eq!(t.bytes, 300_000_000);
        assert_eq!(seen, [100_000_000, 200_000_000, 300_000_000]);
    }

    #[test]
    fn ids_are_sequential() {
        let s = ServerStats::default();
        assert_eq!(s.register_connection(), 1);
        assert_eq!(s.register_connection(), 2);
        assert_eq!(s.snapshot().connections, 2);
    }

    #[test]
    fn concurrent_adds() {
        let stats = Arc::new(ServerStats::default());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let s = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        s.add_bytes(3);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(stats.snapshot().bytes_received, 24_000);
    }

    #[test]
    fn snapshot_display() {
        let s = StatsSnapshot {
            connections: 3,
            bytes_received: 1_500_000,
        };
        assert_eq!(
            s.to_string(),
            "Total: 3 connections, received 1.50 MB of data"
        );
    }
}
