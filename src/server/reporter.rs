// Periodic statistics reporting
// (c) 2024 Ross Younger

use std::{sync::Arc, time::Duration};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::stats::{ServerStats, StatsSnapshot};

/// Calls `report` with a snapshot of `stats` every `period`, until `cancel` fires.
///
/// The first report comes one full period after starting.
pub async fn run_reporter<F>(
    stats: Arc<ServerStats>,
    period: Duration,
    cancel: CancellationToken,
    mut report: F,
) where
    F: FnMut(StatsSnapshot),
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => report(stats.snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio_util::sync::CancellationToken;

    use super::run_reporter;
    use crate::server::stats::ServerStats;

    #[tokio::test(start_paused = true)]
    async fn reports_every_period() {
        let stats = Arc::new(ServerStats::default());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(run_reporter(
            stats.clone(),
            Duration::from_secs(10),
            cancel.clone(),
            move |s| {
                let _ = tx.send(s);
            },
        ));
        let _ = stats.register_connection();
        stats.add_bytes(42);
        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(s) = rx.try_recv() {
            seen.push(s);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].bytes_received, 42);
        assert_eq!(seen[2].connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_promptly_when_cancelled() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reporter(
            Arc::new(ServerStats::default()),
            Duration::from_secs(3600),
            cancel.clone(),
            |_| panic!("should not report"),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
