// Instant progress read-out
// (c) 2024 Ross Younger

//! # Rationale
//! `indicatif` has a smoothed, weighted moving-average estimator.
//! That conceals the full picture when bandwidth is spiky, which is exactly what a benchmark wants to see.
//! This struct computes the near-instant send rate and shows it as the progress bar's message.

use std::time::Duration;

use human_repr::HumanThroughput as _;
use indicatif::ProgressBar;
use tokio::{sync::oneshot, task::JoinHandle, time::Instant};
use tracing::{trace, warn};

const METER_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a background task which updates a progress bar's message with the instant rate
#[derive(Debug)]
pub(crate) struct InstaMeterRunner {
    bar: ProgressBar,
    task: Option<JoinHandle<()>>,
    stopper: Option<oneshot::Sender<()>>,
}

impl InstaMeterRunner {
    pub(crate) fn new(bar: &ProgressBar) -> Self {
        Self {
            bar: bar.clone(),
            task: None,
            stopper: None,
        }
    }

    pub(crate) async fn start(&mut self) {
        self.stop().await;
        let (tx, mut rx) = oneshot::channel();
        self.stopper = Some(tx);
        let mut meter = InstaMeter::new(&self.bar);
        self.task = Some(tokio::spawn(async move {
            let mut earlier = Instant::now();
            loop {
                tokio::select! {
                    () = tokio::time::sleep(METER_INTERVAL) => (),
                    _ = &mut rx => break,
                }
                let now = Instant::now();
                let msg = meter.update(now.duration_since(earlier));
                trace!("{msg}");
                earlier = now;
            }
        }));
    }

    pub(crate) async fn stop(&mut self) {
        let Some(tx) = self.stopper.take() else {
            return;
        };
        if tx.send(()).is_err() {
            warn!("failed to notify meter to stop");
            return;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await.inspect_err(|e| warn!("meter task panicked: {e}"));
        }
    }
}

impl Drop for InstaMeterRunner {
    fn drop(&mut self) {
        if let Some(t) = self.task.take() {
            t.abort();
        }
    }
}

/// Near-instant rate computation. Owned by the meter task.
#[derive(Debug)]
struct InstaMeter {
    previous_position: u64,
    bar: ProgressBar,
}

impl InstaMeter {
    fn new(bar: &ProgressBar) -> Self {
        Self {
            previous_position: bar.position(),
            bar: bar.clone(),
        }
    }

    fn rate(&mut self, elapsed: Duration) -> f64 {
        let current = self.bar.position();
        #[allow(clippy::cast_precision_loss)]
        let progress = current.saturating_sub(self.previous_position) as f64;
        self.previous_position = current;
        if elapsed.is_zero() {
            0.0
        } else {
            progress / elapsed.as_secs_f64()
        }
    }

    #[must_use]
    fn update(&mut self, elapsed: Duration) -> String {
        let rate = self.rate(elapsed);
        let msg = format!("instant rate: {}", rate.human_throughput_bytes());
        self.bar.set_message(msg.clone());
        msg
    }
}
