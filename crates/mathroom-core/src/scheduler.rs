//! Activity gate and recurring session timers.
//!
//! The countdown only runs while the learner is judged active: some input
//! was observed within the inactivity threshold. The gate itself is a pure
//! function of two timestamps; [`TimerScheduler`] owns the recurring tasks
//! and feeds [`TimerEvent`]s into the session's event queue.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Whether the learner counts as active at `now_ms`.
pub fn is_active(last_activity_ms: i64, now_ms: i64, threshold: Duration) -> bool {
    now_ms.saturating_sub(last_activity_ms) <= threshold.as_millis() as i64
}

/// Last-input timestamp, updated from input handlers.
#[derive(Debug)]
pub struct ActivityMonitor {
    last_activity_ms: AtomicI64,
    threshold: Duration,
}

impl ActivityMonitor {
    pub fn new(now_ms: i64, threshold: Duration) -> Self {
        Self {
            last_activity_ms: AtomicI64::new(now_ms),
            threshold,
        }
    }

    /// Record an input signal.
    pub fn touch(&self, now_ms: i64) {
        self.last_activity_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        is_active(self.last_activity_ms(), now_ms, self.threshold)
    }
}

/// A recurring timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second of countdown elapsed.
    Countdown,
    /// Time to persist the remaining seconds.
    Flush,
}

/// Owns the countdown and flush tasks. Dropping it cancels both.
pub struct TimerScheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TimerScheduler {
    /// Spawn both timers. Events arrive on the returned receiver.
    pub fn start(
        countdown_every: Duration,
        flush_every: Duration,
    ) -> (Self, mpsc::Receiver<TimerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            spawn_ticker(
                countdown_every,
                TimerEvent::Countdown,
                tx.clone(),
                shutdown_rx.clone(),
            ),
            spawn_ticker(flush_every, TimerEvent::Flush, tx, shutdown_rx),
        ];

        (Self { shutdown, tasks }, rx)
    }

    /// Stop both timers and wait for them to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("timer task ended abnormally: {e}");
                }
            }
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_ticker(
    every: Duration,
    event: TimerEvent,
    tx: mpsc::Sender<TimerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
