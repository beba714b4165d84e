use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::refresh_all;
use crate::feed::Fetcher;
use crate::storage::{KeyValueStore, Storage};

enum Command {
    SetInterval(u32),
    Stop,
}

/// Controls a running background refresh task.
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Changes the tick period. Zero is ignored; returns whether the change
    /// was sent.
    pub async fn set_interval(&self, minutes: u32) -> bool {
        if minutes == 0 {
            tracing::debug!("Ignoring zero sync interval");
            return false;
        }
        self.tx.send(Command::SetInterval(minutes)).await.is_ok()
    }

    /// Stops the task and waits for any in-flight refresh to finish.
    pub async fn stop(self) {
        let _ = self.tx.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

fn ticker(period: Duration) -> Interval {
    // First tick one full period from now, not immediately
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawns a task that refreshes every feed once per `period` while
/// background sync is enabled in the stored settings.
pub fn spawn_scheduler<S: KeyValueStore>(
    fetcher: Fetcher,
    storage: Storage<S>,
    concurrency: usize,
    period: Duration,
) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::channel(8);

    let task = tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs(), "Background refresh started");
        let mut interval = ticker(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if storage.load_settings().await.background_sync_enabled {
                        refresh_all(&fetcher, &storage, concurrency).await;
                    } else {
                        tracing::debug!("Background sync disabled, skipping tick");
                    }
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::SetInterval(minutes)) => {
                        let period = Duration::from_secs(u64::from(minutes) * 60);
                        interval = ticker(period);
                        tracing::info!(minutes = minutes, "Background refresh interval changed");
                    }
                    Some(Command::Stop) | None => break,
                },
            }
        }

        tracing::info!("Background refresh stopped");
    });

    SchedulerHandle { tx, task }
}
