//! Daily scheduled refresh
//!
//! Runs the fetcher once a day at a fixed local wall-clock time, regardless of
//! cache age. Failures are logged and the task waits for the next day; there
//! is no retry.

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fetcher::{Fetcher, RefreshTrigger};

/// Configuration for the scheduled refresh
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Local time of day the refresh fires
    pub daily_at: NaiveTime,
    /// Whether the scheduled refresh runs at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_at: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or_default(),
            enabled: true,
        }
    }
}

/// Handle for the background scheduler task
pub struct SchedulerHandle {
    /// The scheduler task, absent when disabled
    task: Option<JoinHandle<()>>,
    /// Signals the task to stop
    shutdown_tx: mpsc::Sender<()>,
}

/// Returns the first instant strictly after `now` whose local time is `at`
///
/// Days where `at` falls in a DST gap are skipped; in a DST overlap the
/// earlier instant is used.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    for offset in 0..=2 {
        let date = today + Duration::days(offset);
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + Duration::days(1)
}

impl SchedulerHandle {
    /// Spawns the scheduler task
    ///
    /// # Arguments
    /// * `fetcher` - Fetcher invoked on every tick
    /// * `config` - Time of day and enable flag
    pub fn spawn(fetcher: Fetcher, config: SchedulerConfig) -> Self {
        if !config.enabled {
            tracing::info!("scheduled refresh disabled");
            let (shutdown_tx, _) = mpsc::channel::<()>(1);
            return Self {
                task: None,
                shutdown_tx,
            };
        }

        Self::spawn_with(fetcher, move || {
            let now = Local::now();
            let next = next_run(&now, config.daily_at);
            tracing::info!(next_run = %next.to_rfc3339(), "scheduled refresh armed");
            (next - now).to_std().unwrap_or_default()
        })
    }

    /// Spawns the refresh loop, asking `until_next` how long to sleep before
    /// each tick
    fn spawn_with<F>(fetcher: Fetcher, mut until_next: F) -> Self
    where
        F: FnMut() -> std::time::Duration + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            loop {
                let wait = until_next();

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        tracing::info!("scheduled cache refresh starting");
                        if let Err(e) = fetcher.refresh(RefreshTrigger::Scheduled).await {
                            tracing::warn!(error = %e, "scheduled cache refresh failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            task: Some(task),
            shutdown_tx,
        }
    }

    /// Whether the scheduler task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the scheduler and waits for the task to exit
    ///
    /// A refresh already under way is allowed to finish first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}
