//! Background task scheduler
//!
//! Owns every background activity of a discovery node: periodic tasks
//! (interface polling, broadcasting, heartbeat sweeps) and long-lived loops
//! (the UDP listener). All tasks share one shutdown signal.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                TaskScheduler                │
//! │                                             │
//! │   watch<bool> shutdown ──┬──────┬──────┐    │
//! │                          ▼      ▼      ▼    │
//! │   periodic:  [interfaces] [broadcast] [sweep]│
//! │   loop:      [listener]                     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Periodic tasks run on a `tokio::time::interval`, so tests drive them with
//! paused virtual time (`#[tokio::test(start_paused = true)]`). A periodic
//! task may also be woken early through a [`Notify`] trigger.
//!
//! # Usage
//!
//! ```ignore
//! let mut scheduler = TaskScheduler::new();
//! scheduler.spawn_periodic("sweep", Duration::from_secs(60), None, move || {
//!     let monitor = monitor.clone();
//!     async move { monitor.sweep(); }
//! });
//! // ...
//! let report = scheduler.shutdown(Duration::from_secs(5)).await;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// What happened to the tasks during shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished within the grace period
    pub completed: Vec<String>,

    /// Tasks aborted after the grace period elapsed
    pub aborted: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Spawns and stops the background tasks of one node
pub struct TaskScheduler {
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            shutdown,
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    /// Receiver that flips to `true` when shutdown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Names of tasks that have not finished yet
    pub fn running_tasks(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Run `task` immediately and then every `period`.
    ///
    /// A notification on `trigger` runs the task out of band and restarts
    /// the period from that point. Ticks missed while the task was running
    /// are delayed, not bunched up.
    pub fn spawn_periodic<F, Fut>(
        &mut self,
        name: impl Into<String>,
        period: Duration,
        trigger: Option<Arc<Notify>>,
        mut task: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(task = %task_name, period_secs = period.as_secs(), "Periodic task started");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = notified(trigger.as_deref()) => {
                        tracing::debug!(task = %task_name, "Periodic task triggered early");
                        task().await;
                        ticker.reset();
                    }
                    _ = ticker.tick() => {
                        task().await;
                    }
                }
            }

            tracing::info!(task = %task_name, "Periodic task shutting down");
        });

        self.tasks.push((name, handle));
    }

    /// Run a long-lived loop. The loop gets the shutdown signal and must
    /// return once it flips to `true`.
    pub fn spawn_loop<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(task(self.shutdown_rx.clone()));
        self.tasks.push((name, handle));
    }

    /// Signal shutdown without waiting
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait up to `grace` for all tasks. Stragglers are aborted.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.signal_shutdown();

        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.completed.push(name),
                Ok(Err(e)) => {
                    tracing::warn!(task = %name, "Task ended abnormally: {}", e);
                    report.completed.push(name);
                }
                Err(_) => {
                    tracing::warn!(task = %name, "Task did not stop within grace period, aborting");
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }

        report
    }
}

async fn notified(trigger: Option<&Notify>) {
    match trigger {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}
