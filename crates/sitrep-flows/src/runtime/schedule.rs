//! Worker shutdown signalling and idempotent interval schedules.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use sitrep_core::error::{Error, Result};

/// Sender half of the shutdown signal; dropping it does not trigger
/// shutdown, calling [`ShutdownHandle::shutdown`] does.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Ask every worker and schedule to drain and stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half, cloned into every worker loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a connected handle/signal pair.
    pub fn pair() -> (ShutdownHandle, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, ShutdownSignal { rx })
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Interval schedules partitioned by task queue.
///
/// Creating a schedule with an id that already exists returns
/// `ScheduleAlreadyRunning`, which callers treat as informational. Each
/// schedule runs its workflow on a fixed interval until shutdown; the first
/// run fires one interval after registration.
pub struct Scheduler {
    signal: ShutdownSignal,
    ids: HashSet<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(signal: ShutdownSignal) -> Self {
        Scheduler {
            signal,
            ids: HashSet::new(),
            tasks: Vec::new(),
        }
    }

    /// Register an interval schedule.
    pub fn create_schedule<F, Fut>(
        &mut self,
        schedule_id: &str,
        task_queue: &str,
        interval: Duration,
        workflow: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send,
    {
        if !self.ids.insert(schedule_id.to_string()) {
            return Err(Error::ScheduleAlreadyRunning(schedule_id.to_string()));
        }

        let signal = self.signal.clone();
        let id = schedule_id.to_string();
        let queue = task_queue.to_string();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            info!(schedule = %id, task_queue = %queue, interval_secs = interval.as_secs(),
                  "schedule created");
            loop {
                tokio::select! {
                    _ = signal.wait() => {
                        info!(schedule = %id, "schedule stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        info!(schedule = %id, task_queue = %queue, "scheduled workflow started");
                        match workflow().await {
                            Ok(outcome) => {
                                info!(schedule = %id, outcome = %outcome, "scheduled workflow finished");
                            }
                            Err(e) => {
                                error!(schedule = %id, error = %e, "scheduled workflow failed");
                            }
                        }
                    }
                }
            }
        });
        self.tasks.push(handle);
        Ok(())
    }

    /// Block until shutdown is requested, then drain every schedule task.
    pub async fn run_until_shutdown(self) {
        self.signal.wait().await;
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_duplicate_schedule_id_is_reported() {
        let (_handle, signal) = ShutdownSignal::pair();
        let mut scheduler = Scheduler::new(signal);
        scheduler
            .create_schedule("sweep", "cve_connector", Duration::from_secs(60), || async {
                Ok("done".to_string())
            })
            .unwrap();
        let err = scheduler
            .create_schedule("sweep", "cve_connector", Duration::from_secs(60), || async {
                Ok("done".to_string())
            })
            .unwrap_err();
        assert_eq!(err.kind(), "ScheduleAlreadyRunning");
    }

    #[tokio::test]
    async fn test_schedule_fires_and_drains_on_shutdown() {
        let (handle, signal) = ShutdownSignal::pair();
        let mut scheduler = Scheduler::new(signal);
        let runs = Arc::new(AtomicU32::new(0));
        let counted = runs.clone();
        scheduler
            .create_schedule("tick", "csa", Duration::from_millis(10), move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok("tick".to_string())
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();
        scheduler.run_until_shutdown().await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_wait_resolves() {
        let (handle, signal) = ShutdownSignal::pair();
        assert!(!signal.is_shutdown());
        handle.shutdown();
        signal.wait().await;
        assert!(signal.is_shutdown());
    }
}
