use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use appointment_cell::AppointmentState;

use crate::error::ReconcilerError;
use crate::models::{ReconcilerConfig, ScanReport};
use crate::services::no_show::NoShowDetector;
use crate::services::notification::NotificationTransport;
use crate::services::reminder::ReminderDispatcher;

/// A periodic pass over the appointment store.
#[async_trait]
pub trait ReconcileTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<ScanReport, ReconcilerError>;
}

/// Owns the background loops. Dropping the runner also stops them, but only
/// `shutdown` waits for the current pass to finish.
pub struct ReconcilerRunner {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ReconcilerRunner {
    pub fn start(
        state: &AppointmentState,
        config: &ReconcilerConfig,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        let no_show: Arc<dyn ReconcileTask> = Arc::new(NoShowDetector::new(state, config.no_show_grace_minutes));
        let reminders: Arc<dyn ReconcileTask> = Arc::new(ReminderDispatcher::new(state, config, transport));

        Self::with_tasks(vec![
            (no_show, config.no_show_interval),
            (reminders, config.reminder_interval),
        ])
    }

    pub fn with_tasks(tasks: Vec<(Arc<dyn ReconcileTask>, Duration)>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = tasks
            .into_iter()
            .map(|(task, period)| {
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move { run_loop(task, period, shutdown_rx).await })
            })
            .collect();

        Self { shutdown_tx, handles }
    }

    /// Signals every loop to stop and waits for them to finish.
    pub async fn shutdown(self) {
        info!("Stopping background reconciler");
        // Receivers gone means the loops already exited.
        let _ = self.shutdown_tx.send(true);

        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                error!("Reconciler task ended abnormally: {}", e);
            }
        }
        info!("Background reconciler stopped");
    }
}

async fn run_loop(task: Arc<dyn ReconcileTask>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Starting {} every {:?}", task.name(), period);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("{} received shutdown signal", task.name());
                    break;
                }
            }
            _ = interval.tick() => {
                match task.run_once().await {
                    Ok(report) => debug!(
                        "{} pass: scanned={}, applied={}, failed={}",
                        task.name(), report.scanned, report.applied, report.failed
                    ),
                    Err(e) => error!("{} pass failed: {}", task.name(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReconcileTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting task"
        }

        async fn run_once(&self) -> Result<ScanReport, ReconcilerError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReconcilerError::MissingContact(uuid::Uuid::nil()));
            }
            Ok(ScanReport::default())
        }
    }

    #[tokio::test]
    async fn runs_immediately_and_stops_on_shutdown() {
        let task = Arc::new(CountingTask {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let runner = ReconcilerRunner::with_tasks(vec![(task.clone() as Arc<dyn ReconcileTask>, Duration::from_secs(3600))]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(1), runner.shutdown())
            .await
            .expect("runner should stop promptly");

        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pass_does_not_stop_the_loop() {
        let task = Arc::new(CountingTask {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let runner = ReconcilerRunner::with_tasks(vec![(task.clone() as Arc<dyn ReconcileTask>, Duration::from_secs(60))]);

        tokio::time::sleep(Duration::from_secs(150)).await;
        runner.shutdown().await;

        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
    }
}
