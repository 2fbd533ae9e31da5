//! Background loops with an explicit shutdown handle.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A named loop that runs a job on a fixed interval until shut down.
///
/// The first run happens one full interval after spawning. A run that is
/// in progress when shutdown is requested is allowed to finish.
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        job().await;
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!(task = name, "Periodic task shutting down");
                        break;
                    }
                }
            }
        });

        tracing::info!(task = name, period_secs = period.as_secs_f64(), "Started periodic task");

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(task = self.name, error = %e, "Periodic task ended abnormally");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            self.handle.abort();
        }
    }
}
