use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::persistence::gateway::{AutosaveOutcome, PersistenceGateway};

/// Fixed-interval autosave timer. The enable flag lives on the gateway, so
/// the timer keeps running while autosave is switched off.
#[derive(Debug)]
pub struct Autosave {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    period: Duration,
}

impl Autosave {
    pub fn spawn(gateway: Arc<PersistenceGateway>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();
        let period = period.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        match gateway.autosave_tick().await {
                            AutosaveOutcome::Saved { flow_id } => debug!(%flow_id, "autosave tick saved"),
                            AutosaveOutcome::Failed(reason) => debug!(%reason, "autosave tick failed"),
                            other => trace!(outcome = ?other, "autosave tick skipped"),
                        }
                    }
                }
            }
            debug!("autosave timer stopped");
        });

        Self {
            token,
            handle: Mutex::new(Some(handle)),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stops the timer and waits for an in-progress tick to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "autosave task ended abnormally");
            }
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
