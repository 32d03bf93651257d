//! ExpirySweeper processor.
//!
//! Periodically deletes PromptPay orders whose payment window closed.
//! The period comes from the marketplace policy and is re-read whenever the
//! policy store is updated.

use crate::config::ConfigWatcher;
use crate::orders::{OrderEngine, OrderError};
use kanau::processor::Processor;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

/// One sweep request.
#[derive(Debug, Clone, Copy)]
pub struct SweepTick;

pub struct ExpirySweeper {
    engine: OrderEngine,
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl ExpirySweeper {
    pub fn new(engine: OrderEngine) -> Self {
        Self { engine }
    }

    /// Run until the shutdown signal fires. A failed sweep is logged and
    /// retried on the next tick.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut config_watcher: ConfigWatcher) {
        let mut period = self.engine.policy().snapshot().await.sweep_interval;
        let mut interval = ticker(period);
        info!(interval_secs = period.as_secs(), "ExpirySweeper started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ExpirySweeper received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let next = self.engine.policy().snapshot().await.sweep_interval;
                    if next != period {
                        info!(
                            old_secs = period.as_secs(),
                            new_secs = next.as_secs(),
                            "ExpirySweeper interval changed"
                        );
                        period = next;
                        interval = ticker(period);
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.process(SweepTick).await {
                        error!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }

        info!("ExpirySweeper shutdown complete");
    }
}

impl Processor<SweepTick> for ExpirySweeper {
    type Output = Vec<Uuid>;
    type Error = OrderError;

    async fn process(&self, _tick: SweepTick) -> Result<Vec<Uuid>, OrderError> {
        let deleted = self.engine.sweep_expired().await?;
        debug!(deleted = deleted.len(), "Expiry sweep finished");
        Ok(deleted)
    }
}
