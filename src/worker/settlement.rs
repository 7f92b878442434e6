use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::scheduler::{AdvanceOutcome, SchedulerHandle};
use crate::error::WorkerError;
use crate::points::Settler;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub settled: usize,
    pub failed: usize,
    pub retired: usize,
}

/// Periodically settles due entries and moves them along their backoff schedule.
pub struct SettlementJob {
    scheduler: SchedulerHandle,
    settler: Arc<dyn Settler>,
    tick: Duration,
}

impl SettlementJob {
    pub fn new(scheduler: SchedulerHandle, settler: Arc<dyn Settler>, tick: Duration) -> Self {
        SettlementJob {
            scheduler,
            settler,
            tick,
        }
    }

    /// Settle every due entry once. A failing Settler call still advances the entry.
    pub async fn sweep(&self) -> Result<SweepReport, WorkerError> {
        let due = self.scheduler.due_entries().await?;
        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for entry in due {
            match self
                .settler
                .settle(entry.fixture_id, entry.home, entry.away)
                .await
            {
                Ok(updated) => {
                    report.settled += 1;
                    info!(
                        "Settled fixture {} at {}-{} (attempt {}, {} records)",
                        entry.fixture_id,
                        entry.home,
                        entry.away,
                        entry.attempt + 1,
                        updated
                    );
                }
                Err(cause) => {
                    report.failed += 1;
                    warn!(
                        "{}",
                        WorkerError::Settlement {
                            fixture_id: entry.fixture_id,
                            cause,
                        }
                    );
                }
            }

            if self.scheduler.advance_or_retire(entry.fixture_id).await? == AdvanceOutcome::Retired {
                report.retired += 1;
            }
        }

        Ok(report)
    }

    pub async fn run(self) -> Result<()> {
        info!("Settlement job started (tick={:?})", self.tick);

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let report = self.sweep().await?;
            if report.due > 0 {
                info!(
                    due = report.due,
                    settled = report.settled,
                    failed = report.failed,
                    retired = report.retired,
                    "Settlement sweep completed"
                );
            }
        }
    }
}
