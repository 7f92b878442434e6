use futures_util::future::select_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::daily::{BackfillJob, FutureSeedJob};
use super::live_monitor::LiveMonitorJob;
use super::scheduler::{settlement_channel, SchedulerActor, SchedulerHandle};
use super::settlement::SettlementJob;
use crate::config::Config;
use crate::db::FixtureStore;
use crate::error::WorkerError;
use crate::live_scores::FixtureSource;
use crate::points::Settler;

type Job = (&'static str, JoinHandle<anyhow::Result<()>>);

/// Wires the jobs to one shared settlement scheduler and supervises them.
pub struct Orchestrator {
    scheduler: SchedulerHandle,
    actor: SchedulerActor,
    live: LiveMonitorJob,
    settlement: SettlementJob,
    backfill: BackfillJob,
    seed: FutureSeedJob,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        source: Arc<dyn FixtureSource>,
        store: Arc<dyn FixtureStore>,
        settler: Arc<dyn Settler>,
    ) -> Self {
        let (scheduler, actor) = settlement_channel(config.settlement_backoff());

        let live = LiveMonitorJob::new(
            source.clone(),
            store.clone(),
            scheduler.clone(),
            config.live_monitor_config(),
        );
        let settlement = SettlementJob::new(
            scheduler.clone(),
            settler,
            Duration::from_secs(config.settlement_tick_secs),
        );
        let backfill = BackfillJob::new(
            source.clone(),
            store.clone(),
            scheduler.clone(),
            config.backfill_hour,
            config.backfill_days,
            config.enrichment_concurrency,
        );
        let seed = FutureSeedJob::new(
            source,
            store,
            config.league_ids.clone(),
            config.future_seed_hour,
            Duration::from_secs(config.seed_league_pause_secs),
        );

        Orchestrator {
            scheduler,
            actor,
            live,
            settlement,
            backfill,
            seed,
        }
    }

    /// Handle for read-only consumers such as the HTTP API.
    pub fn scheduler(&self) -> SchedulerHandle {
        self.scheduler.clone()
    }

    /// Run every job until `shutdown` resolves or one of them stops.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), WorkerError> {
        let Orchestrator {
            scheduler,
            actor,
            live,
            settlement,
            backfill,
            seed,
        } = self;
        // The actor stops once the last handle is gone
        drop(scheduler);

        let jobs: Vec<Job> = vec![
            (
                "settlement_scheduler",
                tokio::spawn(async move {
                    actor.run().await;
                    Ok(())
                }),
            ),
            ("live_monitor", tokio::spawn(live.run())),
            ("settlement", tokio::spawn(settlement.run())),
            ("backfill", tokio::spawn(backfill.run())),
            ("future_seed", tokio::spawn(seed.run())),
        ];
        info!("Started {} jobs", jobs.len());

        supervise(jobs, shutdown).await
    }
}

/// Wait for shutdown or the first job to exit, then abort the rest.
///
/// None of the jobs is meant to return, so any exit is fatal.
async fn supervise(jobs: Vec<Job>, shutdown: impl Future<Output = ()>) -> Result<(), WorkerError> {
    let (names, handles): (Vec<&'static str>, Vec<_>) = jobs.into_iter().unzip();
    let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

    let first_exit = tokio::select! {
        _ = shutdown => None,
        (result, index, _) = select_all(handles) => Some((names[index], result)),
    };

    for abort in &aborts {
        abort.abort();
    }

    let Some((job, result)) = first_exit else {
        info!("Shutdown requested, stopped {} jobs", names.len());
        return Ok(());
    };

    let reason = match result {
        Ok(Ok(())) => "exited unexpectedly".to_string(),
        Ok(Err(e)) => format!("{:#}", e),
        Err(e) if e.is_panic() => "panicked".to_string(),
        Err(e) => e.to_string(),
    };
    let err = WorkerError::JobFatal { job, reason };
    error!("{}; stopping all jobs", err);
    Err(err)
}
