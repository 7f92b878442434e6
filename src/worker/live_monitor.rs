use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::enrichment::{enrich_fixtures, refresh_standings, EnrichmentReport};
use super::scheduler::{ScheduleOutcome, SchedulerHandle};
use super::tracker::{MatchStateTracker, Transition};
use crate::db::FixtureStore;
use crate::error::{self, WorkerError};
use crate::live_scores::FixtureSource;

#[derive(Debug, Clone)]
pub struct LiveMonitorConfig {
    /// Pause after a cycle that saw at least one live or half-time fixture
    pub active_interval: Duration,
    pub idle_interval: Duration,
    /// Pause after a failed cycle
    pub recovery_interval: Duration,
    pub concurrency: usize,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub competitions: usize,
    pub fixtures_seen: usize,
    pub live: usize,
    pub newly_finished: usize,
    pub scheduled: usize,
    pub malformed: usize,
    pub enrichment: EnrichmentReport,
    pub standings_refreshed: usize,
}

impl CycleReport {
    pub fn next_interval(&self, config: &LiveMonitorConfig) -> Duration {
        if self.live > 0 {
            config.active_interval
        } else {
            config.idle_interval
        }
    }
}

/// Polls today's fixtures and turns status changes into follow-up work.
pub struct LiveMonitorJob {
    source: Arc<dyn FixtureSource>,
    store: Arc<dyn FixtureStore>,
    scheduler: SchedulerHandle,
    tracker: MatchStateTracker,
    config: LiveMonitorConfig,
}

impl LiveMonitorJob {
    pub fn new(
        source: Arc<dyn FixtureSource>,
        store: Arc<dyn FixtureStore>,
        scheduler: SchedulerHandle,
        config: LiveMonitorConfig,
    ) -> Self {
        LiveMonitorJob {
            source,
            store,
            scheduler,
            tracker: MatchStateTracker::new(),
            config,
        }
    }

    /// One poll: snapshot, store, classify, enrich in-play fixtures, schedule
    /// settlements and refresh the standings of touched leagues.
    pub async fn run_cycle(&mut self, date: NaiveDate) -> Result<CycleReport> {
        let competitions = self
            .source
            .fetch_day_snapshot(date)
            .await
            .map_err(|cause| WorkerError::TransientFetch {
                what: format!("day snapshot {}", date),
                cause,
            })?;

        let mut report = CycleReport {
            competitions: competitions.len(),
            ..Default::default()
        };
        if competitions.is_empty() {
            debug!("{} returned no fixtures for {}", self.source.name(), date);
            return Ok(report);
        }

        self.store
            .upsert_fixtures(&competitions)
            .await
            .map_err(|cause| WorkerError::TransientFetch {
                what: format!("fixture upsert for {}", date),
                cause,
            })?;

        // Classification runs start to finish without yielding
        let mut live_ids = Vec::new();
        let mut finished = Vec::new();
        for comp in &competitions {
            for fixture in &comp.fixtures {
                report.fixtures_seen += 1;
                let transition = self.tracker.observe(
                    fixture.id,
                    fixture.status,
                    fixture.result.as_deref(),
                    comp.id,
                );
                if fixture.status.is_active() {
                    live_ids.push(fixture.id);
                }
                if transition == Transition::BecameFinished {
                    finished.push((fixture.id, fixture.result.clone().unwrap_or_default()));
                }
            }
        }
        report.live = live_ids.len();
        report.newly_finished = finished.len();

        report.enrichment = enrich_fixtures(
            self.source.as_ref(),
            self.store.as_ref(),
            &live_ids,
            self.config.concurrency,
        )
        .await;

        let mut touched = BTreeSet::new();
        for (fixture_id, result) in &finished {
            let outcome = self
                .scheduler
                .schedule_or_update(*fixture_id, result)
                .await
                .with_context(|| format!("scheduling settlement of fixture {}", fixture_id))?;
            match outcome {
                ScheduleOutcome::Created | ScheduleOutcome::Updated => report.scheduled += 1,
                ScheduleOutcome::Malformed => {
                    debug!("Fixture {} finished with unparseable result {:?}", fixture_id, result);
                    report.malformed += 1;
                }
            }
            if let Some(league_id) = self.tracker.league_of(*fixture_id).filter(|&id| id != 0) {
                touched.insert(league_id);
            }
        }

        report.standings_refreshed =
            refresh_standings(self.source.as_ref(), self.store.as_ref(), &touched).await;

        Ok(report)
    }

    /// Poll forever. Only a fatal error ends the loop.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Live monitor started (active={:?}, idle={:?}, source={})",
            self.config.active_interval,
            self.config.idle_interval,
            self.source.name()
        );

        loop {
            let started = Instant::now();
            let today = Local::now().date_naive();

            let pause = match self.run_cycle(today).await {
                Ok(report) => {
                    info!(
                        competitions = report.competitions,
                        fixtures = report.fixtures_seen,
                        live = report.live,
                        finished = report.newly_finished,
                        scheduled = report.scheduled,
                        malformed = report.malformed,
                        enrich_attempted = report.enrichment.attempted,
                        enriched = report.enrichment.upserted,
                        enrich_empty = report.enrichment.empty,
                        enrich_failed = report.enrichment.failed.len(),
                        standings = report.standings_refreshed,
                        tracked = self.tracker.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Live cycle completed"
                    );
                    report.next_interval(&self.config)
                }
                Err(e) if error::is_fatal(&e) => return Err(e.context("live monitor")),
                Err(e) => {
                    error!("Live cycle failed: {:#}", e);
                    self.config.recovery_interval
                }
            };

            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MatchStatus;
    use crate::worker::scheduler::settlement_channel;
    use crate::worker::testing::{competition, fixture, FakeSource, MemoryStore};

    fn config() -> LiveMonitorConfig {
        LiveMonitorConfig {
            active_interval: Duration::from_secs(30),
            idle_interval: Duration::from_secs(300),
            recovery_interval: Duration::from_secs(20),
            concurrency: 6,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[tokio::test]
    async fn test_live_then_finished() {
        let source = Arc::new(
            FakeSource::new()
                .with_live(vec![competition(
                    47,
                    vec![
                        fixture(100, 47, MatchStatus::Live, "1 - 1"),
                        fixture(101, 47, MatchStatus::NotStarted, "vs"),
                    ],
                )])
                .with_live(vec![competition(
                    47,
                    vec![
                        fixture(100, 47, MatchStatus::FullTime, "2-1"),
                        fixture(101, 47, MatchStatus::NotStarted, "vs"),
                    ],
                )]),
        );
        let store = Arc::new(MemoryStore::new());
        let (handle, actor) = settlement_channel(vec![Duration::from_secs(120)]);
        tokio::spawn(actor.run());
        let mut job = LiveMonitorJob::new(source.clone(), store.clone(), handle.clone(), config());

        let first = job.run_cycle(date()).await.unwrap();
        assert_eq!(first.live, 1);
        assert_eq!(first.newly_finished, 0);
        assert_eq!(source.calls().events, vec![100]);
        assert!(handle.pending().await.unwrap().is_empty());
        assert_eq!(first.next_interval(&config()), Duration::from_secs(30));

        let second = job.run_cycle(date()).await.unwrap();
        assert_eq!(second.live, 0);
        assert_eq!(second.newly_finished, 1);
        assert_eq!(second.scheduled, 1);
        assert_eq!(second.standings_refreshed, 1);
        assert_eq!(second.next_interval(&config()), Duration::from_secs(300));
        // No enrichment for the fixture once it is no longer live
        assert_eq!(source.calls().events, vec![100]);
        assert_eq!(source.calls().standings, vec![47]);

        let pending = handle.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fixture_id, 100);
        assert_eq!((pending[0].home_score, pending[0].away_score), (2, 1));
        assert_eq!(store.fixture(100).unwrap().status, MatchStatus::FullTime);
    }

    #[tokio::test]
    async fn test_repeated_finish_is_scheduled_once() {
        let snapshot = vec![competition(47, vec![fixture(7, 47, MatchStatus::FullTime, "0 - 0")])];
        let source = Arc::new(
            FakeSource::new()
                .with_live(snapshot.clone())
                .with_live(snapshot),
        );
        let (handle, actor) = settlement_channel(vec![]);
        tokio::spawn(actor.run());
        let mut job =
            LiveMonitorJob::new(source, Arc::new(MemoryStore::new()), handle.clone(), config());

        assert_eq!(job.run_cycle(date()).await.unwrap().scheduled, 1);
        assert_eq!(job.run_cycle(date()).await.unwrap().scheduled, 0);
        assert_eq!(handle.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_final_result_is_not_scheduled() {
        let source = Arc::new(FakeSource::new().with_live(vec![competition(
            47,
            vec![fixture(9, 47, MatchStatus::FullTime, "abandoned")],
        )]));
        let (handle, actor) = settlement_channel(vec![]);
        tokio::spawn(actor.run());
        let mut job =
            LiveMonitorJob::new(source, Arc::new(MemoryStore::new()), handle.clone(), config());

        let report = job.run_cycle(date()).await.unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.scheduled, 0);
        assert!(handle.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_transient() {
        let source = Arc::new(FakeSource::new().with_live_error());
        let store = Arc::new(MemoryStore::new());
        let (handle, actor) = settlement_channel(vec![]);
        tokio::spawn(actor.run());
        let mut job = LiveMonitorJob::new(source, store.clone(), handle, config());

        let err = job.run_cycle(date()).await.unwrap_err();
        assert!(!error::is_fatal(&err));
        assert_eq!(store.fixture_upserts(), 0);

        // Empty snapshot on the next cycle: nothing stored, idle pace
        let report = job.run_cycle(date()).await.unwrap();
        assert_eq!(report.competitions, 0);
        assert_eq!(store.fixture_upserts(), 0);
    }

    #[tokio::test]
    async fn test_closed_scheduler_is_fatal() {
        let source = Arc::new(FakeSource::new().with_live(vec![competition(
            47,
            vec![fixture(5, 47, MatchStatus::FullTime, "1 - 0")],
        )]));
        let (handle, actor) = settlement_channel(vec![]);
        drop(actor);
        let mut job = LiveMonitorJob::new(source, Arc::new(MemoryStore::new()), handle, config());

        let err = job.run_cycle(date()).await.unwrap_err();
        assert!(error::is_fatal(&err));
    }

    #[tokio::test]
    async fn test_half_time_keeps_active_pace() {
        let source = Arc::new(FakeSource::new().with_live(vec![competition(
            47,
            vec![fixture(100, 47, MatchStatus::HalfTime, "1 - 0")],
        )]));
        let (handle, actor) = settlement_channel(vec![]);
        tokio::spawn(actor.run());
        let mut job =
            LiveMonitorJob::new(source.clone(), Arc::new(MemoryStore::new()), handle, config());

        let report = job.run_cycle(date()).await.unwrap();
        assert_eq!(report.live, 1);
        assert_eq!(report.next_interval(&config()), Duration::from_secs(30));
        assert_eq!(source.calls().events, vec![100]);
    }

    fn fast_config() -> LiveMonitorConfig {
        LiveMonitorConfig {
            active_interval: Duration::from_millis(10),
            idle_interval: Duration::from_millis(10),
            recovery_interval: Duration::from_millis(10),
            concurrency: 6,
        }
    }

    #[tokio::test]
    async fn test_run_recovers_after_failed_cycle() {
        let source = Arc::new(
            FakeSource::new()
                .with_live_error()
                .with_live(vec![competition(
                    47,
                    vec![fixture(1, 47, MatchStatus::NotStarted, "vs")],
                )]),
        );
        let store = Arc::new(MemoryStore::new());
        let (handle, actor) = settlement_channel(vec![]);
        tokio::spawn(actor.run());
        let job = LiveMonitorJob::new(source.clone(), store.clone(), handle, fast_config());
        let task = tokio::spawn(job.run());

        let stored = tokio::time::timeout(Duration::from_secs(2), async {
            while store.fixture(1).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        task.abort();

        assert!(stored.is_ok(), "snapshot after the failed cycle never reached the store");
        assert!(source.calls().days.len() >= 2);
        assert_eq!(store.fixture_upserts(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_closed_scheduler() {
        let source = Arc::new(FakeSource::new().with_live(vec![competition(
            47,
            vec![fixture(5, 47, MatchStatus::FullTime, "1 - 0")],
        )]));
        let (handle, actor) = settlement_channel(vec![]);
        drop(actor);
        let job = LiveMonitorJob::new(source, Arc::new(MemoryStore::new()), handle, fast_config());

        let err = tokio::time::timeout(Duration::from_secs(2), job.run())
            .await
            .unwrap()
            .unwrap_err();
        assert!(error::is_fatal(&err));
        assert!(format!("{:#}", err).starts_with("live monitor"));
    }
}
