//! Jobs that run once a day at a fixed local hour.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::enrichment::{enrich_fixtures, refresh_standings};
use super::scheduler::{ScheduleOutcome, SchedulerHandle};
use crate::db::FixtureStore;
use crate::error::{self, WorkerError};
use crate::live_scores::FixtureSource;

/// First `hour:00` strictly after `now`, in `now`'s time zone.
///
/// Days where that wall-clock time does not exist (DST gap) are skipped.
/// `None` when `hour` is not a valid hour of the day.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let at = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return Some(candidate);
            }
        }
        day = day.succ_opt()?;
    }
}

async fn sleep_until_hour(job: &str, hour: u32) -> Result<()> {
    let now = Local::now();
    let target = next_occurrence(&now, hour)
        .with_context(|| format!("{} has no next occurrence of hour {}", job, hour))?;
    let wait = (target - now).to_std().unwrap_or_default();
    info!("{} sleeping until {} ({:?})", job, target.format("%Y-%m-%d %H:%M"), wait);
    tokio::time::sleep(wait).await;
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub days_ok: usize,
    pub days_failed: usize,
    pub fixtures: usize,
    pub scheduled: usize,
}

/// Re-reads the last few days so late result corrections get settled too.
pub struct BackfillJob {
    source: Arc<dyn FixtureSource>,
    store: Arc<dyn FixtureStore>,
    scheduler: SchedulerHandle,
    hour: u32,
    days: u32,
    concurrency: usize,
}

impl BackfillJob {
    pub fn new(
        source: Arc<dyn FixtureSource>,
        store: Arc<dyn FixtureStore>,
        scheduler: SchedulerHandle,
        hour: u32,
        days: u32,
        concurrency: usize,
    ) -> Self {
        BackfillJob {
            source,
            store,
            scheduler,
            hour,
            days,
            concurrency,
        }
    }

    /// Process each of the `days` days before `today`, newest first.
    ///
    /// A day that fails is logged and skipped; only fatal errors are returned.
    pub async fn sweep(&self, today: NaiveDate) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();

        for offset in 1..=u64::from(self.days) {
            let day = today - Days::new(offset);
            match self.backfill_day(day).await {
                Ok((fixtures, scheduled)) => {
                    report.days_ok += 1;
                    report.fixtures += fixtures;
                    report.scheduled += scheduled;
                }
                Err(e) if error::is_fatal(&e) => return Err(e),
                Err(e) => {
                    report.days_failed += 1;
                    warn!("Backfill of {} failed: {:#}", day, e);
                }
            }
        }

        Ok(report)
    }

    async fn backfill_day(&self, day: NaiveDate) -> Result<(usize, usize)> {
        let competitions = self
            .source
            .fetch_day_snapshot(day)
            .await
            .map_err(|cause| WorkerError::TransientFetch {
                what: format!("day snapshot {}", day),
                cause,
            })?;
        if competitions.is_empty() {
            return Ok((0, 0));
        }
        let stored = self.store.upsert_fixtures(&competitions).await?;

        // Every finished fixture counts as newly finished here
        let mut finished_ids = Vec::new();
        let mut leagues = BTreeSet::new();
        let mut scheduled = 0;
        for comp in &competitions {
            for fixture in comp.fixtures.iter().filter(|f| f.status.is_finished()) {
                finished_ids.push(fixture.id);
                if comp.id != 0 {
                    leagues.insert(comp.id);
                }
                let Some(result) = fixture.result.as_deref() else {
                    continue;
                };
                let outcome = self
                    .scheduler
                    .schedule_or_update(fixture.id, result)
                    .await
                    .with_context(|| format!("scheduling settlement of fixture {}", fixture.id))?;
                if outcome != ScheduleOutcome::Malformed {
                    scheduled += 1;
                }
            }
        }

        enrich_fixtures(
            self.source.as_ref(),
            self.store.as_ref(),
            &finished_ids,
            self.concurrency,
        )
        .await;
        refresh_standings(self.source.as_ref(), self.store.as_ref(), &leagues).await;

        info!(
            "Backfilled {}: {} fixtures, {} finished, {} scheduled",
            day,
            stored,
            finished_ids.len(),
            scheduled
        );
        Ok((stored, scheduled))
    }

    pub async fn run(self) -> Result<()> {
        info!(
            "Backfill job started (hour={:02}:00, days={})",
            self.hour, self.days
        );
        loop {
            sleep_until_hour("Backfill", self.hour).await?;
            let report = self
                .sweep(Local::now().date_naive())
                .await
                .context("backfill")?;
            info!(
                days_ok = report.days_ok,
                days_failed = report.days_failed,
                fixtures = report.fixtures,
                scheduled = report.scheduled,
                "Backfill sweep completed"
            );
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub leagues_ok: usize,
    pub leagues_failed: usize,
    pub fixtures: usize,
}

/// Loads each tracked league's full season schedule so future fixtures exist.
pub struct FutureSeedJob {
    source: Arc<dyn FixtureSource>,
    store: Arc<dyn FixtureStore>,
    leagues: Vec<i64>,
    hour: u32,
    /// Pause between leagues, to stay polite with the Source
    pause: Duration,
}

impl FutureSeedJob {
    pub fn new(
        source: Arc<dyn FixtureSource>,
        store: Arc<dyn FixtureStore>,
        leagues: Vec<i64>,
        hour: u32,
        pause: Duration,
    ) -> Self {
        FutureSeedJob {
            source,
            store,
            leagues,
            hour,
            pause,
        }
    }

    pub async fn sweep(&self) -> SeedReport {
        let mut report = SeedReport::default();

        for (i, &league_id) in self.leagues.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let result = async {
                let competitions = self.source.fetch_season_schedule(league_id).await?;
                if competitions.is_empty() {
                    return Ok(0);
                }
                self.store.upsert_fixtures(&competitions).await
            }
            .await;

            match result {
                Ok(n) => {
                    report.leagues_ok += 1;
                    report.fixtures += n;
                }
                Err(cause) => {
                    report.leagues_failed += 1;
                    warn!(
                        "{}",
                        WorkerError::TransientFetch {
                            what: format!("season schedule of league {}", league_id),
                            cause,
                        }
                    );
                }
            }
        }

        report
    }

    pub async fn run(self) -> Result<()> {
        info!(
            "Future seed job started (hour={:02}:00, leagues={})",
            self.hour,
            self.leagues.len()
        );
        loop {
            sleep_until_hour("Future seed", self.hour).await?;
            let report = self.sweep().await;
            info!(
                leagues_ok = report.leagues_ok,
                leagues_failed = report.leagues_failed,
                fixtures = report.fixtures,
                "Future seed completed"
            );
        }
    }
}
