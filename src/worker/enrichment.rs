use anyhow::Result;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::db::FixtureStore;
use crate::error::WorkerError;
use crate::live_scores::FixtureSource;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub attempted: usize,
    pub upserted: usize,
    /// Fetched fine but the Source had no events yet
    pub empty: usize,
    pub failed: Vec<i64>,
}

enum Enriched {
    Upserted(usize),
    Empty,
}

async fn enrich_one(
    source: &dyn FixtureSource,
    store: &dyn FixtureStore,
    fixture_id: i64,
) -> Result<Enriched> {
    let events = source.fetch_fixture_events(fixture_id).await?;
    if events.is_empty() {
        return Ok(Enriched::Empty);
    }
    store.upsert_fixture_events(fixture_id, &events).await?;
    Ok(Enriched::Upserted(events.len()))
}

/// Fetch and store events for every fixture, at most `limit` requests in flight.
///
/// Each id is attempted exactly once. Failures are logged and collected in the
/// report; they never abort the batch.
pub async fn enrich_fixtures(
    source: &dyn FixtureSource,
    store: &dyn FixtureStore,
    fixture_ids: &[i64],
    limit: usize,
) -> EnrichmentReport {
    let mut report = EnrichmentReport::default();
    if fixture_ids.is_empty() {
        return report;
    }

    let limiter = Semaphore::new(limit.max(1));
    let fetches = fixture_ids.iter().map(|&id| {
        let limiter = &limiter;
        async move {
            let outcome = match limiter.acquire().await {
                Ok(_permit) => enrich_one(source, store, id).await,
                Err(e) => Err(e.into()),
            };
            (id, outcome)
        }
    });

    for (id, outcome) in join_all(fetches).await {
        report.attempted += 1;
        match outcome {
            Ok(Enriched::Upserted(n)) => {
                debug!("Stored {} events for fixture {}", n, id);
                report.upserted += 1;
            }
            Ok(Enriched::Empty) => report.empty += 1,
            Err(cause) => {
                let err = WorkerError::TransientFetch {
                    what: format!("events of fixture {}", id),
                    cause,
                };
                warn!("{}", err);
                report.failed.push(id);
            }
        }
    }

    report
}

/// Refresh standings for each league, one at a time. Returns how many were stored.
pub async fn refresh_standings(
    source: &dyn FixtureSource,
    store: &dyn FixtureStore,
    leagues: &BTreeSet<i64>,
) -> usize {
    let mut refreshed = 0;
    for &league_id in leagues {
        let result = async {
            let rows = source.fetch_standings(league_id).await?;
            if rows.is_empty() {
                return Ok(false);
            }
            store.upsert_standings(league_id, &rows).await?;
            Ok::<_, anyhow::Error>(true)
        }
        .await;

        match result {
            Ok(true) => refreshed += 1,
            Ok(false) => debug!("No standings returned for league {}", league_id),
            Err(cause) => warn!(
                "{}",
                WorkerError::TransientFetch {
                    what: format!("standings of league {}", league_id),
                    cause,
                }
            ),
        }
    }
    refreshed
}
