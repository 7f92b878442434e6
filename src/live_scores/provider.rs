use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::models::{Competition, MatchEvent, StandingRow};

/// Read-only fixture data source. Every call is an idempotent query.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// All tracked competitions with the fixtures scheduled on `date`.
    async fn fetch_day_snapshot(&self, date: NaiveDate) -> Result<Vec<Competition>>;

    /// In-match events (goals, cards, substitutions) of one fixture.
    async fn fetch_fixture_events(&self, fixture_id: i64) -> Result<Vec<MatchEvent>>;

    /// Ordered league table.
    async fn fetch_standings(&self, league_id: i64) -> Result<Vec<StandingRow>>;

    /// Every fixture of the current season of a league, past and future.
    async fn fetch_season_schedule(&self, league_id: i64) -> Result<Vec<Competition>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
