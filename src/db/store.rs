use anyhow::Result;
use async_trait::async_trait;

use super::models::{Competition, MatchEvent, StandingRow};
use super::Database;

/// Idempotent persistence operations used by the background jobs.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    /// Upsert competitions and fixtures. Returns the number of fixtures written.
    async fn upsert_fixtures(&self, competitions: &[Competition]) -> Result<usize>;

    async fn upsert_standings(&self, league_id: i64, rows: &[StandingRow]) -> Result<()>;

    async fn upsert_fixture_events(&self, fixture_id: i64, events: &[MatchEvent]) -> Result<()>;
}

// SQLite calls block, so they run on the blocking pool.
#[async_trait]
impl FixtureStore for Database {
    async fn upsert_fixtures(&self, competitions: &[Competition]) -> Result<usize> {
        let db = self.clone();
        let competitions = competitions.to_vec();
        tokio::task::spawn_blocking(move || db.upsert_competitions(&competitions)).await?
    }

    async fn upsert_standings(&self, league_id: i64, rows: &[StandingRow]) -> Result<()> {
        let db = self.clone();
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || db.save_standings(league_id, &rows)).await?
    }

    async fn upsert_fixture_events(&self, fixture_id: i64, events: &[MatchEvent]) -> Result<()> {
        let db = self.clone();
        let events = events.to_vec();
        tokio::task::spawn_blocking(move || db.save_fixture_events(fixture_id, &events)).await?
    }
}
