//! In-memory Source, Store and Settler used by the worker tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::db::models::{
    Competition, Fixture, MatchEvent, MatchStatus, StandingRow, TeamInfo,
};
use crate::db::FixtureStore;
use crate::live_scores::FixtureSource;
use crate::points::Settler;

pub fn fixture(id: i64, league_id: i64, status: MatchStatus, result: &str) -> Fixture {
    let team = |id: i64, name: &str| TeamInfo {
        id,
        name: name.into(),
        abbr: name[..3].to_uppercase(),
        img: None,
    };
    Fixture {
        id,
        league_id,
        status,
        result: Some(result.into()),
        kickoff_iso: None,
        minute: None,
        round: None,
        home: team(id * 10, "Home"),
        away: team(id * 10 + 1, "Away"),
    }
}

pub fn competition(id: i64, fixtures: Vec<Fixture>) -> Competition {
    Competition {
        id,
        name: format!("League {}", id),
        country: "ENG".into(),
        badge: format!("{}.png", id),
        fixtures,
    }
}

#[derive(Debug, Default, Clone)]
pub struct SourceCalls {
    pub days: Vec<NaiveDate>,
    pub events: Vec<i64>,
    pub standings: Vec<i64>,
    pub seasons: Vec<i64>,
}

#[derive(Default)]
pub struct FakeSource {
    /// Responses for day snapshots without a dated entry, consumed in order
    live: Mutex<VecDeque<Result<Vec<Competition>>>>,
    days: HashMap<NaiveDate, Vec<Competition>>,
    failing_days: HashSet<NaiveDate>,
    empty_events: HashSet<i64>,
    failing_events: HashSet<i64>,
    failing_leagues: HashSet<i64>,
    seasons: HashMap<i64, Vec<Competition>>,
    calls: Mutex<SourceCalls>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live(self, competitions: Vec<Competition>) -> Self {
        self.live.lock().unwrap().push_back(Ok(competitions));
        self
    }

    pub fn with_live_error(self) -> Self {
        self.live
            .lock()
            .unwrap()
            .push_back(Err(anyhow!("snapshot unavailable")));
        self
    }

    pub fn with_day(mut self, date: NaiveDate, competitions: Vec<Competition>) -> Self {
        self.days.insert(date, competitions);
        self
    }

    pub fn failing_day(mut self, date: NaiveDate) -> Self {
        self.failing_days.insert(date);
        self
    }

    pub fn no_events(mut self, ids: &[i64]) -> Self {
        self.empty_events.extend(ids);
        self
    }

    pub fn failing_events(mut self, ids: &[i64]) -> Self {
        self.failing_events.extend(ids);
        self
    }

    pub fn failing_leagues(mut self, ids: &[i64]) -> Self {
        self.failing_leagues.extend(ids);
        self
    }

    pub fn with_season(mut self, league_id: i64, competitions: Vec<Competition>) -> Self {
        self.seasons.insert(league_id, competitions);
        self
    }

    pub fn calls(&self) -> SourceCalls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FixtureSource for FakeSource {
    fn name(&self) -> &str {
        "Fake"
    }

    async fn fetch_day_snapshot(&self, date: NaiveDate) -> Result<Vec<Competition>> {
        self.calls.lock().unwrap().days.push(date);
        if self.failing_days.contains(&date) {
            return Err(anyhow!("no data for {}", date));
        }
        if let Some(comps) = self.days.get(&date) {
            return Ok(comps.clone());
        }
        let next = self.live.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(vec![]))
    }

    async fn fetch_fixture_events(&self, fixture_id: i64) -> Result<Vec<MatchEvent>> {
        self.calls.lock().unwrap().events.push(fixture_id);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_events.contains(&fixture_id) {
            return Err(anyhow!("details unavailable for {}", fixture_id));
        }
        if self.empty_events.contains(&fixture_id) {
            return Ok(vec![]);
        }
        Ok(vec![MatchEvent {
            kind: "Goal".into(),
            minute: Some(10),
            ..Default::default()
        }])
    }

    async fn fetch_standings(&self, league_id: i64) -> Result<Vec<StandingRow>> {
        self.calls.lock().unwrap().standings.push(league_id);
        if self.failing_leagues.contains(&league_id) {
            return Err(anyhow!("table unavailable for {}", league_id));
        }
        Ok(vec![StandingRow {
            position: Some(1),
            team_id: 1,
            name: "Leader".into(),
            short_name: None,
            played: Some(1),
            wins: Some(1),
            draws: Some(0),
            losses: Some(0),
            points: Some(3),
            goals_for: 1,
            goals_against: 0,
            goal_difference: Some(1),
            form: serde_json::json!([]),
        }])
    }

    async fn fetch_season_schedule(&self, league_id: i64) -> Result<Vec<Competition>> {
        self.calls.lock().unwrap().seasons.push(league_id);
        if self.failing_leagues.contains(&league_id) {
            return Err(anyhow!("season unavailable for {}", league_id));
        }
        Ok(self.seasons.get(&league_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct StoreState {
    fixtures: HashMap<i64, Fixture>,
    fixture_upserts: usize,
    standings: HashMap<i64, Vec<StandingRow>>,
    events: HashMap<i64, Vec<MatchEvent>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixture(&self, id: i64) -> Option<Fixture> {
        self.state.lock().unwrap().fixtures.get(&id).cloned()
    }

    pub fn fixture_upserts(&self) -> usize {
        self.state.lock().unwrap().fixture_upserts
    }

    pub fn events_stored_for(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.lock().unwrap().events.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn standings_stored_for(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.lock().unwrap().standings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl FixtureStore for MemoryStore {
    async fn upsert_fixtures(&self, competitions: &[Competition]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.fixture_upserts += 1;
        let mut n = 0;
        for f in competitions.iter().flat_map(|c| c.fixtures.iter()) {
            state.fixtures.insert(f.id, f.clone());
            n += 1;
        }
        Ok(n)
    }

    async fn upsert_standings(&self, league_id: i64, rows: &[StandingRow]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .standings
            .insert(league_id, rows.to_vec());
        Ok(())
    }

    async fn upsert_fixture_events(&self, fixture_id: i64, events: &[MatchEvent]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .events
            .insert(fixture_id, events.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSettler {
    failing: HashSet<i64>,
    calls: Mutex<Vec<(i64, u32, u32)>>,
}

impl RecordingSettler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[i64]) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn calls(&self) -> Vec<(i64, u32, u32)> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_unstable();
        calls
    }
}

#[async_trait]
impl Settler for RecordingSettler {
    async fn settle(&self, fixture_id: i64, home_score: u32, away_score: u32) -> Result<usize> {
        self.calls
            .lock()
            .unwrap()
            .push((fixture_id, home_score, away_score));
        if self.failing.contains(&fixture_id) {
            return Err(anyhow!("settler down"));
        }
        Ok(1)
    }
}
