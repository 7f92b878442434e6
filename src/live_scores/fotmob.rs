use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::FixtureSource;
use crate::db::models::{Competition, Fixture, MatchEvent, MatchStatus, StandingRow, TeamInfo};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const IMAGE_BASE: &str = "https://images.fotmob.com/image_resources/logo";
static NULL: Value = Value::Null;

/// Fixture source backed by the public FotMob JSON API.
pub struct FotMob {
    http: Client,
    base_url: String,
    /// Only leagues in this set are kept from day snapshots
    target_leagues: HashSet<i64>,
}

impl FotMob {
    pub fn new(base_url: &str, target_leagues: HashSet<i64>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(FotMob {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            target_leagues,
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let url = Url::parse_with_params(&format!("{}/{}", self.base_url, path), query)
            .with_context(|| format!("Invalid FotMob URL for {}", path))?;
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!("Fetching {}", url);
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("FotMob request failed: {}", url.path()))?;

        if !resp.status().is_success() {
            anyhow::bail!("FotMob error {} on {}", resp.status(), url.path());
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse FotMob response from {}", url.path()))
    }
}

#[async_trait]
impl FixtureSource for FotMob {
    fn name(&self) -> &str {
        "FotMob"
    }

    async fn fetch_day_snapshot(&self, date: NaiveDate) -> Result<Vec<Competition>> {
        let url = self.endpoint("matches", &[("date", date.format("%Y%m%d").to_string())])?;
        let raw = self.get_json(url).await?;
        Ok(parse_day_snapshot(&raw, &self.target_leagues))
    }

    async fn fetch_fixture_events(&self, fixture_id: i64) -> Result<Vec<MatchEvent>> {
        let url = self.endpoint("matchDetails", &[("matchId", fixture_id.to_string())])?;
        let raw = self.get_json(url).await?;
        Ok(parse_match_events(&raw))
    }

    async fn fetch_standings(&self, league_id: i64) -> Result<Vec<StandingRow>> {
        let url = self.endpoint("tltable", &[("leagueId", league_id.to_string())])?;
        let raw = self.get_json(url).await?;
        Ok(parse_standings(&raw))
    }

    async fn fetch_season_schedule(&self, league_id: i64) -> Result<Vec<Competition>> {
        let url = self.endpoint("leagues", &[("id", league_id.to_string())])?;
        let raw = self.get_json(url).await?;
        Ok(parse_season_schedule(&raw, league_id))
    }
}

// ── Payload parsing ─────────────────────────────────────────────────────────────

/// Ids arrive as numbers or numeric strings depending on the endpoint.
fn as_id(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(v: &Value) -> bool {
    v.as_bool().unwrap_or(false)
}

/// Map a FotMob `status` object into the closed status set.
fn status_from_fotmob(status: &Value) -> MatchStatus {
    let reason = status["reason"]["short"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase();

    if flag(&status["cancelled"]) {
        return MatchStatus::Cancelled;
    }
    let from_reason = MatchStatus::from_code(&reason);
    if flag(&status["abandoned"])
        || flag(&status["suspended"])
        || from_reason == MatchStatus::Suspended
    {
        return MatchStatus::Suspended;
    }
    if flag(&status["finished"]) {
        return match from_reason {
            MatchStatus::ExtraTime | MatchStatus::Penalties => from_reason,
            _ => MatchStatus::FullTime,
        };
    }
    if flag(&status["started"]) {
        let clock = status["liveTime"]["short"].as_str().unwrap_or_default();
        if clock.eq_ignore_ascii_case("ht") || reason == "ht" {
            return MatchStatus::HalfTime;
        }
        return MatchStatus::Live;
    }
    MatchStatus::NotStarted
}

/// `round` may be a string, an int or an object with a name; `roundName` is the fallback.
fn extract_round(m: &Value) -> Option<String> {
    match &m["round"] {
        Value::String(s) => return Some(s.clone()),
        Value::Number(n) => return Some(n.to_string()),
        Value::Object(o) => {
            if let Some(name) = o.get("name").and_then(Value::as_str) {
                return Some(name.to_string());
            }
        }
        _ => {}
    }
    as_text(&m["roundName"])
}

fn parse_team(t: &Value) -> Option<TeamInfo> {
    let id = as_id(&t["id"])?;
    let name = t["name"].as_str().unwrap_or_default().to_string();
    Some(TeamInfo {
        id,
        abbr: name.chars().take(3).collect::<String>().to_uppercase(),
        name,
        img: Some(format!("{}/teamlogo/{}.png", IMAGE_BASE, id)),
    })
}

/// Parse one fixture. `fallback_result` builds the result when `scoreStr` is absent.
fn parse_fixture(
    m: &Value,
    league_id: i64,
    fallback_result: impl Fn(&Value) -> String,
) -> Option<Fixture> {
    let id = as_id(&m["id"])?;
    let home = parse_team(&m["home"])?;
    let away = parse_team(&m["away"])?;
    let status_obj = &m["status"];
    let status = status_from_fotmob(status_obj);

    let result = status_obj["scoreStr"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| fallback_result(m));

    let minute = if matches!(status, MatchStatus::Live | MatchStatus::HalfTime) {
        status_obj["liveTime"]["short"]
            .as_str()
            .or_else(|| status_obj["liveTime"]["long"].as_str())
            .map(str::to_string)
    } else {
        None
    };

    Some(Fixture {
        id,
        league_id,
        status,
        result: Some(result),
        kickoff_iso: status_obj["utcTime"].as_str().map(str::to_string),
        minute,
        round: extract_round(m),
        home,
        away,
    })
}

fn live_result(m: &Value) -> String {
    format!(
        "{}-{}",
        m["home"]["score"].as_i64().unwrap_or(0),
        m["away"]["score"].as_i64().unwrap_or(0)
    )
}

fn league_badge(id: i64) -> String {
    format!("{}/leaguelogo/{}.png", IMAGE_BASE, id)
}

/// Parse `/matches?date=` keeping only the target leagues.
pub fn parse_day_snapshot(raw: &Value, targets: &HashSet<i64>) -> Vec<Competition> {
    let Some(leagues) = raw["leagues"].as_array() else {
        return vec![];
    };

    leagues
        .iter()
        .filter_map(|league| {
            let id = as_id(&league["primaryId"])?;
            if !targets.contains(&id) {
                return None;
            }
            let fixtures: Vec<Fixture> = league["matches"]
                .as_array()
                .map(|ms| {
                    ms.iter()
                        .filter_map(|m| parse_fixture(m, id, live_result))
                        .collect()
                })
                .unwrap_or_default();
            if fixtures.is_empty() {
                return None;
            }
            Some(Competition {
                id,
                name: league["name"].as_str().unwrap_or("Unknown League").to_string(),
                country: league["ccode"].as_str().unwrap_or_default().to_string(),
                badge: league_badge(id),
                fixtures,
            })
        })
        .collect()
}

/// Parse `/leagues?id=` into a single competition with the whole season.
pub fn parse_season_schedule(raw: &Value, requested_league: i64) -> Vec<Competition> {
    let details = &raw["details"];
    let league_id = as_id(&details["id"]).unwrap_or(requested_league);

    let fixtures: Vec<Fixture> = raw["fixtures"]["allMatches"]
        .as_array()
        .map(|ms| {
            ms.iter()
                .filter_map(|m| parse_fixture(m, league_id, |_| "vs".to_string()))
                .collect()
        })
        .unwrap_or_default();

    if fixtures.is_empty() {
        return vec![];
    }

    vec![Competition {
        id: league_id,
        name: details["name"].as_str().unwrap_or("Unknown League").to_string(),
        country: details["country"].as_str().unwrap_or_default().to_string(),
        badge: league_badge(league_id),
        fixtures,
    }]
}

/// Parse `/matchDetails` into a flat list of events.
pub fn parse_match_events(raw: &Value) -> Vec<MatchEvent> {
    let mut facts = &raw["content"]["matchFacts"];
    if !facts.is_object() {
        facts = &raw["general"]["matchFacts"];
    }
    let Some(events) = facts["events"]["events"].as_array() else {
        return vec![];
    };

    events
        .iter()
        .map(|ev| {
            let kind = ev["type"].as_str().unwrap_or_default().to_string();
            let (home_score, away_score) = match ev["newScore"].as_array() {
                Some(s) if s.len() >= 2 => (s[0].as_i64(), s[1].as_i64()),
                _ => (ev["homeScore"].as_i64(), ev["awayScore"].as_i64()),
            };

            let mut out = MatchEvent {
                minute: ev["time"].as_i64(),
                time_str: as_text(&ev["timeStr"]),
                is_home: ev["isHome"].as_bool(),
                home_score,
                away_score,
                is_penalty_shootout: flag(&ev["isPenaltyShootoutEvent"]),
                ..Default::default()
            };

            match kind.as_str() {
                "Goal" => {
                    out.player = ev["player"]["name"].as_str().map(str::to_string);
                    out.player_id = as_id(&ev["player"]["id"]);
                    out.assist = as_text(&ev["assistInput"]);
                    out.own_goal = flag(&ev["ownGoal"]);
                }
                "Card" => {
                    out.player = ev["player"]["name"].as_str().map(str::to_string);
                    out.player_id = as_id(&ev["player"]["id"]);
                    out.card = as_text(&ev["card"]);
                }
                "Substitution" => {
                    if let Some(swap) = ev["swap"].as_array().filter(|s| s.len() >= 2) {
                        out.player_out = swap[0]["name"].as_str().map(str::to_string);
                        out.player_out_id = as_id(&swap[0]["id"]);
                        out.player_in = swap[1]["name"].as_str().map(str::to_string);
                        out.player_in_id = as_id(&swap[1]["id"]);
                    }
                }
                "Half" | "AddedTime" => {
                    out.label = as_text(&ev["halfStrShort"]).or_else(|| as_text(&ev["minutesAddedStr"]));
                }
                _ => {}
            }

            out.kind = kind;
            out
        })
        .collect()
}

/// Parse `/tltable`. Handles the plain, multi-table and composite layouts.
pub fn parse_standings(raw: &Value) -> Vec<StandingRow> {
    let block = match raw {
        Value::Array(items) => items.first().map(|b| &b["data"]).unwrap_or(&NULL),
        _ if raw["data"].is_object() => &raw["data"],
        _ => raw,
    };

    let table = if let Some(first) = block["tables"].as_array().and_then(|t| t.first()) {
        first["table"]["all"].as_array()
    } else if block["table"].is_object() {
        block["table"]["all"].as_array()
    } else {
        block["composite"].as_array()
    };
    let Some(table) = table else {
        return vec![];
    };

    let forms = &block["teamForm"];

    table
        .iter()
        .filter_map(|team| {
            let team_id = as_id(&team["id"])?;
            let (goals_for, goals_against): (i64, i64) = team["scoresStr"]
                .as_str()
                .and_then(|s| s.split_once('-'))
                .and_then(|(f, a)| Some((f.trim().parse().ok()?, a.trim().parse().ok()?)))
                .unwrap_or((0, 0));

            Some(StandingRow {
                position: team["idx"].as_i64(),
                team_id,
                name: team["name"].as_str().unwrap_or_default().to_string(),
                short_name: team["shortName"].as_str().map(str::to_string),
                played: team["played"].as_i64(),
                wins: team["wins"].as_i64(),
                draws: team["draws"].as_i64(),
                losses: team["losses"].as_i64(),
                points: team["pts"].as_i64(),
                goals_for,
                goals_against,
                goal_difference: team["goalConDiff"].as_i64(),
                form: forms
                    .get(team_id.to_string())
                    .cloned()
                    .unwrap_or_else(|| Value::Array(vec![])),
            })
        })
        .collect()
}
