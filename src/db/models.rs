use serde::{Deserialize, Serialize};

/// Closed set of fixture states. Every Source payload is normalised into this
/// enum once, at ingestion; nothing downstream looks at raw status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchStatus {
    #[default]
    #[serde(rename = "NS")]
    NotStarted,
    #[serde(rename = "LIVE")]
    Live,
    #[serde(rename = "HT")]
    HalfTime,
    #[serde(rename = "FT")]
    FullTime,
    /// Finished after extra time
    #[serde(rename = "AET")]
    ExtraTime,
    /// Finished after a penalty shootout
    #[serde(rename = "AP")]
    Penalties,
    #[serde(rename = "Canc.")]
    Cancelled,
    #[serde(rename = "Susp.")]
    Suspended,
}

impl MatchStatus {
    /// Short code stored in the `matches.status` column.
    pub fn code(self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "NS",
            MatchStatus::Live => "LIVE",
            MatchStatus::HalfTime => "HT",
            MatchStatus::FullTime => "FT",
            MatchStatus::ExtraTime => "AET",
            MatchStatus::Penalties => "AP",
            MatchStatus::Cancelled => "Canc.",
            MatchStatus::Suspended => "Susp.",
        }
    }

    /// Parse a short status code. Unknown or empty codes become `NotStarted`.
    pub fn from_code(s: &str) -> MatchStatus {
        match s.trim().to_lowercase().as_str() {
            "live" | "1h" | "2h" | "ot" | "et" => MatchStatus::Live,
            "ht" | "half time" | "halftime" => MatchStatus::HalfTime,
            "ft" | "finished" | "match finished" => MatchStatus::FullTime,
            "aet" => MatchStatus::ExtraTime,
            "ap" | "pen" | "pens" => MatchStatus::Penalties,
            "canc." | "canc" | "cancelled" => MatchStatus::Cancelled,
            "susp." | "susp" | "suspended" | "ab" | "abandoned" => MatchStatus::Suspended,
            _ => MatchStatus::NotStarted,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            MatchStatus::FullTime | MatchStatus::ExtraTime | MatchStatus::Penalties
        )
    }

    pub fn is_live(self) -> bool {
        self == MatchStatus::Live
    }

    /// In play, including the half-time break.
    pub fn is_active(self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::HalfTime)
    }
}

/// Parse a result string such as `"2-1"` or `"2 - 1"` into `(home, away)`.
///
/// All Unicode whitespace is stripped first, non-breaking spaces included. The
/// remainder must be two non-empty ASCII digit runs joined by exactly one `-`;
/// anything else (`"vs"`, `"2–1"`, `"1-1-0"`) is `None`.
pub fn parse_score(raw: &str) -> Option<(u32, u32)> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.matches('-').count() != 1 {
        return None;
    }
    let (left, right) = cleaned.split_once('-')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(left) || !all_digits(right) {
        return None;
    }
    Some((left.parse().ok()?, right.parse().ok()?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: i64,
    pub name: String,
    /// Three-letter abbreviation derived from the name
    pub abbr: String,
    pub img: Option<String>,
}

/// One fixture as reported by the Source at poll time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub league_id: i64,
    pub status: MatchStatus,
    /// Raw result string, e.g. "2 - 1" or "vs"
    pub result: Option<String>,
    pub kickoff_iso: Option<String>,
    /// Live clock label, e.g. "67'" or "HT"
    pub minute: Option<String>,
    pub round: Option<String>,
    pub home: TeamInfo,
    pub away: TeamInfo,
}

impl Fixture {
    /// Numeric score if the result string is strictly parseable.
    pub fn score(&self) -> Option<(u32, u32)> {
        self.result.as_deref().and_then(parse_score)
    }
}

/// A league with the fixtures the Source returned for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub badge: String,
    pub fixtures: Vec<Fixture>,
}

/// A single in-match event (goal, card, substitution, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchEvent {
    /// "Goal" | "Card" | "Substitution" | "Half" | "AddedTime" | ...
    pub kind: String,
    pub minute: Option<i64>,
    /// Display time, e.g. "45+2"
    pub time_str: Option<String>,
    pub is_home: Option<bool>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub is_penalty_shootout: bool,
    pub player: Option<String>,
    pub player_id: Option<i64>,
    pub assist: Option<String>,
    pub own_goal: bool,
    /// "Yellow" | "Red"
    pub card: Option<String>,
    pub player_in: Option<String>,
    pub player_in_id: Option<i64>,
    pub player_out: Option<String>,
    pub player_out_id: Option<i64>,
    /// "HT"/"FT" for half markers, "+3" for added time
    pub label: Option<String>,
}

/// One row of a league table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub position: Option<i64>,
    pub team_id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub played: Option<i64>,
    pub wins: Option<i64>,
    pub draws: Option<i64>,
    pub losses: Option<i64>,
    pub points: Option<i64>,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_difference: Option<i64>,
    /// Recent results exactly as the Source reports them
    pub form: serde_json::Value,
}

/// A user's prediction for a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub user_id: String,
    pub match_id: i64,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub points: Option<i64>,
    /// "exact" | "win" | "lose"
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score_accepts_plain_and_spaced() {
        assert_eq!(parse_score("2-1"), Some((2, 1)));
        assert_eq!(parse_score("2 - 1"), Some((2, 1)));
        assert_eq!(parse_score(" 10 -0 "), Some((10, 0)));
    }

    #[test]
    fn test_parse_score_strips_unicode_whitespace() {
        assert_eq!(parse_score("2\u{a0}-\u{a0}1"), Some((2, 1)));
        assert_eq!(parse_score("\t3-\n0"), Some((3, 0)));
    }

    #[test]
    fn test_parse_score_rejects_malformed() {
        assert_eq!(parse_score("vs"), None);
        assert_eq!(parse_score("2–1"), None);
        assert_eq!(parse_score("1-1-0"), None);
        assert_eq!(parse_score("-1"), None);
        assert_eq!(parse_score("2-"), None);
        assert_eq!(parse_score("a-1"), None);
        assert_eq!(parse_score("+2-1"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MatchStatus::from_code("FT"), MatchStatus::FullTime);
        assert_eq!(MatchStatus::from_code("Pen"), MatchStatus::Penalties);
        assert_eq!(MatchStatus::from_code("Canc."), MatchStatus::Cancelled);
        assert_eq!(MatchStatus::from_code("???"), MatchStatus::NotStarted);
        assert_eq!(MatchStatus::from_code(""), MatchStatus::NotStarted);
        assert_eq!(MatchStatus::from_code(MatchStatus::ExtraTime.code()), MatchStatus::ExtraTime);
    }

    #[test]
    fn test_finished_kinds() {
        assert!(MatchStatus::FullTime.is_finished());
        assert!(MatchStatus::ExtraTime.is_finished());
        assert!(MatchStatus::Penalties.is_finished());
        assert!(!MatchStatus::Live.is_finished());
        assert!(!MatchStatus::Cancelled.is_finished());
        assert!(MatchStatus::Live.is_live());
        assert!(!MatchStatus::HalfTime.is_live());
        assert!(MatchStatus::HalfTime.is_active());
        assert!(MatchStatus::Live.is_active());
        assert!(!MatchStatus::FullTime.is_active());
        assert!(!MatchStatus::NotStarted.is_active());
    }
}
