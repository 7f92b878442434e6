use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
pub mod store;
use models::*;

pub use store::FixtureStore;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────

    /// Upsert competitions and their fixtures in one transaction.
    /// Returns the number of fixtures written. Stored events are never cleared.
    pub fn upsert_competitions(&self, competitions: &[Competition]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut total = 0usize;

        for comp in competitions {
            tx.execute(
                "INSERT INTO competitions (id, name, country, badge, updated_at)
                 VALUES (?1,?2,?3,?4,?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name=excluded.name,
                    country=excluded.country,
                    badge=excluded.badge,
                    updated_at=excluded.updated_at",
                params![comp.id, comp.name, comp.country, comp.badge, now],
            )?;

            for fixture in &comp.fixtures {
                // Numeric columns only carry a strictly parsed score
                let (home_score, away_score) = fixture.score().unwrap_or((0, 0));
                tx.execute(
                    "INSERT INTO matches (
                        id, competition_id, status, kickoff, minute, round,
                        home_team_id, away_team_id, home_score, away_score, result,
                        home_team_data, away_team_data, updated_at
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                     ON CONFLICT(id) DO UPDATE SET
                        competition_id=excluded.competition_id,
                        status=excluded.status,
                        kickoff=excluded.kickoff,
                        minute=excluded.minute,
                        round=excluded.round,
                        home_team_id=excluded.home_team_id,
                        away_team_id=excluded.away_team_id,
                        home_score=excluded.home_score,
                        away_score=excluded.away_score,
                        result=excluded.result,
                        home_team_data=excluded.home_team_data,
                        away_team_data=excluded.away_team_data,
                        updated_at=excluded.updated_at",
                    params![
                        fixture.id,
                        comp.id,
                        fixture.status.code(),
                        fixture.kickoff_iso,
                        fixture.minute,
                        fixture.round,
                        fixture.home.id,
                        fixture.away.id,
                        home_score,
                        away_score,
                        fixture.result,
                        serde_json::to_string(&fixture.home)?,
                        serde_json::to_string(&fixture.away)?,
                        now,
                    ],
                )?;
                total += 1;
            }
        }

        tx.commit()?;
        Ok(total)
    }

    /// Replace the stored events of a fixture. Unknown fixtures are ignored.
    pub fn save_fixture_events(&self, fixture_id: i64, events: &[MatchEvent]) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE matches SET events=?1, updated_at=?2 WHERE id=?3",
            params![serde_json::to_string(events)?, Utc::now(), fixture_id],
        )?;
        Ok(())
    }

    // ── Standings ─────────────────────────────────────────────────────────────

    /// Replace the standings table of a league, creating the league row if needed.
    pub fn save_standings(&self, league_id: i64, rows: &[StandingRow]) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO competitions (id, name, standings, updated_at)
             VALUES (?1, '', ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                standings=excluded.standings,
                updated_at=excluded.updated_at",
            params![league_id, serde_json::to_string(rows)?, Utc::now()],
        )?;
        Ok(())
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// List every prediction placed on a fixture
    pub fn list_predictions_for_match(&self, match_id: i64) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, match_id, home_score, away_score, points, status
             FROM predictions WHERE match_id=?1 ORDER BY id",
        )?;
        let predictions = stmt
            .query_map(params![match_id], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(predictions)
    }

    /// Write awarded points for a batch of predictions atomically
    pub fn apply_prediction_points(&self, awards: &[(i64, i64, &str)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut updated = 0usize;
        for (id, points, status) in awards {
            updated += tx.execute(
                "UPDATE predictions SET points=?1, status=?2, updated_at=?3 WHERE id=?4",
                params![points, status, now, id],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    #[cfg(test)]
    pub fn insert_prediction(
        &self,
        user_id: &str,
        match_id: i64,
        home_score: i64,
        away_score: i64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO predictions (user_id, match_id, home_score, away_score, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![user_id, match_id, home_score, away_score, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub fn get_match_row(&self, id: i64) -> Result<Option<(String, i64, i64, Option<String>)>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, home_score, away_score, events FROM matches WHERE id=?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        Ok(row)
    }

    #[cfg(test)]
    pub fn get_standings(&self, league_id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT standings FROM competitions WHERE id=?1",
                params![league_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row.flatten())
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        match_id: row.get(2)?,
        home_score: row.get(3)?,
        away_score: row.get(4)?,
        points: row.get(5)?,
        status: row.get(6)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS competitions (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL DEFAULT '',
    country     TEXT,
    badge       TEXT,
    standings   TEXT,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS matches (
    id              INTEGER PRIMARY KEY,
    competition_id  INTEGER NOT NULL,
    status          TEXT    NOT NULL DEFAULT 'NS',
    kickoff         TEXT,
    minute          TEXT,
    round           TEXT,
    home_team_id    INTEGER NOT NULL,
    away_team_id    INTEGER NOT NULL,
    home_score      INTEGER NOT NULL DEFAULT 0,
    away_score      INTEGER NOT NULL DEFAULT 0,
    result          TEXT,
    home_team_data  TEXT    NOT NULL,
    away_team_data  TEXT    NOT NULL,
    events          TEXT,
    updated_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS predictions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT    NOT NULL,
    match_id    INTEGER NOT NULL,
    home_score  INTEGER,
    away_score  INTEGER,
    points      INTEGER,
    status      TEXT,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_matches_competition ON matches(competition_id);
CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id);
"#;
