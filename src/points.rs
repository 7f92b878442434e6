//! Prediction scoring once a fixture has a final score.
//!
//! Scoring rules:
//! - exact score: 3 points (`exact`)
//! - right outcome (home win / draw / away win): 1 point (`win`)
//! - anything else: 0 points (`lose`)

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::db::Database;

/// Recomputes outcome-dependent records for a finished fixture.
///
/// Implementations must be idempotent: settling the same fixture twice with
/// the same score leaves the same state behind.
#[async_trait]
pub trait Settler: Send + Sync {
    /// Returns the number of records updated.
    async fn settle(&self, fixture_id: i64, home_score: u32, away_score: u32) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub points: i64,
    pub status: &'static str,
}

/// Score a single prediction against the final result.
pub fn score_prediction(pred_home: i64, pred_away: i64, real_home: i64, real_away: i64) -> Award {
    if pred_home == real_home && pred_away == real_away {
        Award { points: 3, status: "exact" }
    } else if pred_home.cmp(&pred_away) == real_home.cmp(&real_away) {
        Award { points: 1, status: "win" }
    } else {
        Award { points: 0, status: "lose" }
    }
}

/// Settler that rescores every prediction of the fixture in the SQLite store.
#[derive(Clone)]
pub struct PointsSettler {
    db: Database,
}

impl PointsSettler {
    pub fn new(db: Database) -> Self {
        PointsSettler { db }
    }

    fn settle_blocking(&self, fixture_id: i64, home: i64, away: i64) -> Result<usize> {
        let predictions = self.db.list_predictions_for_match(fixture_id)?;
        if predictions.is_empty() {
            debug!("No predictions for fixture {}", fixture_id);
            return Ok(0);
        }

        let awards: Vec<(i64, i64, &str)> = predictions
            .iter()
            .map(|p| match (p.home_score, p.away_score) {
                (Some(ph), Some(pa)) => {
                    let award = score_prediction(ph, pa, home, away);
                    (p.id, award.points, award.status)
                }
                // Incomplete predictions can never score
                _ => (p.id, 0, "lose"),
            })
            .collect();

        let updated = self.db.apply_prediction_points(&awards)?;
        let exact = awards.iter().filter(|(_, pts, _)| *pts == 3).count();
        info!(
            "Settled fixture {} ({}-{}): {} predictions, {} exact",
            fixture_id, home, away, updated, exact
        );
        Ok(updated)
    }
}

#[async_trait]
impl Settler for PointsSettler {
    async fn settle(&self, fixture_id: i64, home_score: u32, away_score: u32) -> Result<usize> {
        let settler = self.clone();
        tokio::task::spawn_blocking(move || {
            settler.settle_blocking(fixture_id, home_score as i64, away_score as i64)
        })
        .await?
    }
}
