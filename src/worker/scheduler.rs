//! Pending settlements and their retry schedule.
//!
//! `SettlementScheduler` is the plain table. It is owned by a single task
//! (`SchedulerActor`); the live monitor, the backfill sweep, the settlement
//! job and the HTTP API talk to it through a cloneable `SchedulerHandle`:
//!
//! ```text
//!  LiveMonitor ─┐
//!  Backfill ────┼── mpsc<Command> ──▶ SchedulerActor (owns the table)
//!  Settlement ──┤                        │
//!  HTTP API ────┘ ◀──── oneshot reply ───┘
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::db::models::parse_score;
use crate::error::WorkerError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SettlementEntry {
    home: u32,
    away: u32,
    /// Completed settlement attempts
    attempt: usize,
    next_due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Created,
    /// Score replaced; attempt count and due time kept
    Updated,
    /// Result string not strictly parseable; nothing scheduled
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Rescheduled { attempt: usize, delay: Duration },
    Retired,
    Missing,
}

/// An entry whose due time has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSettlement {
    pub fixture_id: i64,
    pub home: u32,
    pub away: u32,
    pub attempt: usize,
}

/// Read-only view of an entry for the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSettlement {
    pub fixture_id: i64,
    pub home_score: u32,
    pub away_score: u32,
    pub attempt: usize,
    pub due_in_secs: u64,
}

/// At most one entry per fixture id.
#[derive(Debug)]
pub struct SettlementScheduler {
    backoff: Vec<Duration>,
    entries: HashMap<i64, SettlementEntry>,
}

impl SettlementScheduler {
    pub fn new(backoff: Vec<Duration>) -> Self {
        SettlementScheduler {
            backoff,
            entries: HashMap::new(),
        }
    }

    /// Queue a fixture for settlement, due immediately.
    ///
    /// An already queued fixture only gets its score replaced.
    pub fn schedule_or_update(&mut self, fixture_id: i64, raw_result: &str, now: Instant) -> ScheduleOutcome {
        let Some((home, away)) = parse_score(raw_result) else {
            return ScheduleOutcome::Malformed;
        };

        if let Some(existing) = self.entries.get_mut(&fixture_id) {
            existing.home = home;
            existing.away = away;
            return ScheduleOutcome::Updated;
        }

        self.entries.insert(
            fixture_id,
            SettlementEntry {
                home,
                away,
                attempt: 0,
                next_due: now,
            },
        );
        ScheduleOutcome::Created
    }

    /// Every entry due at `now`. Entries stay queued until advanced.
    pub fn due_entries(&self, now: Instant) -> Vec<DueSettlement> {
        self.entries
            .iter()
            .filter(|(_, e)| e.next_due <= now)
            .map(|(id, e)| DueSettlement {
                fixture_id: *id,
                home: e.home,
                away: e.away,
                attempt: e.attempt,
            })
            .collect()
    }

    /// Record a finished attempt: push the entry back by the next backoff
    /// step, or drop it once the backoff list is exhausted.
    pub fn advance_or_retire(&mut self, fixture_id: i64, now: Instant) -> AdvanceOutcome {
        let Some(entry) = self.entries.get_mut(&fixture_id) else {
            return AdvanceOutcome::Missing;
        };

        match self.backoff.get(entry.attempt) {
            Some(&delay) => {
                entry.attempt += 1;
                entry.next_due = now + delay;
                AdvanceOutcome::Rescheduled {
                    attempt: entry.attempt,
                    delay,
                }
            }
            None => {
                self.entries.remove(&fixture_id);
                AdvanceOutcome::Retired
            }
        }
    }

    pub fn pending(&self, now: Instant) -> Vec<PendingSettlement> {
        let mut rows: Vec<PendingSettlement> = self
            .entries
            .iter()
            .map(|(id, e)| PendingSettlement {
                fixture_id: *id,
                home_score: e.home,
                away_score: e.away,
                attempt: e.attempt,
                due_in_secs: e.next_due.saturating_duration_since(now).as_secs(),
            })
            .collect();
        rows.sort_by_key(|r| (r.due_in_secs, r.fixture_id));
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── Owner task ─────────────────────────────────────────────────────────────────

enum Command {
    Schedule {
        fixture_id: i64,
        raw_result: String,
        reply: oneshot::Sender<ScheduleOutcome>,
    },
    Due {
        reply: oneshot::Sender<Vec<DueSettlement>>,
    },
    Advance {
        fixture_id: i64,
        reply: oneshot::Sender<AdvanceOutcome>,
    },
    Pending {
        reply: oneshot::Sender<Vec<PendingSettlement>>,
    },
}

/// Cloneable client of the scheduler task.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

/// Task that exclusively owns the settlement table.
pub struct SchedulerActor {
    table: SettlementScheduler,
    rx: mpsc::Receiver<Command>,
}

/// Create the scheduler handle and the task that serves it.
pub fn settlement_channel(backoff: Vec<Duration>) -> (SchedulerHandle, SchedulerActor) {
    let (tx, rx) = mpsc::channel(256);
    (
        SchedulerHandle { tx },
        SchedulerActor {
            table: SettlementScheduler::new(backoff),
            rx,
        },
    )
}

impl SchedulerActor {
    /// Serve commands until every handle is dropped.
    pub async fn run(mut self) {
        info!("Settlement scheduler started (backoff={:?})", self.table.backoff);

        while let Some(cmd) = self.rx.recv().await {
            let now = Instant::now();
            // A dropped reply receiver just means the caller went away
            match cmd {
                Command::Schedule {
                    fixture_id,
                    raw_result,
                    reply,
                } => {
                    let outcome = self.table.schedule_or_update(fixture_id, &raw_result, now);
                    debug!("Schedule fixture {} ({}): {:?}", fixture_id, raw_result, outcome);
                    let _ = reply.send(outcome);
                }
                Command::Due { reply } => {
                    let _ = reply.send(self.table.due_entries(now));
                }
                Command::Advance { fixture_id, reply } => {
                    let _ = reply.send(self.table.advance_or_retire(fixture_id, now));
                }
                Command::Pending { reply } => {
                    let _ = reply.send(self.table.pending(now));
                }
            }
        }

        info!(
            "Settlement scheduler stopped with {} pending entries",
            self.table.len()
        );
    }
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| WorkerError::SchedulerClosed)?;
        rx.await.map_err(|_| WorkerError::SchedulerClosed)
    }

    pub async fn schedule_or_update(
        &self,
        fixture_id: i64,
        raw_result: &str,
    ) -> Result<ScheduleOutcome, WorkerError> {
        let raw_result = raw_result.to_string();
        self.request(|reply| Command::Schedule {
            fixture_id,
            raw_result,
            reply,
        })
        .await
    }

    pub async fn due_entries(&self) -> Result<Vec<DueSettlement>, WorkerError> {
        self.request(|reply| Command::Due { reply }).await
    }

    pub async fn advance_or_retire(&self, fixture_id: i64) -> Result<AdvanceOutcome, WorkerError> {
        self.request(|reply| Command::Advance { fixture_id, reply })
            .await
    }

    pub async fn pending(&self) -> Result<Vec<PendingSettlement>, WorkerError> {
        self.request(|reply| Command::Pending { reply }).await
    }
}
