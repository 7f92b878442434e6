use std::collections::HashMap;

use crate::db::models::MatchStatus;

/// How a fixture's observed state changed since the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Never observed before and not finished
    FirstSeen,
    /// Same status and result as last time
    Unchanged,
    /// Entered a finished status, or its finished result changed
    BecameFinished,
    /// Changed while in the live status
    StillActive,
    /// Any other change
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ObservedState {
    status: MatchStatus,
    result: Option<String>,
    league_id: i64,
}

/// Last observed state per fixture id.
///
/// Owned by the live monitor alone. Entries are never evicted.
#[derive(Debug, Default)]
pub struct MatchStateTracker {
    states: HashMap<i64, ObservedState>,
}

impl MatchStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the new observation against the stored one, then overwrite it.
    pub fn observe(
        &mut self,
        fixture_id: i64,
        status: MatchStatus,
        result: Option<&str>,
        league_id: i64,
    ) -> Transition {
        let next = ObservedState {
            status,
            result: result.map(str::to_string),
            league_id,
        };
        let transition = classify(self.states.get(&fixture_id), &next);
        self.states.insert(fixture_id, next);
        transition
    }

    /// League the fixture was last seen in.
    pub fn league_of(&self, fixture_id: i64) -> Option<i64> {
        self.states.get(&fixture_id).map(|s| s.league_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
}

fn classify(prev: Option<&ObservedState>, next: &ObservedState) -> Transition {
    let finished_now = next.status.is_finished();
    match prev {
        None if finished_now => Transition::BecameFinished,
        None => Transition::FirstSeen,
        Some(p) if finished_now && (!p.status.is_finished() || p.result != next.result) => {
            Transition::BecameFinished
        }
        Some(p) if p.status == next.status && p.result == next.result => Transition::Unchanged,
        Some(_) if next.status.is_live() => Transition::StillActive,
        Some(_) => Transition::Other,
    }
}
