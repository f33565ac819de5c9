use crate::round::Round;
use crate::types::{RafflePhase, Timestamp};
use serde::{Deserialize, Serialize};

/// Result of a readiness check, with each condition kept separately for diagnostics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpkeepCheck {
    pub time_passed: bool,
    pub is_open: bool,
    pub has_balance: bool,
    pub has_players: bool,
}

impl UpkeepCheck {
    /// Evaluate the round at `now`. A clock behind `last_opened_at` counts as no time passed.
    pub fn evaluate(round: &Round, now: Timestamp) -> Self {
        Self {
            time_passed: now.saturating_sub(round.last_opened_at()) >= round.interval_secs()
                && now >= round.last_opened_at(),
            is_open: round.phase() == RafflePhase::Open,
            has_balance: round.pool() > 0,
            has_players: round.num_players() > 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.time_passed && self.is_open && self.has_balance && self.has_players
    }
}
