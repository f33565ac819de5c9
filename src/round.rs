//! Round state and entrant registry
//!
//! `Round` is the single mutable aggregate of the raffle. It is owned by the
//! settlement engine and only ever mutated behind the engine's lock; everyone
//! else sees `RoundSnapshot` copies.

use crate::errors::{RaffleError, RaffleResult};
use crate::types::{Amount, Participant, RafflePhase, RequestId, Timestamp};
use serde::{Deserialize, Serialize};

/// Fatal condition that stopped a settlement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementFault {
    pub request_id: RequestId,
    pub reason: String,
    pub raised_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct Round {
    phase: RafflePhase,
    entrants: Vec<Participant>,
    pool: Amount,
    last_opened_at: Timestamp,
    entry_fee: Amount,
    interval_secs: u64,
    pending_request_id: Option<RequestId>,
    last_fulfilled_request_id: Option<RequestId>,
    recent_winner: Option<Participant>,
    round_number: u64,
    fault: Option<SettlementFault>,
}

impl Round {
    /// Open the first round at `opened_at`
    pub fn new(entry_fee: Amount, interval_secs: u64, opened_at: Timestamp) -> Self {
        Self {
            phase: RafflePhase::Open,
            entrants: Vec::new(),
            pool: 0,
            last_opened_at: opened_at,
            entry_fee,
            interval_secs,
            pending_request_id: None,
            last_fulfilled_request_id: None,
            recent_winner: None,
            round_number: 1,
            fault: None,
        }
    }

    /// Validate the fee and phase, then append one entrant slot.
    pub fn enter(&mut self, participant: Participant, fee_paid: Amount) -> RaffleResult<()> {
        self.pool = self.check_entry(fee_paid)?;
        self.entrants.push(participant);
        Ok(())
    }

    /// Entry checks without mutation, so custody can be credited first.
    /// Returns the pool as it would stand after the entry.
    pub fn check_entry(&self, fee_paid: Amount) -> RaffleResult<Amount> {
        if fee_paid < self.entry_fee {
            return Err(RaffleError::InsufficientFee {
                paid: fee_paid,
                required: self.entry_fee,
            });
        }
        if fee_paid > self.entry_fee {
            return Err(RaffleError::ExcessFee {
                paid: fee_paid,
                required: self.entry_fee,
            });
        }
        if self.phase != RafflePhase::Open {
            return Err(RaffleError::RoundNotOpen(self.phase));
        }
        self.pool
            .checked_add(self.entry_fee)
            .ok_or(RaffleError::PoolOverflow {
                pool: self.pool,
                fee: self.entry_fee,
            })
    }

    pub fn player_at(&self, index: usize) -> RaffleResult<&Participant> {
        self.entrants.get(index).ok_or(RaffleError::IndexOutOfRange {
            index,
            len: self.entrants.len(),
        })
    }

    /// Close entries and remember the outstanding request.
    pub(crate) fn begin_calculating(&mut self, request_id: RequestId) {
        self.phase = RafflePhase::Calculating;
        self.pending_request_id = Some(request_id);
    }

    /// Record the winner, empty the registry and open the next round.
    pub(crate) fn complete_settlement(&mut self, winner: Participant, now: Timestamp) {
        self.recent_winner = Some(winner);
        self.last_fulfilled_request_id = self.pending_request_id.take();
        self.clear();
        self.phase = RafflePhase::Open;
        self.last_opened_at = now;
        self.round_number += 1;
    }

    pub(crate) fn record_fault(&mut self, fault: SettlementFault) {
        self.fault = Some(fault);
    }

    fn clear(&mut self) {
        self.entrants.clear();
        self.pool = 0;
    }

    pub fn phase(&self) -> RafflePhase {
        self.phase
    }

    pub fn entrants(&self) -> &[Participant] {
        &self.entrants
    }

    pub fn num_players(&self) -> usize {
        self.entrants.len()
    }

    pub fn pool(&self) -> Amount {
        self.pool
    }

    pub fn last_opened_at(&self) -> Timestamp {
        self.last_opened_at
    }

    pub fn entry_fee(&self) -> Amount {
        self.entry_fee
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn pending_request_id(&self) -> Option<RequestId> {
        self.pending_request_id
    }

    pub fn last_fulfilled_request_id(&self) -> Option<RequestId> {
        self.last_fulfilled_request_id
    }

    pub fn recent_winner(&self) -> Option<&Participant> {
        self.recent_winner.as_ref()
    }

    pub fn round_number(&self) -> u64 {
        self.round_number
    }

    pub fn fault(&self) -> Option<&SettlementFault> {
        self.fault.as_ref()
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            phase: self.phase,
            entrants: self.entrants.clone(),
            pool: self.pool,
            last_opened_at: self.last_opened_at,
            entry_fee: self.entry_fee,
            interval_secs: self.interval_secs,
            pending_request_id: self.pending_request_id,
            last_fulfilled_request_id: self.last_fulfilled_request_id,
            recent_winner: self.recent_winner.clone(),
            round_number: self.round_number,
            fault: self.fault.clone(),
        }
    }
}

/// Read-only copy of the round handed to external readers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSnapshot {
    pub phase: RafflePhase,
    pub entrants: Vec<Participant>,
    pub pool: Amount,
    pub last_opened_at: Timestamp,
    pub entry_fee: Amount,
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fulfilled_request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_winner: Option<Participant>,
    pub round_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<SettlementFault>,
}
