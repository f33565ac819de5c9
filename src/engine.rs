//! Settlement engine
//!
//! Owns the round and drives its state machine:
//!
//! ```text
//!   OPEN --perform_upkeep--> CALCULATING --fulfill_random_words--> OPEN
//! ```
//!
//! Every entry point takes the round lock for its whole duration, including
//! the awaited oracle and custody calls, so the two external callers (the
//! automation trigger and the oracle callback) can never interleave inside a
//! transition.

use crate::config::RaffleConfig;
use crate::custody::FundsCustody;
use crate::errors::{RaffleError, RaffleResult};
use crate::events::{EventNotifier, RaffleEvent};
use crate::gateway::RandomnessGateway;
use crate::metrics::RaffleMetrics;
use crate::oracle::{RandomnessOracle, RandomnessRequest};
use crate::readiness::UpkeepCheck;
use crate::round::{Round, RoundSnapshot, SettlementFault};
use crate::types::{Amount, Participant, RafflePhase, RandomWord, RequestId, Timestamp};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Outcome of a completed settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub request_id: RequestId,
    pub winner: Participant,
    pub winner_index: usize,
    pub payout: Amount,
    pub round_number: u64,
}

pub struct SettlementEngine {
    round: Mutex<Round>,
    gateway: RandomnessGateway,
    custody: Arc<dyn FundsCustody>,
    notifier: EventNotifier,
    metrics: RaffleMetrics,
    entry_fee: Amount,
    interval_secs: u64,
}

impl SettlementEngine {
    /// Validate the configuration and open the first round at `now`.
    pub fn new(
        config: &RaffleConfig,
        oracle: Arc<dyn RandomnessOracle>,
        custody: Arc<dyn FundsCustody>,
        now: Timestamp,
    ) -> RaffleResult<Self> {
        config.validate()?;

        let entry_fee = config.raffle.entry_fee;
        let interval_secs = config.raffle.interval_secs;

        tracing::info!(
            "Raffle initialised: entry fee {}, interval {}s, subscription {}",
            entry_fee,
            interval_secs,
            config.oracle.subscription_id
        );

        Ok(Self {
            round: Mutex::new(Round::new(entry_fee, interval_secs, now)),
            gateway: RandomnessGateway::new(oracle, RandomnessRequest::from(&config.oracle)),
            custody,
            notifier: EventNotifier::new(config.monitoring.event_buffer_capacity),
            metrics: RaffleMetrics::new(),
            entry_fee,
            interval_secs,
        })
    }

    /// Buy one entrant slot for `participant`.
    ///
    /// The fee is credited to custody before the slot is recorded; if custody
    /// refuses, the round is left untouched.
    pub async fn enter(&self, participant: Participant, fee_paid: Amount) -> RaffleResult<()> {
        let mut round = self.round.lock().await;
        round.check_entry(fee_paid)?;

        self.custody
            .credit(&participant, self.entry_fee)
            .await
            .map_err(|e| RaffleError::DepositFailed {
                participant: participant.clone(),
                reason: e.to_string(),
            })?;

        round.enter(participant.clone(), fee_paid)?;
        self.metrics.record_entry();

        tracing::debug!(
            "{} entered round {} (players: {}, pool: {})",
            participant,
            round.round_number(),
            round.num_players(),
            round.pool()
        );

        self.notifier.publish(RaffleEvent::RaffleEntered {
            participant,
            fee: self.entry_fee,
            round_number: round.round_number(),
        });

        Ok(())
    }

    /// Readiness of the round at `now`; no side effects.
    pub async fn check_upkeep(&self, now: Timestamp) -> UpkeepCheck {
        let round = self.round.lock().await;
        UpkeepCheck::evaluate(&round, now)
    }

    /// Close entries and request randomness if the round is due.
    pub async fn perform_upkeep(&self, now: Timestamp) -> RaffleResult<RequestId> {
        let mut round = self.round.lock().await;

        if !UpkeepCheck::evaluate(&round, now).is_ready() {
            return Err(RaffleError::UpkeepNotNeeded {
                pool: round.pool(),
                players: round.num_players(),
                phase: round.phase(),
            });
        }

        let request_id = self.gateway.request_randomness(&round).await?;
        round.begin_calculating(request_id);
        self.metrics.record_upkeep();

        tracing::info!(
            "Round {} closed with {} players, pool {}; awaiting randomness for request {}",
            round.round_number(),
            round.num_players(),
            round.pool(),
            request_id
        );

        self.notifier.publish(RaffleEvent::RequestedRaffleWinner {
            request_id,
            round_number: round.round_number(),
        });

        Ok(request_id)
    }

    /// Oracle callback: pick the winner, pay out the pool and reopen the round.
    ///
    /// A payout failure or a broken round invariant halts the round in
    /// CALCULATING with entrants and pool intact and records a fault.
    pub async fn fulfill_random_words(
        &self,
        request_id: RequestId,
        random_word: RandomWord,
        now: Timestamp,
    ) -> RaffleResult<SettlementReceipt> {
        let mut round = self.round.lock().await;

        if let Err(e) = self.gateway.on_fulfilled(&round, request_id) {
            self.metrics.record_rejected_callback();
            tracing::warn!("Rejected randomness callback for request {}: {}", request_id, e);
            return Err(e);
        }

        match self.settle(&mut round, request_id, random_word, now).await {
            Ok(receipt) => {
                self.metrics.record_settlement(receipt.payout);
                tracing::info!(
                    "Round {} won by {} (slot {}), paid {}",
                    receipt.round_number,
                    receipt.winner,
                    receipt.winner_index,
                    receipt.payout
                );
                self.notifier.publish(RaffleEvent::WinnerPicked {
                    winner: receipt.winner.clone(),
                    payout: receipt.payout,
                    request_id,
                    round_number: receipt.round_number,
                    settled_at: now,
                });
                Ok(receipt)
            }
            Err(e) => {
                let reason = e.to_string();
                round.record_fault(SettlementFault {
                    request_id,
                    reason: reason.clone(),
                    raised_at: now,
                });
                self.metrics.record_fault();
                tracing::error!(
                    "Settlement of round {} halted, operator action required: {}",
                    round.round_number(),
                    reason
                );
                self.notifier
                    .publish(RaffleEvent::SettlementFaulted { request_id, reason });
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        round: &mut Round,
        request_id: RequestId,
        random_word: RandomWord,
        now: Timestamp,
    ) -> RaffleResult<SettlementReceipt> {
        let players = round.num_players();
        if players == 0 {
            return Err(RaffleError::InvariantViolation(format!(
                "no entrants when request {} was fulfilled",
                request_id
            )));
        }

        let payout = round.pool();
        let expected = (players as Amount).checked_mul(round.entry_fee());
        if expected != Some(payout) {
            return Err(RaffleError::InvariantViolation(format!(
                "pool {} does not match {} entrants at fee {}",
                payout,
                players,
                round.entry_fee()
            )));
        }

        let winner_index = (random_word % players as RandomWord) as usize;
        let winner = round.player_at(winner_index)?.clone();

        self.custody
            .payout(&winner, payout)
            .await
            .map_err(|e| RaffleError::PayoutFailed {
                winner: winner.clone(),
                amount: payout,
                reason: e.to_string(),
            })?;

        let round_number = round.round_number();
        round.complete_settlement(winner.clone(), now);

        Ok(SettlementReceipt {
            request_id,
            winner,
            winner_index,
            payout,
            round_number,
        })
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        self.round.lock().await.snapshot()
    }

    pub async fn raffle_state(&self) -> RafflePhase {
        self.round.lock().await.phase()
    }

    pub async fn player_at(&self, index: usize) -> RaffleResult<Participant> {
        self.round.lock().await.player_at(index).cloned()
    }

    pub async fn entrants(&self) -> Vec<Participant> {
        self.round.lock().await.entrants().to_vec()
    }

    pub async fn num_players(&self) -> usize {
        self.round.lock().await.num_players()
    }

    pub async fn pool(&self) -> Amount {
        self.round.lock().await.pool()
    }

    pub async fn latest_timestamp(&self) -> Timestamp {
        self.round.lock().await.last_opened_at()
    }

    pub async fn recent_winner(&self) -> Option<Participant> {
        self.round.lock().await.recent_winner().cloned()
    }

    pub async fn pending_request_id(&self) -> Option<RequestId> {
        self.round.lock().await.pending_request_id()
    }

    pub async fn fault(&self) -> Option<SettlementFault> {
        self.round.lock().await.fault().cloned()
    }

    pub fn entry_fee(&self) -> Amount {
        self.entry_fee
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn subscription_id(&self) -> u64 {
        self.gateway.subscription_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaffleEvent> {
        self.notifier.subscribe()
    }

    pub fn metrics(&self) -> &RaffleMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::custody::InMemoryLedger;
    use crate::oracle::OracleError;
    use async_trait::async_trait;

    struct FixedOracle(u64);

    #[async_trait]
    impl RandomnessOracle for FixedOracle {
        async fn request_random_words(&self, _request: &RandomnessRequest) -> Result<RequestId, OracleError> {
            Ok(RequestId::new(self.0))
        }
    }

    fn engine_with(ledger: Arc<InMemoryLedger>) -> SettlementEngine {
        let config = ConfigBuilder::new().entry_fee(1).interval_secs(10).build();
        SettlementEngine::new(&config, Arc::new(FixedOracle(7)), ledger, 0).unwrap()
    }

    fn funded(names: &[&str]) -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::with_balances(
            names.iter().map(|n| (Participant::new(*n), 10)),
        ))
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ConfigBuilder::new().entry_fee(0).build();
        let result = SettlementEngine::new(&config, Arc::new(FixedOracle(1)), funded(&[]), 0);
        assert!(matches!(result, Err(RaffleError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_failed_deposit_leaves_round_untouched() {
        let engine = engine_with(funded(&[]));

        let err = engine.enter(Participant::new("broke"), 1).await.unwrap_err();
        assert!(matches!(err, RaffleError::DepositFailed { .. }));
        assert_eq!(engine.num_players().await, 0);
        assert_eq!(engine.pool().await, 0);
    }

    #[tokio::test]
    async fn test_winner_index_is_random_word_mod_players() {
        let ledger = funded(&["a", "b", "c", "d"]);
        let engine = engine_with(ledger.clone());
        for name in ["a", "b", "c", "d"] {
            engine.enter(Participant::new(name), 1).await.unwrap();
        }

        let id = engine.perform_upkeep(11).await.unwrap();
        let receipt = engine.fulfill_random_words(id, 42, 12).await.unwrap();

        assert_eq!(receipt.winner_index, 2);
        assert_eq!(receipt.winner, Participant::new("c"));
        assert_eq!(receipt.payout, 4);
        assert_eq!(ledger.balance_of(&Participant::new("c")), 13);
        assert_eq!(ledger.vault_balance(), 0);
        assert_eq!(engine.metrics().snapshot().rounds_settled, 1);
    }

    #[tokio::test]
    async fn test_pool_overflow_rejected_before_credit() {
        let fee = u64::MAX / 2 + 1;
        let ledger = Arc::new(InMemoryLedger::with_balances([
            (Participant::new("a"), fee),
            (Participant::new("b"), fee),
        ]));
        let config = ConfigBuilder::new().entry_fee(fee).interval_secs(10).build();
        let engine = SettlementEngine::new(&config, Arc::new(FixedOracle(7)), ledger.clone(), 0).unwrap();

        engine.enter(Participant::new("a"), fee).await.unwrap();
        let err = engine.enter(Participant::new("b"), fee).await.unwrap_err();

        assert!(matches!(err, RaffleError::PoolOverflow { .. }));
        assert!(!err.is_fatal());
        assert_eq!(engine.num_players().await, 1);
        assert_eq!(engine.pool().await, fee);
        assert_eq!(ledger.balance_of(&Participant::new("b")), fee);
        assert_eq!(ledger.vault_balance(), fee);
    }

    #[tokio::test]
    async fn test_empty_round_at_fulfillment_halts() {
        let engine = engine_with(funded(&[]));
        let mut events = engine.subscribe();
        {
            let mut round = engine.round.lock().await;
            *round = Round::new(1, 10, 0);
            round.begin_calculating(RequestId::new(7));
        }

        let err = engine
            .fulfill_random_words(RequestId::new(7), 42, 12)
            .await
            .unwrap_err();
        assert!(matches!(err, RaffleError::InvariantViolation(_)));
        assert!(err.is_fatal());

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.phase, RafflePhase::Calculating);
        assert_eq!(snapshot.pending_request_id, Some(RequestId::new(7)));
        assert_eq!(snapshot.recent_winner, None);
        let fault = snapshot.fault.expect("fault should be recorded");
        assert_eq!(fault.request_id, RequestId::new(7));
        assert_eq!(fault.raised_at, 12);

        match events.recv().await.unwrap() {
            RaffleEvent::SettlementFaulted { request_id, reason } => {
                assert_eq!(request_id, RequestId::new(7));
                assert!(reason.contains("no entrants"));
            }
            other => panic!("Expected SettlementFaulted, got {:?}", other),
        }

        assert!(matches!(
            engine.fulfill_random_words(RequestId::new(7), 42, 13).await,
            Err(RaffleError::SettlementHalted(_))
        ));
        assert_eq!(engine.metrics().snapshot().faults, 1);
        assert_eq!(engine.metrics().snapshot().rounds_settled, 0);
    }

    #[tokio::test]
    async fn test_payout_failure_halts_round() {
        let ledger = funded(&["a"]);
        let engine = engine_with(ledger.clone());
        engine.enter(Participant::new("a"), 1).await.unwrap();
        ledger.reject_payouts_to(&Participant::new("a"));

        let id = engine.perform_upkeep(11).await.unwrap();
        let err = engine.fulfill_random_words(id, 0, 12).await.unwrap_err();
        assert!(matches!(err, RaffleError::PayoutFailed { .. }));
        assert!(err.is_fatal());

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.phase, RafflePhase::Calculating);
        assert_eq!(snapshot.pending_request_id, Some(id));
        assert_eq!(snapshot.pool, 1);
        assert_eq!(snapshot.entrants, vec![Participant::new("a")]);
        assert!(snapshot.fault.is_some());
        assert_eq!(ledger.vault_balance(), 1);

        // a redelivery cannot consume the request a second time
        ledger.accept_payouts_to(&Participant::new("a"));
        assert!(matches!(
            engine.fulfill_random_words(id, 0, 13).await,
            Err(RaffleError::SettlementHalted(_))
        ));
        assert_eq!(engine.metrics().snapshot().faults, 1);
    }
}
