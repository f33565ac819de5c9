//! Background drivers for the engine
//!
//! `Keeper` plays the automation trigger: it polls readiness on a fixed
//! cadence and initiates settlement when due. `FulfillmentRelay` plays the
//! oracle's delivery network: it answers each request issued to the local
//! `VrfOracle` and hands the result to the engine's callback entry point.
//! Both stop when the shutdown flag flips to `true`.

use crate::engine::{SettlementEngine, SettlementReceipt};
use crate::errors::{RaffleError, RaffleResult};
use crate::oracle::VrfOracle;
use crate::types::{unix_now, RequestId, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Source of the current time in unix seconds
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(unix_now)
}

pub struct Keeper {
    engine: Arc<SettlementEngine>,
    poll_interval: Duration,
    clock: Clock,
}

impl Keeper {
    pub fn new(engine: Arc<SettlementEngine>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Check readiness once and initiate settlement if due.
    ///
    /// Losing a race against another trigger is not an error.
    pub async fn poll_once(&self, now: Timestamp) -> RaffleResult<Option<RequestId>> {
        let check = self.engine.check_upkeep(now).await;
        if !check.is_ready() {
            tracing::trace!("Upkeep not needed: {:?}", check);
            return Ok(None);
        }

        match self.engine.perform_upkeep(now).await {
            Ok(request_id) => Ok(Some(request_id)),
            Err(RaffleError::UpkeepNotNeeded { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!("Keeper started, polling every {:?}", self.poll_interval);
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once((self.clock)()).await {
                            tracing::warn!("Keeper poll failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Keeper stopped");
        })
    }
}

pub struct FulfillmentRelay {
    engine: Arc<SettlementEngine>,
    oracle: Arc<VrfOracle>,
    requests: mpsc::UnboundedReceiver<RequestId>,
    clock: Clock,
}

impl FulfillmentRelay {
    pub fn new(
        engine: Arc<SettlementEngine>,
        oracle: Arc<VrfOracle>,
        requests: mpsc::UnboundedReceiver<RequestId>,
    ) -> Self {
        Self {
            engine,
            oracle,
            requests,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Answer one request and deliver the first word to the engine.
    pub async fn relay(&self, request_id: RequestId, now: Timestamp) -> RaffleResult<SettlementReceipt> {
        let fulfillment = self
            .oracle
            .fulfill(request_id)
            .map_err(|e| RaffleError::OracleUnavailable(e.to_string()))?;

        let random_word = fulfillment.random_words.first().copied().ok_or_else(|| {
            RaffleError::OracleUnavailable(format!("request {} fulfilled without words", request_id))
        })?;

        self.engine
            .fulfill_random_words(request_id, random_word, now)
            .await
    }

    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!("Fulfillment relay started");
            loop {
                tokio::select! {
                    next = self.requests.recv() => {
                        let Some(request_id) = next else { break };
                        if let Err(e) = self.relay(request_id, (self.clock)()).await {
                            if e.is_fatal() {
                                tracing::error!("Fulfillment of request {} failed: {}", request_id, e);
                            } else {
                                tracing::warn!("Fulfillment of request {} rejected: {}", request_id, e);
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Fulfillment relay stopped");
        })
    }
}

/// Flip the shutdown flag and wait for every background task.
///
/// Returns the number of tasks that panicked or were cancelled.
pub async fn shutdown(signal: &watch::Sender<bool>, handles: Vec<JoinHandle<()>>) -> usize {
    if signal.send(true).is_err() {
        tracing::debug!("Background tasks already stopped before shutdown signal");
    }

    let mut failed = 0;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("Background task ended abnormally: {}", e);
            failed += 1;
        }
    }
    failed
}
