use crate::errors::{RaffleError, RaffleResult};
use crate::oracle::{RandomnessOracle, RandomnessRequest};
use crate::round::Round;
use crate::types::RequestId;
use std::sync::Arc;

/// Correlates oracle requests and callbacks with the round.
///
/// The pending request id lives on the `Round` so that phase and request stay
/// in one aggregate; the gateway only reads it and talks to the oracle.
pub struct RandomnessGateway {
    oracle: Arc<dyn RandomnessOracle>,
    request: RandomnessRequest,
}

impl RandomnessGateway {
    pub fn new(oracle: Arc<dyn RandomnessOracle>, request: RandomnessRequest) -> Self {
        Self { oracle, request }
    }

    /// Issue exactly one oracle request, refusing while another is outstanding.
    pub async fn request_randomness(&self, round: &Round) -> RaffleResult<RequestId> {
        if let Some(pending) = round.pending_request_id() {
            return Err(RaffleError::RequestAlreadyPending(pending));
        }

        let request_id = self
            .oracle
            .request_random_words(&self.request)
            .await
            .map_err(|e| RaffleError::OracleUnavailable(e.to_string()))?;

        tracing::debug!(
            "Requested {} random words (subscription {}), request id {}",
            self.request.num_words,
            self.request.subscription_id,
            request_id
        );
        Ok(request_id)
    }

    /// Accept a callback only for the outstanding request of a healthy round.
    pub fn on_fulfilled(&self, round: &Round, request_id: RequestId) -> RaffleResult<()> {
        let pending = round.pending_request_id();
        if pending != Some(request_id) {
            return Err(RaffleError::UnknownRequestId {
                received: request_id,
                pending,
            });
        }

        if let Some(fault) = round.fault() {
            return Err(RaffleError::SettlementHalted(fault.reason.clone()));
        }

        Ok(())
    }

    pub fn subscription_id(&self) -> u64 {
        self.request.subscription_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleConfig;
    use crate::oracle::OracleError;
    use crate::round::SettlementFault;
    use crate::types::Participant;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingOracle {
        calls: AtomicU64,
    }

    #[async_trait]
    impl RandomnessOracle for CountingOracle {
        async fn request_random_words(&self, _request: &RandomnessRequest) -> Result<RequestId, OracleError> {
            Ok(RequestId::new(100 + self.calls.fetch_add(1, Ordering::SeqCst)))
        }
    }

    struct DownOracle;

    #[async_trait]
    impl RandomnessOracle for DownOracle {
        async fn request_random_words(&self, _request: &RandomnessRequest) -> Result<RequestId, OracleError> {
            Err(OracleError::InvalidRequest("subscription not funded".to_string()))
        }
    }

    fn gateway(oracle: Arc<dyn RandomnessOracle>) -> RandomnessGateway {
        RandomnessGateway::new(oracle, RandomnessRequest::from(&OracleConfig::default()))
    }

    #[tokio::test]
    async fn test_single_outstanding_request() {
        let oracle = Arc::new(CountingOracle { calls: AtomicU64::new(0) });
        let gateway = gateway(oracle.clone());
        let mut round = Round::new(1, 10, 0);
        round.enter(Participant::new("a"), 1).unwrap();

        let id = gateway.request_randomness(&round).await.unwrap();
        round.begin_calculating(id);

        assert!(matches!(
            gateway.request_randomness(&round).await,
            Err(RaffleError::RequestAlreadyPending(pending)) if pending == id
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_surfaces() {
        let gateway = gateway(Arc::new(DownOracle));
        let round = Round::new(1, 10, 0);

        assert!(matches!(
            gateway.request_randomness(&round).await,
            Err(RaffleError::OracleUnavailable(_))
        ));
    }

    #[test]
    fn test_callback_correlation() {
        let gateway = gateway(Arc::new(DownOracle));
        let mut round = Round::new(1, 10, 0);

        // nothing pending yet
        assert!(matches!(
            gateway.on_fulfilled(&round, RequestId::new(7)),
            Err(RaffleError::UnknownRequestId { pending: None, .. })
        ));

        round.enter(Participant::new("a"), 1).unwrap();
        round.begin_calculating(RequestId::new(7));

        assert!(gateway.on_fulfilled(&round, RequestId::new(7)).is_ok());
        assert!(matches!(
            gateway.on_fulfilled(&round, RequestId::new(999)),
            Err(RaffleError::UnknownRequestId { pending: Some(p), .. }) if p == RequestId::new(7)
        ));

        round.record_fault(SettlementFault {
            request_id: RequestId::new(7),
            reason: "payout rejected".to_string(),
            raised_at: 20,
        });
        assert!(matches!(
            gateway.on_fulfilled(&round, RequestId::new(7)),
            Err(RaffleError::SettlementHalted(_))
        ));
    }
}
