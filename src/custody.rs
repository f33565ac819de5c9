//! Funds custody
//!
//! The engine never holds money itself. Entry fees are credited to a custody
//! vault and the pool is paid out of it when a winner is picked.

use crate::types::{Amount, Participant};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Custody errors reported back to the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("Insufficient balance for {participant}: has {available}, needs {requested}")]
    InsufficientBalance {
        participant: Participant,
        available: Amount,
        requested: Amount,
    },

    #[error("Vault holds {available}, cannot pay {requested}")]
    VaultShortfall { available: Amount, requested: Amount },

    #[error("Vault holds {available}, cannot accept {requested} more")]
    VaultOverflow { available: Amount, requested: Amount },

    #[error("Recipient {0} rejected the transfer")]
    RecipientRejected(Participant),
}

/// Custody interface used by the settlement engine
#[async_trait]
pub trait FundsCustody: Send + Sync {
    /// Move an entry fee from the participant into the vault
    async fn credit(&self, participant: &Participant, amount: Amount) -> Result<(), CustodyError>;

    /// Move `amount` out of the vault to the winner
    async fn payout(&self, participant: &Participant, amount: Amount) -> Result<(), CustodyError>;
}

/// In-process ledger with a single vault and per-participant wallets
#[derive(Default)]
pub struct InMemoryLedger {
    wallets: DashMap<Participant, Amount>,
    vault: AtomicU64,
    rejecting: DashSet<Participant>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger with pre-funded wallets
    pub fn with_balances<I>(balances: I) -> Self
    where
        I: IntoIterator<Item = (Participant, Amount)>,
    {
        let ledger = Self::new();
        for (participant, amount) in balances {
            ledger.fund(&participant, amount);
        }
        ledger
    }

    pub fn fund(&self, participant: &Participant, amount: Amount) {
        let mut wallet = self.wallets.entry(participant.clone()).or_insert(0);
        *wallet = wallet.saturating_add(amount);
    }

    pub fn balance_of(&self, participant: &Participant) -> Amount {
        self.wallets.get(participant).map(|b| *b).unwrap_or(0)
    }

    pub fn vault_balance(&self) -> Amount {
        self.vault.load(Ordering::SeqCst)
    }

    /// Make every payout to `participant` fail, as a contract wallet refusing funds would
    pub fn reject_payouts_to(&self, participant: &Participant) {
        self.rejecting.insert(participant.clone());
    }

    pub fn accept_payouts_to(&self, participant: &Participant) {
        self.rejecting.remove(participant);
    }
}

#[async_trait]
impl FundsCustody for InMemoryLedger {
    async fn credit(&self, participant: &Participant, amount: Amount) -> Result<(), CustodyError> {
        let mut wallet = self.wallets.entry(participant.clone()).or_insert(0);
        if *wallet < amount {
            return Err(CustodyError::InsufficientBalance {
                participant: participant.clone(),
                available: *wallet,
                requested: amount,
            });
        }
        self.vault
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |vault| vault.checked_add(amount))
            .map_err(|available| CustodyError::VaultOverflow {
                available,
                requested: amount,
            })?;
        *wallet -= amount;
        Ok(())
    }

    async fn payout(&self, participant: &Participant, amount: Amount) -> Result<(), CustodyError> {
        if self.rejecting.contains(participant) {
            return Err(CustodyError::RecipientRejected(participant.clone()));
        }

        self.vault
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |vault| vault.checked_sub(amount))
            .map_err(|available| CustodyError::VaultShortfall {
                available,
                requested: amount,
            })?;

        self.fund(participant, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_moves_funds_into_vault() {
        let alice = Participant::new("alice");
        let ledger = InMemoryLedger::with_balances([(alice.clone(), 5)]);

        ledger.credit(&alice, 3).await.unwrap();
        assert_eq!(ledger.balance_of(&alice), 2);
        assert_eq!(ledger.vault_balance(), 3);

        let err = ledger.credit(&alice, 3).await.unwrap_err();
        assert!(matches!(err, CustodyError::InsufficientBalance { available: 2, .. }));
        assert_eq!(ledger.vault_balance(), 3);
    }

    #[tokio::test]
    async fn test_credit_refuses_vault_overflow() {
        let alice = Participant::new("alice");
        let bob = Participant::new("bob");
        let ledger = InMemoryLedger::with_balances([(alice.clone(), u64::MAX), (bob.clone(), 1)]);
        ledger.credit(&alice, u64::MAX).await.unwrap();

        assert!(matches!(
            ledger.credit(&bob, 1).await,
            Err(CustodyError::VaultOverflow { requested: 1, .. })
        ));
        assert_eq!(ledger.balance_of(&bob), 1);
        assert_eq!(ledger.vault_balance(), u64::MAX);
    }

    #[tokio::test]
    async fn test_payout_conserves_funds() {
        let alice = Participant::new("alice");
        let bob = Participant::new("bob");
        let ledger = InMemoryLedger::with_balances([(alice.clone(), 1), (bob.clone(), 1)]);
        ledger.credit(&alice, 1).await.unwrap();
        ledger.credit(&bob, 1).await.unwrap();

        ledger.payout(&bob, 2).await.unwrap();
        assert_eq!(ledger.vault_balance(), 0);
        assert_eq!(ledger.balance_of(&bob), 2);
        assert_eq!(ledger.balance_of(&alice), 0);
    }

    #[tokio::test]
    async fn test_payout_failures_leave_vault_intact() {
        let alice = Participant::new("alice");
        let ledger = InMemoryLedger::with_balances([(alice.clone(), 4)]);
        ledger.credit(&alice, 4).await.unwrap();

        assert!(matches!(
            ledger.payout(&alice, 5).await,
            Err(CustodyError::VaultShortfall { available: 4, requested: 5 })
        ));

        ledger.reject_payouts_to(&alice);
        assert_eq!(
            ledger.payout(&alice, 4).await,
            Err(CustodyError::RecipientRejected(alice.clone()))
        );
        assert_eq!(ledger.vault_balance(), 4);

        ledger.accept_payouts_to(&alice);
        ledger.payout(&alice, 4).await.unwrap();
        assert_eq!(ledger.balance_of(&alice), 4);
    }
}
