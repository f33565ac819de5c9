//! Error types for the raffle settlement engine
//!
//! Every failure is classified as a caller error, a protocol error or a fatal
//! error so operators and callers can decide whether a retry makes sense.

use crate::types::{Amount, Participant, RafflePhase, RequestId};

/// Root error type for all raffle operations
#[derive(Debug, thiserror::Error)]
pub enum RaffleError {
    // Caller errors
    #[error("Insufficient entry fee: paid {paid}, required {required}")]
    InsufficientFee { paid: Amount, required: Amount },

    #[error("Entry fee overpaid: paid {paid}, required exactly {required}")]
    ExcessFee { paid: Amount, required: Amount },

    #[error("Raffle is not open (phase: {0})")]
    RoundNotOpen(RafflePhase),

    #[error("Upkeep not needed (pool: {pool}, players: {players}, phase: {phase})")]
    UpkeepNotNeeded {
        pool: Amount,
        players: usize,
        phase: RafflePhase,
    },

    #[error("Pool {pool} cannot take another entry of {fee}")]
    PoolOverflow { pool: Amount, fee: Amount },

    #[error("Player index {index} out of range ({len} entrants)")]
    IndexOutOfRange { index: usize, len: usize },

    // Protocol errors
    #[error("Randomness request {0} is already pending")]
    RequestAlreadyPending(RequestId),

    #[error("Unknown randomness request id {received} (pending: {pending:?})")]
    UnknownRequestId {
        received: RequestId,
        pending: Option<RequestId>,
    },

    #[error("Randomness oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Funds custody rejected deposit from {participant}: {reason}")]
    DepositFailed { participant: Participant, reason: String },

    // Fatal errors
    #[error("Payout of {amount} to {winner} failed: {reason}")]
    PayoutFailed {
        winner: Participant,
        amount: Amount,
        reason: String,
    },

    #[error("Round invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Settlement halted after fatal fault: {0}")]
    SettlementHalted(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Retry semantics of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected synchronously, safe to retry once the condition is fixed
    Caller,
    /// Misuse or stale callback, never retried automatically
    Protocol,
    /// Settlement cannot proceed without an operator
    Fatal,
}

impl RaffleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RaffleError::InsufficientFee { .. }
            | RaffleError::ExcessFee { .. }
            | RaffleError::RoundNotOpen(_)
            | RaffleError::UpkeepNotNeeded { .. }
            | RaffleError::PoolOverflow { .. }
            | RaffleError::IndexOutOfRange { .. }
            | RaffleError::Configuration(_) => ErrorClass::Caller,
            RaffleError::RequestAlreadyPending(_)
            | RaffleError::UnknownRequestId { .. }
            | RaffleError::OracleUnavailable(_)
            | RaffleError::DepositFailed { .. } => ErrorClass::Protocol,
            RaffleError::PayoutFailed { .. }
            | RaffleError::InvariantViolation(_)
            | RaffleError::SettlementHalted(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

impl From<toml::de::Error> for RaffleError {
    fn from(e: toml::de::Error) -> Self {
        RaffleError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::ser::Error> for RaffleError {
    fn from(e: toml::ser::Error) -> Self {
        RaffleError::Configuration(ConfigurationError::SaveFailed(e.to_string()))
    }
}

// Convenience type alias for Results
pub type RaffleResult<T> = Result<T, RaffleError>;
