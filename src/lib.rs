//! Keeper Raffle - self-settling lottery engine
//!
//! Participants buy fixed-fee entries into a round. An automation trigger
//! polls readiness and, once the round is due, asks a randomness oracle for a
//! random word. The oracle's callback picks the winner, the pool is paid out
//! through custody, and the next round opens.

pub mod config;
pub mod custody;
pub mod engine;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod keeper;
pub mod metrics;
pub mod oracle;
pub mod readiness;
pub mod round;
pub mod types;

pub use config::RaffleConfig;
pub use custody::{FundsCustody, InMemoryLedger};
pub use engine::{SettlementEngine, SettlementReceipt};
pub use errors::{ErrorClass, RaffleError, RaffleResult};
pub use events::RaffleEvent;
pub use keeper::{FulfillmentRelay, Keeper};
pub use oracle::{RandomnessOracle, RandomnessRequest, VrfOracle};
pub use readiness::UpkeepCheck;
pub use round::RoundSnapshot;
pub use types::{Amount, Participant, RafflePhase, RandomWord, RequestId, Timestamp};
