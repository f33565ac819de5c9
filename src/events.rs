//! Raffle notifications
//!
//! Observers subscribe to a broadcast stream of round events. Publishing
//! never blocks the engine; events sent while nobody listens are dropped.

use crate::types::{Amount, Participant, RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaffleEvent {
    /// A participant bought one entrant slot
    RaffleEntered {
        participant: Participant,
        fee: Amount,
        round_number: u64,
    },
    /// Entries closed and randomness was requested
    RequestedRaffleWinner {
        request_id: RequestId,
        round_number: u64,
    },
    /// Randomness arrived and the pool was paid out
    WinnerPicked {
        winner: Participant,
        payout: Amount,
        request_id: RequestId,
        round_number: u64,
        settled_at: Timestamp,
    },
    /// Settlement stopped on a fatal error and needs an operator
    SettlementFaulted {
        request_id: RequestId,
        reason: String,
    },
}

#[derive(Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<RaffleEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaffleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RaffleEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for raffle event");
        }
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = EventNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(RaffleEvent::RequestedRaffleWinner {
            request_id: RequestId::new(7),
            round_number: 1,
        });

        let event = rx.recv().await.expect("Should receive event");
        assert_eq!(
            event,
            RaffleEvent::RequestedRaffleWinner {
                request_id: RequestId::new(7),
                round_number: 1,
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let notifier = EventNotifier::default();
        notifier.publish(RaffleEvent::SettlementFaulted {
            request_id: RequestId::new(1),
            reason: "test".to_string(),
        });
    }

    #[test]
    fn test_event_json_tag() {
        let event = RaffleEvent::RaffleEntered {
            participant: Participant::new("alice"),
            fee: 1,
            round_number: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "raffle_entered");
        assert_eq!(json["participant"], "alice");
    }
}
