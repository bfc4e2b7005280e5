//! Fan-out of join, update and leave events
//!
//! A broadcast serializes its message once, collects recipients under the
//! registry's read lock, releases the lock and then hands the frame to each
//! recipient's queue with a non-blocking send. One recipient failing never
//! affects the others or the originator.

use crate::error::RelayError;
use crate::registry::Registry;
use log::{debug, error, warn};
use shared::{Motion, PlayerId, PlayerView, ServerMessage};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

/// A state change originating from one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Joined(PlayerView),
    Updated { id: PlayerId, motion: Motion },
    Left { id: PlayerId },
}

impl Event {
    pub fn origin(&self) -> &PlayerId {
        match self {
            Event::Joined(view) => &view.id,
            Event::Updated { id, .. } | Event::Left { id } => id,
        }
    }

    /// Joins and updates skip the originator. A leave goes to everyone
    /// still registered, which by then no longer includes the originator.
    fn excluded(&self) -> Option<&PlayerId> {
        match self {
            Event::Joined(_) | Event::Updated { .. } => Some(self.origin()),
            Event::Left { .. } => None,
        }
    }

    fn into_message(self) -> ServerMessage {
        match self {
            Event::Joined(view) => ServerMessage::PlayerJoined(view),
            Event::Updated { id, motion } => ServerMessage::PlayerUpdate { id, motion },
            Event::Left { id } => ServerMessage::PlayerLeft { id },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub async fn publish(&self, event: Event) -> BroadcastReport {
        let exclude = event.excluded().cloned();
        self.fan_out(event.into_message(), exclude.as_ref()).await
    }

    async fn fan_out(&self, message: ServerMessage, exclude: Option<&PlayerId>) -> BroadcastReport {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize broadcast: {}", e);
                return BroadcastReport::default();
            }
        };

        let recipients = self.registry.recipients(exclude).await;
        let mut report = BroadcastReport::default();

        for (recipient, outbound) in recipients {
            match outbound.try_deliver(Message::Text(text.clone())) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    let failure = RelayError::Delivery {
                        recipient,
                        reason: e.to_string(),
                    };
                    if outbound.is_closed() {
                        debug!("{}", failure);
                    } else {
                        warn!("{}", failure);
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use crate::registry::Player;
    use shared::axes;
    use tokio::sync::mpsc;

    async fn join(registry: &Registry, id: &str, capacity: usize) -> mpsc::Receiver<Message> {
        let (outbound, rx) = Outbound::channel(capacity);
        registry
            .insert(Player::new(
                PlayerId::new(id),
                None,
                Motion::spawn(0),
                "#4ECDC4".to_string(),
                outbound,
            ))
            .await;
        rx
    }

    fn next_message(rx: &mut mpsc::Receiver<Message>) -> Option<ServerMessage> {
        match rx.try_recv().ok()? {
            Message::Text(text) => Some(ServerMessage::from_json(&text).unwrap()),
            other => panic!("Unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_skips_originator() {
        let registry = Arc::new(Registry::new());
        let mut a = join(&registry, "a", 8).await;
        let mut b = join(&registry, "b", 8).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let view = registry.get(&PlayerId::new("b")).await.unwrap();
        let report = broadcaster.publish(Event::Joined(view.clone())).await;

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 0 });
        assert_eq!(next_message(&mut a), Some(ServerMessage::PlayerJoined(view)));
        assert_eq!(next_message(&mut b), None);
    }

    #[tokio::test]
    async fn test_update_carries_only_originator_motion() {
        let registry = Arc::new(Registry::new());
        let mut a = join(&registry, "a", 8).await;
        let mut b = join(&registry, "b", 8).await;
        let mut c = join(&registry, "c", 8).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let motion = Motion {
            position: axes(5.0, 0.0, 0.0),
            ..Motion::default()
        };
        let report = broadcaster
            .publish(Event::Updated {
                id: PlayerId::new("a"),
                motion: motion.clone(),
            })
            .await;

        assert_eq!(report.delivered, 2);
        let expected = ServerMessage::PlayerUpdate {
            id: PlayerId::new("a"),
            motion,
        };
        assert_eq!(next_message(&mut b), Some(expected.clone()));
        assert_eq!(next_message(&mut c), Some(expected));
        assert_eq!(next_message(&mut a), None);
    }

    #[tokio::test]
    async fn test_leave_reaches_all_remaining() {
        let registry = Arc::new(Registry::new());
        let mut a = join(&registry, "a", 8).await;
        let mut b = join(&registry, "b", 8).await;
        let _c = join(&registry, "c", 8).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        registry.remove(&PlayerId::new("c")).await;
        let report = broadcaster
            .publish(Event::Left {
                id: PlayerId::new("c"),
            })
            .await;

        assert_eq!(report.delivered, 2);
        let expected = ServerMessage::PlayerLeft {
            id: PlayerId::new("c"),
        };
        assert_eq!(next_message(&mut a), Some(expected.clone()));
        assert_eq!(next_message(&mut b), Some(expected));
    }

    #[tokio::test]
    async fn test_failed_recipients_do_not_block_others() {
        let registry = Arc::new(Registry::new());
        let mut a = join(&registry, "a", 8).await;
        let closed = join(&registry, "closed", 8).await;
        drop(closed);
        let mut full = join(&registry, "full", 1).await;
        let mut d = join(&registry, "d", 8).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        broadcaster
            .publish(Event::Left {
                id: PlayerId::new("x"),
            })
            .await;
        let report = broadcaster
            .publish(Event::Left {
                id: PlayerId::new("y"),
            })
            .await;

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 2 });
        assert!(next_message(&mut a).is_some());
        assert!(next_message(&mut a).is_some());
        assert!(next_message(&mut d).is_some());
        assert!(next_message(&mut d).is_some());
        assert!(next_message(&mut full).is_some());
        assert!(next_message(&mut full).is_none());
    }

    #[test]
    fn test_event_origin() {
        let event = Event::Updated {
            id: PlayerId::new("z"),
            motion: Motion::default(),
        };
        assert_eq!(event.origin(), &PlayerId::new("z"));
        assert_eq!(event.excluded(), Some(&PlayerId::new("z")));

        let event = Event::Left {
            id: PlayerId::new("z"),
        };
        assert_eq!(event.excluded(), None);
    }
}
