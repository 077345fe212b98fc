//! Typed publish/subscribe topics
//!
//! Each event kind gets its own [`Topic`]. Subscribers hold the receiving end
//! of an unbounded channel, so publishing never blocks the tick and dropping a
//! [`Subscription`] is enough to detach it.

use crate::rules::EliminationCause;
use glam::Vec3;
use shared::PlayerId;
use std::fmt;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn try_recv(&mut self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything published since the last call.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

pub struct Topic<T> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, UnboundedSender<T>)>,
}

impl<T: Clone> Topic<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Subscription<T> {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.push((id, sender));
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Delivers `event` to every live subscriber and forgets dropped ones.
    pub fn publish(&mut self, event: T) {
        self.subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A vehicle was eliminated, locally detected or reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct KillEvent {
    pub cause: EliminationCause,
    pub victim: PlayerId,
}

impl fmt::Display for KillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            EliminationCause::Arena => write!(f, "{} hit the wall", self.victim),
            EliminationCause::Trail { killer } if killer == &self.victim => {
                write!(f, "{} crossed their own trail", self.victim)
            }
            EliminationCause::Trail { killer } => write!(f, "{} eliminated {}", killer, self.victim),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EliminationEvent {
    pub player: PlayerId,
    pub position: Vec3,
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub player_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalEvent {
    pub portal_id: String,
    pub player: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Explosion,
    Respawn,
}

/// Request for a visual effect. The core only asks; the viewer decides how.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRequest {
    pub kind: EffectKind,
    pub position: Vec3,
    pub color: [u8; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_published_events() {
        let mut topic = Topic::new();
        let mut a = topic.subscribe();
        let mut b = topic.subscribe();

        topic.publish(1u32);
        topic.publish(2u32);

        assert_eq!(a.drain(), vec![1, 2]);
        assert_eq!(b.drain(), vec![1, 2]);
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut topic = Topic::new();
        let mut sub = topic.subscribe();
        let id = sub.id();

        assert!(topic.unsubscribe(id));
        assert!(!topic.unsubscribe(id));
        topic.publish("ignored");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_dropped_subscriptions_are_pruned() {
        let mut topic: Topic<u8> = Topic::new();
        let kept = topic.subscribe();
        drop(topic.subscribe());
        assert_eq!(topic.subscriber_count(), 2);

        topic.publish(7);
        assert_eq!(topic.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_kill_event_display() {
        let wall = KillEvent {
            cause: EliminationCause::Arena,
            victim: PlayerId::from("p1"),
        };
        assert_eq!(wall.to_string(), "p1 hit the wall");

        let kill = KillEvent {
            cause: EliminationCause::Trail {
                killer: PlayerId::from("p2"),
            },
            victim: PlayerId::from("p1"),
        };
        assert_eq!(kill.to_string(), "p2 eliminated p1");
    }

    #[tokio::test]
    async fn test_async_receive() {
        let mut topic = Topic::new();
        let mut sub = topic.subscribe();
        topic.publish(ChatEvent {
            player_name: "p1".to_string(),
            message: "hello".to_string(),
        });

        let event = sub.recv().await.unwrap();
        assert_eq!(event.message, "hello");
    }
}
