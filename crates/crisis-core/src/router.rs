//! In-process message router.
//!
//! Every actor in one process subscribes to the router and sees every
//! message, its own included, mirroring a pub/sub broker with a wildcard
//! subscription. Envelopes record whether a message originated in this
//! process so a broker bridge forwards only local traffic.
//!
//! Each subscription owns an unbounded queue. Delivery is in order and
//! lossless however large a burst one cascade pass publishes; a subscriber
//! that stops reading only costs memory. Dropped subscriptions are pruned on
//! the next publish.

use std::sync::{Arc, Mutex, PoisonError};

use crisis_types::Message;
use tokio::sync::mpsc;
use tracing::debug;

/// Where a message entered the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Published by an actor in this process.
    Local,
    /// Injected by a broker bridge.
    Remote,
}

/// A routed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Where the message came from.
    pub origin: Origin,
    /// The message.
    pub message: Message,
}

type Subscribers = Vec<mpsc::UnboundedSender<Envelope>>;

/// Cloneable handle to the process-wide fan-out.
#[derive(Debug, Clone, Default)]
pub struct Router {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl Router {
    /// A router without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a message from a local actor.
    pub fn publish(&self, message: Message) {
        self.send(Envelope {
            origin: Origin::Local,
            message,
        });
    }

    /// Inject a message received from a broker.
    pub fn inject(&self, message: Message) {
        self.send(Envelope {
            origin: Origin::Remote,
            message,
        });
    }

    /// Subscribe to every subsequent message.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn send(&self, envelope: Envelope) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("No router subscribers; message dropped");
        }
    }
}

/// Receiving side of a [`Router`].
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Subscription {
    /// Next envelope, or `None` once every router handle is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Next already-queued envelope, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crisis_types::{
        Feature, FeatureUpdate, Geometry, NextEventRequest, Position, layer_ids,
    };

    #[tokio::test]
    async fn every_subscriber_sees_every_message() {
        let router = Router::new();
        let mut a = router.subscribe();
        let mut b = router.subscribe();
        let msg = Message::NextEvent(NextEventRequest { next: true });

        router.publish(msg.clone());
        router.inject(msg.clone());

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().origin, Origin::Local);
            let remote = sub.recv().await.unwrap();
            assert_eq!(remote.origin, Origin::Remote);
            assert_eq!(remote.message, msg);
        }
    }

    #[tokio::test]
    async fn closes_when_router_dropped() {
        let router = Router::new();
        let mut sub = router.subscribe();
        drop(router);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let router = Router::new();
        let keep = router.subscribe();
        drop(router.subscribe());
        assert_eq!(router.subscriber_count(), 1);
        router.publish(Message::NextEvent(NextEventRequest { next: false }));
        assert_eq!(router.subscribers.lock().unwrap().len(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn large_cascade_burst_reaches_idle_peer_in_order() {
        let router = Router::new();
        let mut peer = router.subscribe();
        let towers = 5000_u32;
        for i in 0..towers {
            router.publish(Message::Feature(
                layer_ids::COMMUNICATION.to_owned(),
                FeatureUpdate {
                    feature: Feature::new(
                        format!("comm_obj_{i}"),
                        Geometry::Point(Position::new(0.0, 0.0)),
                    )
                    .with_property("state", 2_u8),
                    change_all_features_of_type: false,
                },
            ));
        }

        let mut received = Vec::new();
        while let Some(envelope) = peer.try_recv() {
            if let Message::Feature(_, update) = envelope.message {
                received.extend(update.feature.id);
            }
        }
        let expected: Vec<String> = (0..towers).map(|i| format!("comm_obj_{i}")).collect();
        assert_eq!(received, expected);
    }
}
