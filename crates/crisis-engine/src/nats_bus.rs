//! NATS bridge for the in-process router.
//!
//! The bridge subscribes to every subject the simulation uses and injects
//! decoded messages into the router; in the other direction it forwards
//! each locally published message to its subject. The connection is opened
//! with `no_echo` so a process never receives its own publications twice.
//!
//! # Subject Convention
//!
//! - **Namespace:** `<ns>.SimState.<node>`, `<ns>.SimTime`, `<ns>.Job`,
//!   `<ns>.NextEvent`, `<ns>.Load.<NodeType>`, `<ns>.PowerStationCmd`
//! - **Layers:** `layers.<id>`, `layers.<id>.feature`, `layers.<id>.batch`
//! - **Keys:** `keys.chart`

use crisis_core::bus;
use crisis_core::router::{Envelope, Origin, Router, Subscription};
use crisis_types::{Message, Topics};
use futures::StreamExt as _;
use futures::stream::SelectAll;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// NATS connection bound to one topic namespace.
pub struct NatsBridge {
    client: async_nats::Client,
    topics: Topics,
}

impl NatsBridge {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str, topics: Topics) -> Result<Self, EngineError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::ConnectOptions::new()
            .no_echo()
            .connect(url)
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to connect to {url}: {e}"),
            })?;
        info!("NATS connection established");
        Ok(Self { client, topics })
    }

    /// Subscribe to every simulation subject.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if a subscription fails.
    async fn subscribe_all(&self) -> Result<SelectAll<async_nats::Subscriber>, EngineError> {
        let mut all = SelectAll::new();
        for subject in self.topics.wildcards() {
            debug!(subject = %subject, "subscribing");
            let sub = self
                .client
                .subscribe(subject.clone())
                .await
                .map_err(|e| EngineError::Nats {
                    message: format!("failed to subscribe to {subject}: {e}"),
                })?;
            all.push(sub);
        }
        info!(namespace = self.topics.namespace(), "subscribed to simulation subjects");
        Ok(all)
    }

    /// Relay messages between NATS and `router` until `shutdown` fires.
    ///
    /// Local messages still buffered at shutdown are forwarded and flushed
    /// before returning, so final status reports reach the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if subscribing fails or the server
    /// closes the subscriptions.
    pub async fn run(self, router: Router, mut shutdown: oneshot::Receiver<()>) -> Result<(), EngineError> {
        let mut local = router.subscribe();
        let mut inbound = self.subscribe_all().await?;
        loop {
            tokio::select! {
                msg = inbound.next() => match msg {
                    Some(msg) => self.inject(&router, msg.subject.as_str(), &msg.payload),
                    None => {
                        return Err(EngineError::Nats {
                            message: "subscriptions closed by server".to_owned(),
                        });
                    }
                },
                envelope = local.recv() => match envelope {
                    Some(envelope) => self.forward(envelope).await,
                    None => break,
                },
                _ = &mut shutdown => break,
            }
        }
        self.drain(&mut local).await;
        Ok(())
    }

    fn inject(&self, router: &Router, subject: &str, payload: &[u8]) {
        match bus::decode(&self.topics, subject, payload) {
            Ok(Some(message)) => router.inject(message),
            Ok(None) => debug!(subject = subject, "ignoring subject"),
            Err(e) => warn!(subject = subject, error = %e, "dropping malformed payload"),
        }
    }

    async fn forward(&self, envelope: Envelope) {
        if envelope.origin == Origin::Local {
            self.publish(&envelope.message).await;
        }
    }

    /// Publish one message; failures are logged and the message dropped.
    async fn publish(&self, message: &Message) {
        let (subject, payload) = match bus::encode(&self.topics, message) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to serialize message");
                return;
            }
        };
        if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
            warn!(subject = subject, error = %e, "failed to publish");
        }
    }

    async fn drain(&self, local: &mut Subscription) {
        while let Some(envelope) = local.try_recv() {
            self.forward(envelope).await;
        }
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "NATS flush failed");
        }
        info!("NATS bridge stopped");
    }
}

impl std::fmt::Debug for NatsBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBridge")
            .field("namespace", &self.topics.namespace())
            .finish_non_exhaustive()
    }
}
