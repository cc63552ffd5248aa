//! Per-connection session handle for transports.

use crate::broker::Broker;
use crate::endpoint::{Endpoint, Inbox};
use crate::error::Result;
use crate::message::Message;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::info;

/// A connected user, as seen by a transport.
///
/// Created by [`Broker::connect`]. The session reads from its own inbox and
/// sends on behalf of its user. Closing or dropping it unregisters its own
/// endpoint; a newer registration for the same user id is left alone.
#[derive(Debug)]
pub struct Session {
    id: String,
    user_id: String,
    endpoint: Endpoint,
    inbox: Inbox,
    broker: Broker,
    closed: bool,
}

impl Session {
    pub(crate) fn new(broker: Broker, user_id: String, endpoint: Endpoint, inbox: Inbox) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            endpoint,
            inbox,
            broker,
            closed: false,
        }
    }

    /// Unique session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The user this session belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Wait for the next inbound message; `None` once unregistered.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// Take the next buffered inbound message.
    pub fn try_recv(&mut self) -> std::result::Result<Message, TryRecvError> {
        self.inbox.try_recv()
    }

    /// Send a direct message from this session's user.
    pub async fn send(
        &self,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        self.broker
            .send_message(Message::direct(self.user_id.clone(), recipient, content))
            .await
    }

    /// Broadcast a message from this session's user.
    pub async fn broadcast(&self, content: impl Into<String>) -> Result<()> {
        self.broker
            .send_message(Message::broadcast(self.user_id.clone(), content))
            .await
    }

    /// Unregister this session's endpoint. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.broker
            .registry()
            .unregister_endpoint(&self.user_id, &self.endpoint);
        info!(user_id = %self.user_id, session_id = %self.id, "User disconnected");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::{Broker, BrokerConfig};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_connect_registers_user() {
        let broker = Broker::new(BrokerConfig::default(), &CancellationToken::new()).unwrap();
        let session = broker.connect("alice");

        assert!(!session.id().is_empty());
        assert_eq!(session.user_id(), "alice");
        assert!(broker.lookup("alice").is_some());
    }

    #[tokio::test]
    async fn test_session_send_and_receive() {
        let broker = Broker::new(BrokerConfig::default(), &CancellationToken::new()).unwrap();
        broker.run().unwrap();

        let alice = broker.connect("alice");
        let mut bob = broker.connect("bob");

        alice.send("bob", "hi bob").await.unwrap();

        let msg = timeout(WAIT, bob.recv()).await.unwrap().unwrap();
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.recipient, "bob");
        assert_eq!(msg.content, "hi bob");
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_session_close_unregisters() {
        let broker = Broker::new(BrokerConfig::default(), &CancellationToken::new()).unwrap();
        let mut session = broker.connect("alice");

        session.close();
        session.close();

        assert!(broker.lookup("alice").is_none());
        assert!(session.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_does_not_evict_newer_session() {
        let broker = Broker::new(BrokerConfig::default(), &CancellationToken::new()).unwrap();
        let old = broker.connect("alice");
        let new = broker.connect("alice");

        drop(old);

        let registered = broker.lookup("alice").unwrap();
        assert!(!registered.is_closed());
        drop(new);
        assert!(broker.lookup("alice").is_none());
    }

    #[tokio::test]
    async fn test_session_ends_on_broker_shutdown() {
        let broker = Broker::new(BrokerConfig::default(), &CancellationToken::new()).unwrap();
        broker.run().unwrap();
        let mut session = broker.connect("alice");

        broker.shutdown();
        assert!(timeout(WAIT, session.recv()).await.unwrap().is_none());
        assert!(session.broadcast("anyone?").await.is_err());
    }
}
