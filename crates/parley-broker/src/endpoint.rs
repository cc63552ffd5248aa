//! Per-user delivery endpoints.
//!
//! An endpoint is a queue with one writer handle, shared by the registry and
//! the dispatch loop, and one reader handle ([`Inbox`]) owned by the user's
//! session. Closing the endpoint drops the only underlying sender, so the
//! inbox drains whatever is buffered and then reports end-of-stream.

use crate::error::{BrokerError, Result};
use crate::message::Message;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

#[derive(Debug)]
enum Outbox {
    Bounded(mpsc::Sender<Message>),
    Unbounded(mpsc::UnboundedSender<Message>),
}

#[derive(Debug)]
enum InboxReceiver {
    Bounded(mpsc::Receiver<Message>),
    Unbounded(mpsc::UnboundedReceiver<Message>),
}

/// Writer side of a user's delivery queue.
#[derive(Debug, Clone)]
pub struct Endpoint {
    outbox: Arc<RwLock<Option<Outbox>>>,
}

impl Endpoint {
    /// Write a message without blocking.
    ///
    /// A bounded endpoint that is full rejects the message with
    /// [`BrokerError::EndpointFull`]; the caller decides whether to drop it.
    pub fn deliver(&self, message: Message) -> Result<()> {
        // try_send never suspends, so holding the read guard here is fine.
        let outbox = self.outbox.read();
        match outbox.as_ref() {
            None => Err(BrokerError::EndpointClosed),
            Some(Outbox::Bounded(tx)) => tx.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => BrokerError::EndpointFull,
                TrySendError::Closed(_) => BrokerError::EndpointClosed,
            }),
            Some(Outbox::Unbounded(tx)) => {
                tx.send(message).map_err(|_| BrokerError::EndpointClosed)
            }
        }
    }

    /// Signal end-of-stream. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.outbox.write().take().is_some()
    }

    /// True once closed, or once the reader has gone away.
    pub fn is_closed(&self) -> bool {
        match self.outbox.read().as_ref() {
            None => true,
            Some(Outbox::Bounded(tx)) => tx.is_closed(),
            Some(Outbox::Unbounded(tx)) => tx.is_closed(),
        }
    }

    /// Check whether two handles refer to the same queue.
    pub fn same_endpoint(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.outbox, &other.outbox)
    }
}

/// Reader side of a user's delivery queue.
#[derive(Debug)]
pub struct Inbox {
    receiver: InboxReceiver,
}

impl Inbox {
    /// Wait for the next message.
    ///
    /// Returns `None` after the endpoint was closed and the buffer drained.
    pub async fn recv(&mut self) -> Option<Message> {
        match &mut self.receiver {
            InboxReceiver::Bounded(rx) => rx.recv().await,
            InboxReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take the next buffered message, if any.
    pub fn try_recv(&mut self) -> std::result::Result<Message, TryRecvError> {
        match &mut self.receiver {
            InboxReceiver::Bounded(rx) => rx.try_recv(),
            InboxReceiver::Unbounded(rx) => rx.try_recv(),
        }
    }
}

/// Create an endpoint and its inbox.
///
/// `Some(n)` bounds the queue to `n` messages, `None` leaves it unbounded.
pub fn create_endpoint(capacity: Option<usize>) -> (Endpoint, Inbox) {
    let (outbox, receiver) = match capacity {
        Some(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (Outbox::Bounded(tx), InboxReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Outbox::Unbounded(tx), InboxReceiver::Unbounded(rx))
        }
    };

    let endpoint = Endpoint {
        outbox: Arc::new(RwLock::new(Some(outbox))),
    };
    (endpoint, Inbox { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_and_receive() {
        let (endpoint, mut inbox) = create_endpoint(Some(4));

        endpoint.deliver(Message::direct("alice", "bob", "hi")).unwrap();

        let msg = inbox.try_recv().unwrap();
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_bounded_endpoint_full() {
        let (endpoint, mut inbox) = create_endpoint(Some(1));

        endpoint.deliver(Message::direct("alice", "bob", "one")).unwrap();
        assert_eq!(
            endpoint.deliver(Message::direct("alice", "bob", "two")),
            Err(BrokerError::EndpointFull)
        );

        assert_eq!(inbox.try_recv().unwrap().content, "one");
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn test_unbounded_endpoint_never_full() {
        let (endpoint, mut inbox) = create_endpoint(None);

        for i in 0..1000 {
            endpoint
                .deliver(Message::direct("alice", "bob", i.to_string()))
                .unwrap();
        }

        let mut count = 0;
        while inbox.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (endpoint, mut inbox) = create_endpoint(Some(4));
        let writer = endpoint.clone();

        writer.deliver(Message::direct("alice", "bob", "last")).unwrap();
        assert!(endpoint.close());
        assert!(!endpoint.close());

        assert_eq!(
            writer.deliver(Message::direct("alice", "bob", "late")),
            Err(BrokerError::EndpointClosed)
        );
        assert!(writer.is_closed());

        assert_eq!(inbox.recv().await.unwrap().content, "last");
        assert!(inbox.recv().await.is_none());
    }

    #[test]
    fn test_reader_dropped() {
        let (endpoint, inbox) = create_endpoint(Some(4));
        drop(inbox);

        assert!(endpoint.is_closed());
        assert_eq!(
            endpoint.deliver(Message::broadcast("alice", "hi")),
            Err(BrokerError::EndpointClosed)
        );
    }

    #[test]
    fn test_same_endpoint() {
        let (a, _rx_a) = create_endpoint(None);
        let (b, _rx_b) = create_endpoint(None);

        assert!(a.same_endpoint(&a.clone()));
        assert!(!a.same_endpoint(&b));
    }
}
