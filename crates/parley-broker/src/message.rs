//! Chat message type.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};

/// A chat message routed by the broker.
///
/// Messages are plain values: the broker clones one copy per recipient and
/// never mutates a message after it has been enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the sending user.
    pub sender: String,
    /// Identifier of the receiving user. Empty for broadcasts.
    #[serde(default)]
    pub recipient: String,
    /// Message body.
    pub content: String,
    /// Deliver to every registered user instead of `recipient`.
    #[serde(default)]
    pub broadcast: bool,
    /// Unix timestamp in milliseconds. Overwritten when the message is sent.
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Create a direct (unicast) message.
    pub fn direct(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            broadcast: false,
            timestamp: now_millis(),
        }
    }

    /// Create a broadcast message.
    pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: String::new(),
            content: content.into(),
            broadcast: true,
            timestamp: now_millis(),
        }
    }

    /// Check that the message can be routed.
    ///
    /// A broadcast ignores `recipient`; a unicast message needs one.
    pub fn validate(&self) -> Result<()> {
        if self.sender.is_empty() {
            return Err(BrokerError::MalformedMessage("empty sender".to_string()));
        }
        if !self.broadcast && self.recipient.is_empty() {
            return Err(BrokerError::MalformedMessage(
                "unicast message without recipient".to_string(),
            ));
        }
        Ok(())
    }

    /// Overwrite the timestamp with the current time.
    pub(crate) fn stamp(&mut self) {
        self.timestamp = now_millis();
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_message() {
        let msg = Message::direct("alice", "bob", "hi");
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.recipient, "bob");
        assert!(!msg.broadcast);
        assert!(msg.timestamp > 0);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_broadcast_message() {
        let msg = Message::broadcast("alice", "hello all");
        assert!(msg.broadcast);
        assert!(msg.recipient.is_empty());
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unicast_without_recipient() {
        let msg = Message::direct("alice", "", "hi");
        assert!(matches!(
            msg.validate(),
            Err(BrokerError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_sender() {
        let msg = Message::broadcast("", "hi");
        assert!(matches!(
            msg.validate(),
            Err(BrokerError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_broadcast_with_recipient_is_valid() {
        let mut msg = Message::broadcast("alice", "hi");
        msg.recipient = "bob".to_string();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_stamp_replaces_existing_timestamp() {
        let mut msg = Message::direct("alice", "bob", "hi");
        let before = now_millis();
        msg.timestamp = 42;
        msg.stamp();
        assert!(msg.timestamp >= before);

        msg.timestamp = 0;
        msg.stamp();
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_message_deserialize_defaults() {
        let json = r#"{"sender":"alice","content":"hey","broadcast":true}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.broadcast);
        assert!(msg.recipient.is_empty());
        assert_eq!(msg.timestamp, 0);
    }
}
