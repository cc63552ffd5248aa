//! Broker configuration.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the message broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Capacity of the shared inbound queue. Senders wait while it is full.
    pub inbound_capacity: usize,

    /// Capacity of each endpoint created by [`crate::Broker::connect`].
    /// `None` creates unbounded endpoints.
    pub endpoint_capacity: Option<usize>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            endpoint_capacity: Some(64),
        }
    }
}

impl BrokerConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.inbound_capacity == 0 {
            return Err(BrokerError::InvalidConfig(
                "inbound_capacity must be at least 1".into(),
            ));
        }

        if self.endpoint_capacity == Some(0) {
            return Err(BrokerError::InvalidConfig(
                "endpoint_capacity must be at least 1 or unset".into(),
            ));
        }

        Ok(())
    }
}
