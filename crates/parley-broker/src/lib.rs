//! # Parley Broker
//!
//! In-process message broker that routes chat messages between connected
//! users.
//!
//! ## Features
//!
//! - **Registry**: user id to delivery endpoint, behind one reader/writer lock
//! - **Dispatch loop**: one task drains the inbound queue in submission order
//! - **Unicast and broadcast**: direct messages to one user, or to everyone
//! - **Cancellation**: a single token stops the loop and releases waiting senders
//!
//! ## Example
//!
//! ```rust,no_run
//! use parley_broker::{Broker, BrokerConfig, Message};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), parley_broker::BrokerError> {
//! let shutdown = CancellationToken::new();
//! let broker = Broker::new(BrokerConfig::default(), &shutdown)?;
//! broker.run()?;
//!
//! let mut bob = broker.connect("bob");
//! broker.send_message(Message::direct("alice", "bob", "hi")).await?;
//!
//! let msg = bob.recv().await;
//! assert_eq!(msg.map(|m| m.content), Some("hi".to_string()));
//!
//! shutdown.cancel();
//! broker.terminated().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery semantics
//!
//! - Broadcasts reach every registered user, the sender included.
//! - Unicast to an unregistered user is dropped without an error.
//! - Endpoint writes never block: a full endpoint loses the message for that
//!   recipient only.
//! - Messages still queued at shutdown are discarded.
//!
//! ## Architecture
//!
//! ```text
//!  producers ──send_message──▶ ┌──────────────┐
//!                              │ inbound queue│ (bounded)
//!                              └──────┬───────┘
//!                                     ▼
//!                              ┌──────────────┐   lookup / snapshot
//!                              │ dispatch loop│ ───────────────────▶ Registry
//!                              └──────┬───────┘                     (RwLock)
//!                     deliver (no lock held)
//!                ┌────────────┬───────┴────┐
//!                ▼            ▼            ▼
//!            Endpoint     Endpoint     Endpoint
//!                │            │            │
//!              Inbox        Inbox        Inbox   ◀── sessions
//! ```

pub mod broker;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;
pub mod user;

// Re-export main types
pub use broker::{Broker, BrokerState, BrokerStats};
pub use config::BrokerConfig;
pub use endpoint::{create_endpoint, Endpoint, Inbox};
pub use error::{BrokerError, Result, UserError};
pub use message::Message;
pub use registry::Registry;
pub use session::Session;
pub use user::{is_valid_email, User, UserManager};
