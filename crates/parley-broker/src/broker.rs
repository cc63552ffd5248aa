//! Message broker: inbound queue, dispatch loop and lifecycle.

use crate::config::BrokerConfig;
use crate::endpoint::{create_endpoint, Endpoint};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::registry::Registry;
use crate::session::Session;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Constructed; messages may be queued but nothing is dispatched.
    Created,
    /// Dispatch loop is running.
    Running,
    /// Cancellation was observed and the loop has exited.
    Terminated,
}

/// Broker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Current number of registered users.
    pub registered_users: usize,
    /// Registrations since start.
    pub total_registrations: u64,
    /// Messages accepted onto the inbound queue.
    pub messages_enqueued: u64,
    /// Messages routed by the dispatch loop.
    pub messages_dispatched: u64,
    /// Successful endpoint writes.
    pub deliveries: u64,
    /// Unicast messages whose recipient was not registered.
    pub dropped_unknown_recipient: u64,
    /// Messages rejected by validation at dispatch.
    pub dropped_malformed: u64,
    /// Per-recipient drops because the endpoint was full.
    pub dropped_endpoint_full: u64,
    /// Per-recipient drops because the endpoint was closed.
    pub dropped_endpoint_closed: u64,
    /// Messages still queued when the broker terminated.
    pub discarded_on_shutdown: u64,
}

/// Routes chat messages between registered users.
///
/// Producers submit with [`Broker::send_message`]; a single dispatch loop
/// started by [`Broker::run`] drains the inbound queue in order and writes
/// each message to its targets' endpoints:
///
/// - a broadcast goes to every registered user, the sender included;
/// - a unicast goes to the recipient if registered, and is dropped silently
///   otherwise.
///
/// Endpoint writes never block the loop. A full bounded endpoint loses that
/// one message for that one recipient; everyone else is unaffected.
///
/// Messages still queued when cancellation fires are discarded: delivery is
/// at-most-once across shutdown.
///
/// `Broker` is a cheap handle; clones share the same queue and registry.
#[derive(Debug, Clone)]
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<Registry>,
    input_tx: mpsc::Sender<Message>,
    input_rx: Arc<Mutex<Option<mpsc::Receiver<Message>>>>,
    state: Arc<RwLock<BrokerState>>,
    stats: Arc<RwLock<BrokerStats>>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
}

impl Broker {
    /// Create a broker bound to `shutdown`.
    ///
    /// The broker listens on a child of `shutdown`: cancelling the parent
    /// stops the broker, [`Broker::shutdown`] stops only the broker.
    pub fn new(config: BrokerConfig, shutdown: &CancellationToken) -> Result<Self> {
        config.validate()?;
        let (input_tx, input_rx) = mpsc::channel(config.inbound_capacity);

        Ok(Self {
            config,
            registry: Arc::new(Registry::new()),
            input_tx,
            input_rx: Arc::new(Mutex::new(Some(input_rx))),
            state: Arc::new(RwLock::new(BrokerState::Created)),
            stats: Arc::new(RwLock::new(BrokerStats::default())),
            shutdown: shutdown.child_token(),
            terminated: CancellationToken::new(),
        })
    }

    /// Start the dispatch loop on the current tokio runtime.
    pub fn run(&self) -> Result<JoinHandle<()>> {
        if *self.state.read() == BrokerState::Terminated {
            return Err(BrokerError::Closed);
        }

        let receiver = self
            .input_rx
            .lock()
            .take()
            .ok_or(BrokerError::AlreadyRunning)?;

        *self.state.write() = BrokerState::Running;

        let dispatcher = Dispatcher {
            receiver,
            registry: self.registry.clone(),
            state: self.state.clone(),
            stats: self.stats.clone(),
            shutdown: self.shutdown.clone(),
            terminated: self.terminated.clone(),
        };

        info!(
            inbound_capacity = self.config.inbound_capacity,
            "Broker started"
        );

        Ok(tokio::spawn(dispatcher.run()))
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Broker shutdown requested");
            self.shutdown.cancel();
        }
    }

    /// Wait until the dispatch loop has exited.
    ///
    /// Only resolves for a broker that was started with [`Broker::run`].
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BrokerState {
        *self.state.read()
    }

    /// Submit a message for routing.
    ///
    /// Waits while the inbound queue is full. Fails with
    /// [`BrokerError::Closed`] once shutdown has begun, including for a
    /// caller that is already waiting. The timestamp is overwritten with
    /// the current time. A unicast to an unknown recipient
    /// still succeeds here; the drop happens at dispatch.
    pub async fn send_message(&self, mut message: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        message.stamp();

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(BrokerError::Closed),
            sent = self.input_tx.send(message) => {
                sent.map_err(|_| BrokerError::Closed)?;
                self.stats.write().messages_enqueued += 1;
                Ok(())
            }
        }
    }

    /// Submit a message without waiting for queue space.
    pub fn try_send_message(&self, mut message: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        message.stamp();

        self.input_tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => BrokerError::QueueFull,
            TrySendError::Closed(_) => BrokerError::Closed,
        })?;
        self.stats.write().messages_enqueued += 1;
        Ok(())
    }

    /// Register `endpoint` for `user_id`, replacing any previous one.
    ///
    /// The replaced endpoint is not closed. Registering on a terminated
    /// broker closes `endpoint` right away so its reader does not wait
    /// forever.
    pub fn register_user(&self, user_id: impl Into<String>, endpoint: Endpoint) {
        let user_id = user_id.into();
        self.registry.register(user_id.clone(), endpoint.clone());

        // State is flipped before the registry is drained at termination,
        // so either the drain or this check closes the endpoint.
        if *self.state.read() == BrokerState::Terminated {
            debug!(user_id = %user_id, "Registration after termination, closing endpoint");
            self.registry.unregister_endpoint(&user_id, &endpoint);
            return;
        }

        self.stats.write().total_registrations += 1;
    }

    /// Remove `user_id` and close its endpoint. No-op if absent.
    pub fn unregister_user(&self, user_id: &str) -> bool {
        self.registry.unregister(user_id)
    }

    /// Endpoint registered for `user_id`.
    pub fn lookup(&self, user_id: &str) -> Option<Endpoint> {
        self.registry.lookup(user_id)
    }

    /// Registered user ids, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        self.registry.user_ids()
    }

    /// Create an endpoint with the configured capacity, register it for
    /// `user_id` and wrap it in a [`Session`].
    pub fn connect(&self, user_id: impl Into<String>) -> Session {
        let user_id = user_id.into();
        let (endpoint, inbox) = create_endpoint(self.config.endpoint_capacity);
        self.register_user(user_id.clone(), endpoint.clone());

        let session = Session::new(self.clone(), user_id, endpoint, inbox);
        info!(
            user_id = %session.user_id(),
            session_id = %session.id(),
            "User connected"
        );
        session
    }

    /// Broker statistics.
    pub fn stats(&self) -> BrokerStats {
        let mut stats = self.stats.read().clone();
        stats.registered_users = self.registry.len();
        stats
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// State owned by the dispatch task.
struct Dispatcher {
    receiver: mpsc::Receiver<Message>,
    registry: Arc<Registry>,
    state: Arc<RwLock<BrokerState>>,
    stats: Arc<RwLock<BrokerStats>>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.receiver.recv() => received,
            };

            match received {
                Some(message) => self.dispatch(message),
                None => break,
            }
        }

        self.finish();
    }

    fn dispatch(&self, message: Message) {
        if let Err(e) = message.validate() {
            warn!(sender = %message.sender, error = %e, "Dropping malformed message");
            self.stats.write().dropped_malformed += 1;
            return;
        }
        self.stats.write().messages_dispatched += 1;

        if message.broadcast {
            let targets = self.registry.snapshot();
            debug!(
                sender = %message.sender,
                recipients = targets.len(),
                "Broadcasting message"
            );
            for (user_id, endpoint) in targets {
                self.deliver(&user_id, &endpoint, message.clone());
            }
        } else {
            match self.registry.lookup(&message.recipient) {
                Some(endpoint) => {
                    let recipient = message.recipient.clone();
                    self.deliver(&recipient, &endpoint, message);
                }
                None => {
                    debug!(
                        sender = %message.sender,
                        recipient = %message.recipient,
                        "Recipient not registered, dropping message"
                    );
                    self.stats.write().dropped_unknown_recipient += 1;
                }
            }
        }
    }

    fn deliver(&self, user_id: &str, endpoint: &Endpoint, message: Message) {
        match endpoint.deliver(message) {
            Ok(()) => self.stats.write().deliveries += 1,
            Err(BrokerError::EndpointFull) => {
                warn!(user_id = %user_id, "Endpoint full, dropping message for recipient");
                self.stats.write().dropped_endpoint_full += 1;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Endpoint unavailable");
                self.stats.write().dropped_endpoint_closed += 1;
            }
        }
    }

    fn finish(mut self) {
        *self.state.write() = BrokerState::Terminated;

        self.receiver.close();
        let mut discarded = 0u64;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        self.stats.write().discarded_on_shutdown += discarded;

        let closed = self.registry.close_all();
        info!(
            discarded,
            closed_endpoints = closed,
            "Broker terminated"
        );

        self.terminated.cancel();
    }
}
