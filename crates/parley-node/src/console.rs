//! Line-oriented console transport.
//!
//! Each input line is one command:
//!
//! ```text
//! /join <id>              connect a user and start printing its inbox
//! /leave <id>             disconnect a user
//! /who                    list connected users
//! /stats                  print broker statistics
//! <sender> -> <id>: text  direct message
//! <sender> -> *: text     broadcast
//! /quit                   stop reading input
//! ```
//!
//! Delivered messages are written to the output channel as
//! `[<recipient>] <sender>: <content>`.

use parley_broker::{Broker, BrokerError, Message, UserManager};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect a user.
    Join(String),
    /// Disconnect a user.
    Leave(String),
    /// List connected users.
    Who,
    /// Show broker statistics.
    Stats,
    /// Direct message.
    Send {
        sender: String,
        recipient: String,
        content: String,
    },
    /// Broadcast message.
    Broadcast { sender: String, content: String },
    /// Stop reading input.
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();

        let command = match (name, arg) {
            ("join", Some(id)) => Command::Join(id.to_string()),
            ("leave", Some(id)) => Command::Leave(id.to_string()),
            ("who", None) => Command::Who,
            ("stats", None) => Command::Stats,
            ("quit", None) => Command::Quit,
            ("join" | "leave", None) => return Err(format!("usage: /{} <id>", name)),
            _ => return Err(format!("unknown command: /{}", rest)),
        };
        return Ok(Some(command));
    }

    let (sender, rest) = line
        .split_once("->")
        .ok_or_else(|| "expected '<sender> -> <recipient>: <content>'".to_string())?;
    let (recipient, content) = rest
        .split_once(':')
        .ok_or_else(|| "missing ':' before message content".to_string())?;

    let sender = sender.trim().to_string();
    let recipient = recipient.trim();
    let content = content.trim().to_string();

    if sender.is_empty() || recipient.is_empty() {
        return Err("sender and recipient are required".to_string());
    }

    if recipient == "*" {
        Ok(Some(Command::Broadcast { sender, content }))
    } else {
        Ok(Some(Command::Send {
            sender,
            recipient: recipient.to_string(),
            content,
        }))
    }
}

/// Console transport bound to one broker.
pub struct Console {
    broker: Broker,
    directory: Arc<UserManager>,
    output: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    readers: HashMap<String, JoinHandle<()>>,
}

impl Console {
    /// Create a console writing its output lines to `output`.
    pub fn new(
        broker: Broker,
        directory: Arc<UserManager>,
        output: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            broker,
            directory,
            output,
            shutdown,
            readers: HashMap::new(),
        }
    }

    /// Read and execute commands until end of input, `/quit`, shutdown, or
    /// the broker closing.
    pub async fn run<R>(&mut self, input: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };

            let Some(line) = line else { break };

            match parse_command(&line) {
                Ok(Some(command)) => {
                    if !self.execute(command).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => self.print(format!("error: {}", e)),
            }
        }

        Ok(())
    }

    /// Execute one command. Returns `false` when the console should stop.
    pub async fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Join(user_id) => self.join(user_id),
            Command::Leave(user_id) => {
                if self.broker.unregister_user(&user_id) {
                    self.print(format!("{} left", user_id));
                } else {
                    self.print(format!("{} is not connected", user_id));
                }
                // The reader task ends on its own once the inbox closes.
                self.readers.remove(&user_id);
            }
            Command::Who => {
                let users = self.broker.user_ids();
                if users.is_empty() {
                    self.print("nobody is connected".to_string());
                } else {
                    self.print(users.join(", "));
                }
            }
            Command::Stats => {
                let stats = self.broker.stats();
                self.print(format!(
                    "users={} enqueued={} dispatched={} delivered={} dropped_unknown={} dropped_malformed={} dropped_full={}",
                    stats.registered_users,
                    stats.messages_enqueued,
                    stats.messages_dispatched,
                    stats.deliveries,
                    stats.dropped_unknown_recipient,
                    stats.dropped_malformed,
                    stats.dropped_endpoint_full,
                ));
            }
            Command::Send {
                sender,
                recipient,
                content,
            } => return self.submit(Message::direct(sender, recipient, content)).await,
            Command::Broadcast { sender, content } => {
                return self.submit(Message::broadcast(sender, content)).await
            }
            Command::Quit => return false,
        }
        true
    }

    /// Wait for every inbox reader to finish.
    ///
    /// Readers end when their user leaves or the broker terminates.
    pub async fn finish(self) {
        for (user_id, reader) in self.readers {
            if let Err(e) = reader.await {
                warn!(user_id = %user_id, error = %e, "Inbox reader failed");
            }
        }
    }

    fn join(&mut self, user_id: String) {
        if !self.directory.is_empty() && self.directory.get_user(&user_id).is_err() {
            self.print(format!("unknown user: {}", user_id));
            return;
        }
        if self.readers.contains_key(&user_id) && self.broker.lookup(&user_id).is_some() {
            self.print(format!("{} is already connected", user_id));
            return;
        }

        let mut session = self.broker.connect(user_id.clone());
        let output = self.output.clone();
        let reader_id = user_id.clone();

        let reader = tokio::spawn(async move {
            while let Some(msg) = session.recv().await {
                let line = format!("[{}] {}: {}", reader_id, msg.sender, msg.content);
                if output.send(line).is_err() {
                    break;
                }
            }
            debug!(user_id = %reader_id, "Inbox reader ended");
        });

        self.readers.insert(user_id.clone(), reader);
        self.print(format!("{} joined", user_id));
    }

    async fn submit(&self, message: Message) -> bool {
        match self.broker.send_message(message).await {
            Ok(()) => true,
            Err(BrokerError::Closed) => {
                self.print("broker closed".to_string());
                false
            }
            Err(e) => {
                self.print(format!("error: {}", e));
                true
            }
        }
    }

    fn print(&self, line: String) {
        let _ = self.output.send(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_broker::{BrokerConfig, User};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("/join alice"),
            Ok(Some(Command::Join("alice".to_string())))
        );
        assert_eq!(
            parse_command("  /leave bob "),
            Ok(Some(Command::Leave("bob".to_string())))
        );
        assert_eq!(parse_command("/who"), Ok(Some(Command::Who)));
        assert_eq!(parse_command("/stats"), Ok(Some(Command::Stats)));
        assert_eq!(parse_command("/quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            parse_command("alice -> bob: hi there"),
            Ok(Some(Command::Send {
                sender: "alice".to_string(),
                recipient: "bob".to_string(),
                content: "hi there".to_string(),
            }))
        );
        assert_eq!(
            parse_command("alice -> *: time: noon"),
            Ok(Some(Command::Broadcast {
                sender: "alice".to_string(),
                content: "time: noon".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("/join").is_err());
        assert!(parse_command("/dance").is_err());
        assert!(parse_command("hello").is_err());
        assert!(parse_command("alice -> bob hi").is_err());
        assert!(parse_command(" -> bob: hi").is_err());
    }

    #[tokio::test]
    async fn test_console_session() {
        let shutdown = CancellationToken::new();
        let broker = Broker::new(BrokerConfig::default(), &shutdown).unwrap();
        broker.run().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut console = Console::new(
            broker.clone(),
            Arc::new(UserManager::new()),
            tx,
            shutdown.clone(),
        );

        let input: &[u8] = b"/join alice\n/join bob\nalice -> bob: hi\nbob -> *: hello all\n";
        console.run(input).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "alice joined");
        assert_eq!(rx.recv().await.unwrap(), "bob joined");

        // Readers run concurrently, so delivery lines may interleave.
        let mut expected = vec![
            "[alice] bob: hello all".to_string(),
            "[bob] alice: hi".to_string(),
            "[bob] bob: hello all".to_string(),
        ];
        let mut delivered = Vec::new();
        while delivered.len() < expected.len() {
            delivered.push(timeout(WAIT, rx.recv()).await.unwrap().unwrap());
        }
        delivered.sort();
        expected.sort();
        assert_eq!(delivered, expected);

        shutdown.cancel();
        broker.terminated().await;
        timeout(WAIT, console.finish()).await.unwrap();
    }

    #[tokio::test]
    async fn test_console_rejects_unknown_user() {
        let shutdown = CancellationToken::new();
        let broker = Broker::new(BrokerConfig::default(), &shutdown).unwrap();
        let directory = UserManager::new();
        directory
            .add_user(User::new("alice", "Alice", "alice@example.com"))
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut console = Console::new(broker.clone(), Arc::new(directory), tx, shutdown);

        assert!(console.execute(Command::Join("mallory".to_string())).await);
        assert_eq!(rx.recv().await.unwrap(), "unknown user: mallory");
        assert!(broker.lookup("mallory").is_none());

        assert!(console.execute(Command::Join("alice".to_string())).await);
        assert_eq!(rx.recv().await.unwrap(), "alice joined");
        assert!(console.execute(Command::Join("alice".to_string())).await);
        assert_eq!(rx.recv().await.unwrap(), "alice is already connected");
    }

    #[tokio::test]
    async fn test_console_leave_and_who() {
        let shutdown = CancellationToken::new();
        let broker = Broker::new(BrokerConfig::default(), &shutdown).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut console = Console::new(
            broker.clone(),
            Arc::new(UserManager::new()),
            tx,
            shutdown,
        );

        console.execute(Command::Join("alice".to_string())).await;
        console.execute(Command::Who).await;
        console.execute(Command::Leave("alice".to_string())).await;
        console.execute(Command::Leave("alice".to_string())).await;
        console.execute(Command::Who).await;

        assert_eq!(rx.recv().await.unwrap(), "alice joined");
        assert_eq!(rx.recv().await.unwrap(), "alice");
        assert_eq!(rx.recv().await.unwrap(), "alice left");
        assert_eq!(rx.recv().await.unwrap(), "alice is not connected");
        assert_eq!(rx.recv().await.unwrap(), "nobody is connected");
    }

    #[tokio::test]
    async fn test_console_stops_when_broker_closed() {
        let shutdown = CancellationToken::new();
        let broker = Broker::new(BrokerConfig::default(), &shutdown).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut console = Console::new(
            broker.clone(),
            Arc::new(UserManager::new()),
            tx,
            CancellationToken::new(),
        );

        broker.shutdown();
        let keep_going = console
            .execute(Command::Broadcast {
                sender: "alice".to_string(),
                content: "hi".to_string(),
            })
            .await;

        assert!(!keep_going);
        assert_eq!(rx.recv().await.unwrap(), "broker closed");
    }
}
