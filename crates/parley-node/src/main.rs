//! Parley Node - console chat over an in-process message broker.
//!
//! Reads commands from stdin, prints delivered messages to stdout and logs
//! to stderr. Ctrl+C or end of input shuts the broker down.

use clap::Parser;
use parley_broker::{Broker, UserManager};
use parley_node::config::NodeConfig;
use parley_node::console::Console;
use parley_node::observability::{init_logging, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Parley Node - in-process chat broker with a console transport
#[derive(Parser, Debug)]
#[command(name = "parley-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parley.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Inbound queue capacity
    #[arg(long)]
    inbound_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    if let Some(capacity) = args.inbound_capacity {
        config.broker.inbound_capacity = capacity;
    }
    config.validate()?;

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting parley node");

    let shutdown = CancellationToken::new();

    let directory = UserManager::with_cancellation(shutdown.clone());
    for user in config.users {
        directory.add_user(user)?;
    }
    tracing::info!(known_users = directory.len(), "User directory loaded");

    let broker = Broker::new(config.broker, &shutdown)?;
    broker.run()?;

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received");
                shutdown.cancel();
            }
        });
    }

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = output_rx.recv().await {
            if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut console = Console::new(
        broker.clone(),
        Arc::new(directory),
        output_tx,
        shutdown.clone(),
    );
    if let Err(e) = console.run(BufReader::new(tokio::io::stdin())).await {
        tracing::error!(error = %e, "Failed to read input");
    }

    shutdown.cancel();
    broker.terminated().await;
    console.finish().await;
    let _ = printer.await;

    tracing::info!("Parley node stopped");
    Ok(())
}
