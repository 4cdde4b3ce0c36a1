//! Nearby session CLI.
//!
//! Drives the session core against a recording transport, which makes it a
//! dry-run tool for negotiation and transfer flows.
//!
//! # Commands
//!
//! - `replay` - Run a JSON script of commands and transport events
//! - `config` - Print the resolved configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nearby::{
    config::{Config, LoggingConfig},
    runtime::{event_channel, SessionRuntime},
    script::Script,
    session::{Notice, SessionFacade},
    transport::RecordingTransport,
    VERSION,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

#[derive(Parser)]
#[command(name = "nearby")]
#[command(version = VERSION)]
#[command(about = "Nearby peer discovery and session core", long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a session script
    Replay {
        /// Script file (JSON)
        file: PathBuf,

        /// Print the final snapshot as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_logging(&config.logging, cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Replay { file, json } => cmd_replay(config, file, json),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        },
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool, json_logs: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json_logs || logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn cmd_replay(config: Config, file: PathBuf, json: bool) -> anyhow::Result<()> {
    let script = Script::from_file(&file)
        .map_err(|e| anyhow::anyhow!("Failed to load script {}: {}", file.display(), e))?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let transport = RecordingTransport::new();
        let calls = transport.log();
        let facade = SessionFacade::new(config.session.clone(), transport);
        let (_events_tx, events_rx) = event_channel(config.runtime.event_buffer);
        let handle = SessionRuntime::spawn(facade, events_rx, &config.runtime);

        let notices = handle.subscribe_notices();
        let printer = tokio::spawn(forward_notices(notices, |notice| println!("  - {notice}")));

        let outcomes = script.run(&handle).await?;
        let snapshot = handle.snapshot();
        let received = handle.received().await?;
        handle.shutdown().await?;
        drop(handle);
        let _ = printer.await;

        println!();
        for outcome in &outcomes {
            println!("{outcome}");
        }

        println!();
        println!("Transport calls: {}", calls.calls().len());
        for call in calls.calls() {
            println!("  {call:?}");
        }

        println!();
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            println!("Endpoints:   {}", snapshot.endpoints.len());
            println!("Pending:     {}", snapshot.pending_requests.len());
            println!("Connections: {}", snapshot.connections.len());
            for view in &snapshot.connections {
                println!(
                    "  {} ({}) payloads={}",
                    view.connection.display_name,
                    view.connection.endpoint_id,
                    view.payloads.len()
                );
            }
            for (endpoint_id, data) in &received {
                println!("Received from {endpoint_id}: {}", String::from_utf8_lossy(data));
            }
        }

        Ok::<_, anyhow::Error>(())
    })
}

/// Hand every notice to `emit` until the session closes the channel.
/// Notices dropped because the reader fell behind are logged and skipped.
async fn forward_notices(mut notices: broadcast::Receiver<Notice>, mut emit: impl FnMut(&Notice)) {
    loop {
        match notices.recv().await {
            Ok(notice) => emit(&notice),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notice printer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_notices_survives_lag() {
        let (tx, rx) = broadcast::channel(2);
        for notice in [
            Notice::AdvertisingStarted,
            Notice::DiscoveryStarted,
            Notice::DiscoveryStopped,
            Notice::AdvertisingStopped,
        ] {
            tx.send(notice).unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        forward_notices(rx, |notice| seen.push(notice.clone())).await;
        assert_eq!(seen, vec![Notice::DiscoveryStopped, Notice::AdvertisingStopped]);
    }
}
