//! Operator CLI for cross-node forwarding.
//!
//! Usage:
//!   haforward validate --config ha.json
//!   haforward send --config ha.json '{"type":"index-project","projectName":"foo"}'
//!   haforward decode '{"type":"update-change","projectName":"foo","id":3}'

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use haforward_node::HaConfig;
use haforward_transport::{
    BackendKind, CommandForwarder, Forwarder, GroupChannel, GroupDelivery, HttpBroker,
    HttpDelivery, InboundHandler, InboundOutcome, P2pGroupChannel, PubSubDelivery,
};
use haforward_types::Command;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "haforward")]
#[command(about = "Cross-node forwarding tools")]
struct Args {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Forward one command through the configured backend
    Send {
        #[arg(short, long)]
        config: PathBuf,

        /// Command in its JSON wire form
        command: String,

        /// How long to wait for group members before broadcasting (ms)
        #[arg(long, default_value = "3000")]
        wait_ms: u64,
    },
    /// Decode a command and print it
    Decode {
        /// Command in its JSON wire form
        command: String,
    },
}

/// This process only sends; anything a peer forwards to it is refused.
struct SendOnly;

#[async_trait]
impl InboundHandler for SendOnly {
    async fn handle(&self, _payload: &[u8]) -> InboundOutcome {
        InboundOutcome::Rejected
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match args.command {
        Cmd::Validate { config } => validate(&config),
        Cmd::Send {
            config,
            command,
            wait_ms,
        } => send(&config, &command, Duration::from_millis(wait_ms)).await,
        Cmd::Decode { command } => decode(&command),
    }
}

fn load(path: &Path) -> Result<HaConfig> {
    let config = HaConfig::load(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn validate(path: &Path) -> Result<()> {
    let config = load(path)?;
    println!("{}: ok", path.display());
    println!("  backend:      {:?}", config.forwarder.backend);
    println!(
        "  retry:        {} tries, {} ms apart",
        config.forwarder.retry.max_tries, config.forwarder.retry.retry_interval_ms
    );
    let auto_reindex = if config.auto_reindex.enabled {
        "enabled"
    } else {
        "disabled"
    };
    println!("  auto reindex: {auto_reindex}");
    Ok(())
}

fn parse_command(text: &str) -> Result<Command> {
    haforward_types::decode(text.as_bytes()).context("Failed to decode command")
}

fn decode(text: &str) -> Result<()> {
    let command = parse_command(text)?;
    println!("type:    {}", command.type_name());
    println!("subject: {}", command.subject());
    println!("{command:#?}");
    Ok(())
}

async fn send(path: &Path, text: &str, wait: Duration) -> Result<()> {
    let config = load(path)?;
    let command = parse_command(text)?;
    let forwarder = &config.forwarder;
    info!(
        "Forwarding {} {} over {:?}",
        command.type_name(),
        command.subject(),
        forwarder.backend
    );

    let delivered = match forwarder.backend {
        BackendKind::Http => {
            let delivery = HttpDelivery::new(forwarder.http.clone())?;
            if delivery.peers().is_empty() {
                warn!("No HTTP peers configured");
            }
            let sender =
                CommandForwarder::new(delivery, forwarder.policy(), forwarder.outbound_pool());
            sender.forward(command).await
        }
        BackendKind::Group => {
            let mut channel = P2pGroupChannel::new(forwarder.group.clone());
            channel.start(Arc::new(SendOnly)).await?;
            wait_for_members(&channel, wait).await;
            let sender = CommandForwarder::new(
                GroupDelivery::new(channel),
                forwarder.policy(),
                forwarder.outbound_pool(),
            );
            sender.forward(command).await
        }
        BackendKind::Pubsub => {
            let Some(remote) = forwarder.pubsub.remote.clone() else {
                bail!("pubsub.remote is not configured; the in-memory broker only reaches this process");
            };
            let delivery = PubSubDelivery::new(
                Arc::new(HttpBroker::new(remote)?),
                forwarder.pubsub.topic.clone(),
                config.instance_id(),
            );
            let sender =
                CommandForwarder::new(delivery, forwarder.policy(), forwarder.outbound_pool());
            sender.forward(command).await
        }
    };

    if !delivered {
        bail!("Command was not delivered to every peer");
    }
    println!("delivered");
    Ok(())
}

async fn wait_for_members(channel: &P2pGroupChannel, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let members = channel.members().await;
        if members.len() > 1 {
            debug!("Group has {} members", members.len());
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("No group member joined within {wait:?}");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
