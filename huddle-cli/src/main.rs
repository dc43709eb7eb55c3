//! Minimal line client for the huddle chat broker.
//!
//! Reads messages from stdin, prints the tenant's event log as it grows,
//! and shows connection-state transitions on stderr. Useful for poking at
//! a broker by hand:
//!
//! ```text
//! HUDDLE_TOKEN=eyJ... huddle --endpoint chat.example.com:9430 --tls
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use huddle_sdk::{BrokerConfig, ChatEvent, Delivery, LogEntry, Session};

#[derive(Parser)]
#[command(name = "huddle", about = "Line client for the huddle tenant chat broker")]
struct Cli {
    /// Broker endpoint (host:port)
    #[arg(long, default_value = "127.0.0.1:9430")]
    endpoint: String,

    /// Bearer credential from the platform auth flow
    #[arg(long, env = "HUDDLE_TOKEN")]
    token: String,

    /// Connect over TLS
    #[arg(long)]
    tls: bool,
}

fn render(entry: &LogEntry) -> Option<String> {
    match &entry.event {
        ChatEvent::Join { sender, .. } => Some(format!("* {sender} joined")),
        ChatEvent::Leave { sender, .. } => Some(format!("* {sender} left")),
        ChatEvent::Message {
            sender, content, ..
        } => Some(format!(
            "[{}] <{}> {}",
            entry.sent_at.format("%H:%M:%S"),
            sender,
            content
        )),
        // Unknown events hold their place in the log but render as nothing.
        ChatEvent::Unknown { .. } => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BrokerConfig {
        endpoint: cli.endpoint,
        tls: cli.tls,
        ..Default::default()
    };

    let (session, mut events) = Session::open(config, &cli.token).context("cannot start chat")?;
    eprintln!(
        "chatting as {} in {} ({})",
        session.identity().display_name,
        session.topic(),
        session.identity().tenant_id
    );

    let mut state_rx = session.state_stream();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                entry = events.recv() => match entry {
                    Some(entry) => {
                        if let Some(line) = render(&entry) {
                            println!("{line}");
                        }
                    }
                    None => break,
                },
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    eprintln!("-- {}", *state_rx.borrow());
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match session.send(line).await {
            Ok(Delivery::Sent { .. }) => {}
            Ok(Delivery::Queued { depth }) => {
                eprintln!("(offline — queued, {depth} pending)");
            }
            Err(err) => eprintln!("send failed: {err}"),
        }
    }

    session.close().await;
    Ok(())
}
