//! Command handlers for the BlipChat CLI

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use blipchat_core::{HostChannel, PeerAddress, SessionEvent};

use crate::app::BlipApp;
use crate::cli::Commands;
use crate::error::Result;
use crate::stdio;

/// How long `peers` listens before printing a snapshot
pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, app: BlipApp) -> Result<()> {
        match command {
            Commands::Chat { .. } => Self::handle_chat_command(app).await,
            Commands::Peers { watch } => Self::handle_peers_command(app, watch).await,
            Commands::Host => Self::handle_host_command(app).await,
        }
    }

    /// Line-oriented chat: stdin lines go out, received messages are printed
    async fn handle_chat_command(app: BlipApp) -> Result<()> {
        app.start().await?;
        println!("Joined as '{}'. Type a message and press enter; Ctrl-C to leave.", display_name(&app));

        let (session, mut events) = app.into_parts();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match session.send(chat_payload(text)?).await {
                        Ok(report) if report.attempted == 0 => println!("(no peers in range)"),
                        Ok(report) if report.failed > 0 => {
                            println!("(delivered to {} of {} peers)", report.delivered(), report.attempted)
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Send failed: {}", e),
                    }
                }
                event = events.recv() => match event {
                    Some(SessionEvent::MessageReceived(payload)) => println!("> {}", render_message(&payload)),
                    Some(SessionEvent::PeerSetChanged(peers)) => println!("* {} peer(s) in range", peers.len()),
                    Some(_) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        session.stop().await;
        info!("Left chat");
        Ok(())
    }

    /// Print the Ready peer set once after a discovery window, or on every change
    async fn handle_peers_command(app: BlipApp, watch: bool) -> Result<()> {
        app.start().await?;
        let (session, _events) = app.into_parts();

        if !watch {
            tokio::time::sleep(DISCOVERY_WINDOW).await;
            print_peers(&session.ready_peers());
            session.stop().await;
            return Ok(());
        }

        let mut peers = session.subscribe_peers();
        print_peers(&peers.borrow_and_update());
        loop {
            tokio::select! {
                changed = peers.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    print_peers(&peers.borrow_and_update());
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        session.stop().await;
        Ok(())
    }

    /// Serve the host method channel on stdin/stdout; the host decides when to start
    async fn handle_host_command(app: BlipApp) -> Result<()> {
        let (session, events) = app.into_parts();
        let stdin = BufReader::new(tokio::io::stdin());
        stdio::serve(HostChannel::new(session), events, stdin, tokio::io::stdout()).await
    }
}

fn display_name(app: &BlipApp) -> &str {
    match app.config().device_name() {
        "" => app.config().session.default_local_name.as_str(),
        name => name,
    }
}

/// JSON object carried for a typed chat line
pub fn chat_payload(text: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&json!({ "text": text }))?)
}

/// Human-readable form of a received payload
pub fn render_message(payload: &[u8]) -> String {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => match fields.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => Value::Object(fields).to_string(),
        },
        _ => String::from_utf8_lossy(payload).into_owned(),
    }
}

fn print_peers(peers: &[PeerAddress]) {
    if peers.is_empty() {
        println!("No peers ready");
        return;
    }
    println!("{} peer(s) ready:", peers.len());
    for peer in peers {
        println!("  {}", peer);
    }
}
