//! Rollcall student client
//!
//! Checks in with the tutor server, shows the live roster and countdown, and
//! exchanges direct messages with other students.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rollcall_core::protocol::ServerFrame;
use rollcall_student::input::{self, StudentCommand};
use rollcall_student::peer::{self, Inbound, PeerListener};
use rollcall_student::{ClientError, Roster, SessionClient};

#[derive(Parser, Debug)]
#[command(name = "rollcall-student")]
#[command(version, about = "Rollcall student client - check in and chat with classmates")]
struct Cli {
    /// Tutor server address
    #[arg(long, default_value = "127.0.0.1:5000", env = "ROLLCALL_SERVER")]
    server: SocketAddr,

    /// Student ID
    #[arg(long, env = "ROLLCALL_STUDENT_ID")]
    id: String,

    /// Display name
    #[arg(long, env = "ROLLCALL_STUDENT_NAME")]
    name: String,

    /// Contact port for direct messages (default: 6000 + last two digits of the ID)
    #[arg(long)]
    port: Option<u16>,

    /// Interface the contact port listens on
    #[arg(long, default_value = "0.0.0.0")]
    bind_host: IpAddr,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, default_value = "warn", env = "ROLLCALL_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "ROLLCALL_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
#[allow(clippy::print_stdout)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    rollcall_core::tracing_init::init_tracing(
        &rollcall_core::tracing_init::default_filter(env!("CARGO_PKG_NAME"), &cli.log_level),
        cli.log_json,
    );

    let port = cli
        .port
        .or_else(|| peer::default_peer_port(&cli.id))
        .context("No contact port: pass --port or use a numeric student ID")?;

    let listener = PeerListener::bind(SocketAddr::new(cli.bind_host, port))
        .await
        .with_context(|| format!("Failed to listen on contact port {port}"))?;

    let mut client = SessionClient::connect(cli.server)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.server))?;
    match client.check_in(&cli.id, &cli.name, port).await {
        Ok(timestamp) => println!("Checked in as {} at {timestamp}", cli.id),
        Err(ClientError::Rejected(reason)) => {
            println!("Check-in refused: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    println!("{}", input::HELP);

    let (sender, mut server_events) = client.into_split();
    let (peer_tx, mut peer_events) = mpsc::channel(32);
    tokio::spawn(listener.run(peer_tx));

    let mut roster = Roster::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = server_events.recv() => {
                let Some(frame) = frame else {
                    println!("Disconnected from the server.");
                    return Ok(());
                };
                if show_server_frame(&mut roster, frame) {
                    return Ok(());
                }
            }
            Some(inbound) = peer_events.recv() => match inbound {
                Inbound::Message { from, text } => {
                    println!("[{}] {text}", from.as_deref().unwrap_or("anonymous"));
                }
                Inbound::Server(frame) => {
                    if show_server_frame(&mut roster, frame) {
                        return Ok(());
                    }
                }
            },
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    debug!("Stdin closed");
                    sender.exit().await?;
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<StudentCommand>() {
                    Ok(StudentCommand::Message { to, text }) => {
                        match send_message(&roster, &cli.id, &to, &text).await {
                            Ok(()) => println!("Message sent to {to}."),
                            Err(e) => println!("{e}"),
                        }
                    }
                    Ok(StudentCommand::Who) => print_roster(&roster),
                    Ok(StudentCommand::Help) => println!("{}", input::HELP),
                    Ok(StudentCommand::Exit) => {
                        sender.exit().await?;
                        println!("Checked out.");
                        return Ok(());
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
    }
}

async fn send_message(
    roster: &Roster,
    self_id: &str,
    to: &str,
    text: &str,
) -> rollcall_student::Result<()> {
    let addr = roster.resolve(to, self_id)?;
    peer::send_peer_message(addr, self_id, text).await
}

/// Show a server frame. Returns `true` once the session is over.
#[allow(clippy::print_stdout)]
fn show_server_frame(roster: &mut Roster, frame: ServerFrame) -> bool {
    match frame {
        ServerFrame::RosterUpdate { attendees } => {
            roster.update(attendees);
            print_roster(roster);
        }
        ServerFrame::TimeRemaining { minutes, seconds } => {
            if seconds == 0 || (minutes == 0 && seconds <= 10) {
                println!("Time remaining: {minutes}:{seconds:02}");
            }
        }
        ServerFrame::WarningFired { minutes_left } => {
            println!("Warning: about {minutes_left} minute(s) left in the session.");
        }
        ServerFrame::SessionEnded => {
            roster.clear();
            println!("The session has ended.");
            return true;
        }
        ServerFrame::CheckInAck { .. } | ServerFrame::CheckInReject { .. } => {
            warn!(frame = frame.kind(), "Unexpected check-in reply");
        }
    }
    false
}

#[allow(clippy::print_stdout)]
fn print_roster(roster: &Roster) {
    println!("Students present ({}):", roster.len());
    for entry in roster.entries() {
        println!("  {:<12} {:<24} {}:{}", entry.id, entry.name, entry.host, entry.port);
    }
}
