//! Rollcall tutor server
//!
//! Accepts student check-ins over TCP, runs the session countdown and keeps
//! every student's roster in sync. The tutor drives the session from stdin.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use rollcall_core::config::load_config;
use rollcall_core::{DeliveryMode, SessionProfile};
use rollcall_server::audit::TracingAuditSink;
use rollcall_server::console::{self, ConsoleCommand};
use rollcall_server::server::{ServerConfig, SessionCoordinator, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "rollcall-server")]
#[command(version, about = "Rollcall tutor server - attendance and session timer")]
struct Args {
    /// Explicit JSON config file (overrides the global settings file)
    #[arg(long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// TCP bind address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Session profile: "small" or "classroom"
    #[arg(long)]
    profile: Option<SessionProfile>,

    /// Maximum simultaneous students (overrides the profile)
    #[arg(long)]
    capacity: Option<usize>,

    /// Session length in seconds (overrides the profile)
    #[arg(long)]
    session_secs: Option<u64>,

    /// Seconds before the end at which students are warned
    #[arg(long)]
    warning_secs: Option<u64>,

    /// Broadcast delivery: "link" (check-in connection) or "dial" (contact port)
    #[arg(long)]
    delivery: Option<DeliveryMode>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "ROLLCALL_LOG_JSON")]
    log_json: bool,

    /// Do not read tutor commands from stdin.
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = load_config(args.config.as_deref())?.server;
    if let Some(addr) = args.addr {
        settings.listen_addr = addr;
    }
    if let Some(profile) = args.profile {
        settings.profile = profile;
    }
    if args.capacity.is_some() {
        settings.capacity = args.capacity;
    }
    if args.session_secs.is_some() {
        settings.session_duration_secs = args.session_secs;
    }
    if args.warning_secs.is_some() {
        settings.warning_lead_secs = args.warning_secs;
    }
    if let Some(delivery) = args.delivery {
        settings.delivery = delivery;
    }
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    settings.validate()?;

    rollcall_core::tracing_init::init_tracing(
        &rollcall_core::tracing_init::default_filter(
            env!("CARGO_PKG_NAME"),
            &settings.log_level,
        ),
        args.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %settings.listen_addr,
        profile = ?settings.profile,
        capacity = settings.capacity(),
        "Starting rollcall-server"
    );

    let listener = TcpListener::bind(settings.listen_addr).await?;
    let coordinator =
        SessionCoordinator::new(ServerConfig::from(&settings), Arc::new(TracingAuditSink));
    tokio::spawn(log_session_events(coordinator.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut quit_rx = shutdown_tx.subscribe();
    if !args.no_console {
        tokio::spawn(run_console(coordinator.clone(), shutdown_tx.clone()));
    }

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the server is ready to accept students (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    let server = coordinator.clone();
    let mut serve = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    tokio::select! {
        _ = &mut serve => {
            warn!("Accept loop ended unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
        _ = quit_rx.changed() => {
            info!("Shutdown requested from the console");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = serve.await;

    info!("Server stopped");
    Ok(())
}

/// Mirror session events into the log.
async fn log_session_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::TimeRemaining { minutes, seconds }) => {
                debug!(minutes, seconds, "Time remaining");
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "Session event"),
                Err(e) => warn!(error = %e, "Failed to encode session event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Read tutor commands from stdin until `quit` or end of input.
#[allow(clippy::print_stdout)]
async fn run_console(coordinator: SessionCoordinator, shutdown: watch::Sender<bool>) {
    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                println!("{}", console::execute(&coordinator, command).await);
                if command == ConsoleCommand::Quit {
                    let _ = shutdown.send(true);
                    return;
                }
            }
            Err(e) => println!("{e}"),
        }
    }
}
