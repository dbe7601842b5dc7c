//! Tutor console commands read from stdin by the server binary.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::server::SessionCoordinator;
use crate::session::{TimerPhase, minutes_seconds};

/// One line typed by the tutor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    End,
    Reset,
    Roster,
    Status,
    Help,
    Quit,
}

/// Unrecognised console input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown command: {0} (type `help`)")]
pub struct UnknownCommand(pub String);

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "end" | "stop" => Ok(Self::End),
            "reset" => Ok(Self::Reset),
            "roster" | "who" => Ok(Self::Roster),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
Commands:
  start   start the session countdown now
  end     end the session and refuse further check-ins
  reset   clear the roster and prepare a new session
  roster  list checked-in students
  status  show session phase and time left
  quit    shut the server down";

/// Run a command and return the text to show the tutor.
pub async fn execute(coordinator: &SessionCoordinator, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Start => {
            if coordinator.start_session().await {
                "Session started.".to_string()
            } else {
                "Session is already running or has ended.".to_string()
            }
        }
        ConsoleCommand::End => {
            if coordinator.end_session().await {
                "Session ended.".to_string()
            } else {
                "Session had already ended.".to_string()
            }
        }
        ConsoleCommand::Reset => {
            coordinator.reset().await;
            "Session reset. Waiting for the first check-in.".to_string()
        }
        ConsoleCommand::Roster => render_roster(coordinator).await,
        ConsoleCommand::Status => render_status(coordinator).await,
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "Shutting down.".to_string(),
    }
}

async fn render_roster(coordinator: &SessionCoordinator) -> String {
    let roster = coordinator.current_roster().await;
    let mut out = format!(
        "{} of {} students checked in",
        roster.len(),
        coordinator.config().capacity
    );
    for attendee in &roster {
        let _ = write!(
            out,
            "\n  {:<12} {:<24} {}",
            attendee.id,
            attendee.display_name,
            attendee.contact.peer_addr()
        );
    }
    out
}

async fn render_status(coordinator: &SessionCoordinator) -> String {
    let phase = coordinator.timer_phase().await;
    let label = match phase {
        TimerPhase::Idle => "waiting for first check-in",
        TimerPhase::Active => "running",
        TimerPhase::WarningSent => "running (warning sent)",
        TimerPhase::Ended => "ended",
    };
    let mut out = match coordinator.remaining().await {
        Some(remaining) => {
            let (minutes, seconds) = minutes_seconds(remaining);
            format!("Session {label}, {minutes}:{seconds:02} left")
        }
        None => format!("Session {label}"),
    };
    if !coordinator.accepting_check_ins().await {
        out.push_str(", check-ins closed");
    }
    out
}
