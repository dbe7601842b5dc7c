//! Events published to presentation layers.

use serde::Serialize;

use rollcall_core::protocol::RosterEntry;

/// Session state changes observed through [`super::SessionCoordinator::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted { duration_secs: u64 },
    RosterChanged { attendees: Vec<RosterEntry> },
    TimeRemaining { minutes: u64, seconds: u64 },
    WarningFired { minutes_left: u64 },
    SessionEnded { manual: bool },
}
