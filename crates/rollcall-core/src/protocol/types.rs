//! Frame types for the Rollcall session protocol.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Frames a student sends to the tutor server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join the session. `port` is where the student listens for peer messages.
    CheckIn { id: String, name: String, port: u16 },
    /// Leave the session.
    Exit { id: String },
}

/// Frames the tutor server sends to students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    CheckInAck { server_timestamp: String },
    CheckInReject { reason: RejectReason },
    RosterUpdate { attendees: Vec<RosterEntry> },
    TimeRemaining { minutes: u64, seconds: u64 },
    WarningFired { minutes_left: u64 },
    SessionEnded,
}

impl ServerFrame {
    /// Short name used in log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CheckInAck { .. } => "check_in_ack",
            Self::CheckInReject { .. } => "check_in_reject",
            Self::RosterUpdate { .. } => "roster_update",
            Self::TimeRemaining { .. } => "time_remaining",
            Self::WarningFired { .. } => "warning_fired",
            Self::SessionEnded => "session_ended",
        }
    }
}

/// Why a check-in was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DuplicateIdentity,
    CapacityExceeded,
    SessionClosed,
}

impl RejectReason {
    /// Human-readable explanation shown to the student.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::DuplicateIdentity => "Student ID must be unique.",
            Self::CapacityExceeded => "Maximum number of students reached. Cannot check in.",
            Self::SessionClosed => "The session has ended. Cannot check in.",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// One attendee as published in a roster update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Address the attendee's peer listener is reachable on.
    pub host: IpAddr,
    pub port: u16,
    pub id: String,
    pub name: String,
}

/// Frames students exchange directly, bypassing the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerFrame {
    PeerMessage {
        #[serde(default)]
        from: Option<String>,
        text: String,
    },
}
