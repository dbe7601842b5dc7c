//! Attendance audit hook.
//!
//! Every registry mutation and timer transition is reported to an
//! [`AuditSink`]. Sinks observe only: they cannot veto or delay a mutation.

use std::time::Duration;

use tracing::info;

/// Why an attendee left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Student sent an exit frame.
    Exit,
    /// Connection hung up or was reset.
    Disconnect,
    /// A broadcast could not reach the student.
    Unreachable,
}

impl RemovalCause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Disconnect => "disconnect",
            Self::Unreachable => "unreachable",
        }
    }
}

/// One audited event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    CheckedIn { id: String, name: String, port: u16 },
    Removed { id: String, name: String, cause: RemovalCause },
    Cleared { count: usize },
    SessionStarted { duration: Duration },
    WarningSent { remaining: Duration },
    SessionEnded { manual: bool },
}

/// Receives audit entries. Implementations must return promptly.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Writes audit entries to the `rollcall::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        match entry {
            AuditEntry::CheckedIn { id, name, port } => {
                info!(target: "rollcall::audit", id = %id, name = %name, port, "Student checked in");
            }
            AuditEntry::Removed { id, name, cause } => {
                info!(target: "rollcall::audit", id = %id, name = %name, cause = cause.as_str(), "Student left the session");
            }
            AuditEntry::Cleared { count } => {
                info!(target: "rollcall::audit", count, "Attendance cleared");
            }
            AuditEntry::SessionStarted { duration } => {
                info!(target: "rollcall::audit", duration_secs = duration.as_secs(), "Session started");
            }
            AuditEntry::WarningSent { remaining } => {
                info!(target: "rollcall::audit", remaining_secs = remaining.as_secs(), "Warning sent");
            }
            AuditEntry::SessionEnded { manual } => {
                info!(target: "rollcall::audit", manual, "Session ended");
            }
        }
    }
}
