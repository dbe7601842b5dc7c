//! Attendee registry types.

use std::net::{IpAddr, SocketAddr};

use tokio::sync::mpsc;
use uuid::Uuid;

use rollcall_core::protocol::{RejectReason, RosterEntry, ServerFrame};

/// Outbound frame queue of one student connection.
pub type Outbox = mpsc::Sender<ServerFrame>;

/// Where an attendee can be reached.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Remote IP of the student's check-in connection.
    pub host: IpAddr,
    /// Port the student listens on for direct messages.
    pub port: u16,
    /// Open channel back to the student's check-in connection.
    pub link: Option<Outbox>,
}

impl Contact {
    pub const fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            link: None,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: Outbox) -> Self {
        self.link = Some(link);
        self
    }

    pub const fn peer_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// A checked-in student.
#[derive(Debug, Clone)]
pub struct Attendee {
    pub id: String,
    pub display_name: String,
    pub contact: Contact,
    /// Connection that performed the check-in.
    pub connection_id: Uuid,
    /// Check-in order within the session.
    pub joined_seq: u64,
}

impl Attendee {
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            host: self.contact.host,
            port: self.contact.port,
            id: self.id.clone(),
            name: self.display_name.clone(),
        }
    }
}

/// Successful check-in.
#[derive(Debug, Clone)]
pub struct Registration {
    pub attendee: Attendee,
    /// The registry was empty before this check-in.
    pub first: bool,
}

/// Check-in refusals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Student ID already checked in: {id}")]
    DuplicateIdentity { id: String },

    #[error("Session is full (capacity: {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Session has ended")]
    SessionClosed,
}

impl RegistryError {
    pub const fn reject_reason(&self) -> RejectReason {
        match self {
            Self::DuplicateIdentity { .. } => RejectReason::DuplicateIdentity,
            Self::CapacityExceeded { .. } => RejectReason::CapacityExceeded,
            Self::SessionClosed => RejectReason::SessionClosed,
        }
    }
}
