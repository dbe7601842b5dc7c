//! Latest roster as seen by a student.

use std::net::SocketAddr;

use rollcall_core::protocol::RosterEntry;

use crate::error::{ClientError, Result};

/// Who is in the session, according to the last roster update.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a fresh update.
    pub fn update(&mut self, entries: Vec<RosterEntry>) {
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Peer address of `destination`, refusing unknown ids and self-sends.
    pub fn resolve(&self, destination: &str, self_id: &str) -> Result<SocketAddr> {
        if destination == self_id {
            return Err(ClientError::SelfMessage);
        }
        self.get(destination)
            .map(|e| SocketAddr::new(e.host, e.port))
            .ok_or_else(|| ClientError::UnknownPeer {
                id: destination.to_string(),
            })
    }
}
