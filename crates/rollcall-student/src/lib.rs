//! Rollcall student client library
//!
//! - Check-in and server event stream ([`client`])
//! - Roster tracking and peer lookup ([`roster`])
//! - Direct peer messaging on the contact port ([`peer`])
//! - Interactive command parsing ([`input`])

pub mod client;
pub mod error;
pub mod input;
pub mod peer;
pub mod roster;

pub use client::{SessionClient, SessionSender};
pub use error::{ClientError, Result};
pub use roster::Roster;
