//! Broadcast fan-out with per-recipient failure tolerance.
//!
//! A failed delivery never aborts the broadcast; the unreachable attendee is
//! treated as disconnected and evicted from the registry.

mod channel;
mod dispatcher;

pub use channel::{ContactChannel, DeliveryError, DialChannel, LinkChannel};
pub use dispatcher::{BroadcastDispatcher, BroadcastReport};
