//! Authoritative record of who is attending the session.
//!
//! Owns the identity-uniqueness and capacity rules. All operations are
//! internally synchronised; broadcasts work from [`SessionRegistry::snapshot`]
//! copies so no lock is held during network I/O.

mod store;
mod types;

pub use store::SessionRegistry;
pub use types::{Attendee, Contact, Outbox, Registration, RegistryError};
