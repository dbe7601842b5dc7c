//! Rollcall server library
//!
//! Session coordination for a tutor-run class:
//! - Attendee registry with identity and capacity rules
//! - Broadcast fan-out tolerant of unreachable students
//! - Session countdown with a warning threshold
//! - Per-connection NDJSON control loop

pub mod audit;
pub mod console;
pub mod dispatch;
pub mod registry;
pub mod server;
pub mod session;
