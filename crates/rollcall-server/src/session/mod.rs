//! Session lifecycle timing.
//!
//! One timer per session, ticking once per interval on its own task.

mod timer;
mod types;

pub use timer::SessionTimer;
pub use types::{MIN_TICK_INTERVAL, TimerConfig, TimerEvent, TimerPhase, minutes_seconds};
