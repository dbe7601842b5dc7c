//! Session timer types.

use std::time::Duration;

/// Lifecycle phase of the session timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPhase {
    Idle,
    Active,
    WarningSent,
    Ended,
}

impl TimerPhase {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Active | Self::WarningSent)
    }
}

/// Events produced by the timer, in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started { duration: Duration },
    TimeRemaining { remaining: Duration },
    Warning { remaining: Duration },
    Ended { manual: bool },
}

/// Shortest tick period the timer will run with.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the session timer.
#[derive(Debug, Clone, Copy)]
pub struct TimerConfig {
    /// Session length measured from activation.
    pub duration: Duration,
    /// Remaining time at which the warning fires.
    pub warning_lead: Duration,
    /// How often remaining time is evaluated and published.
    pub tick_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(6 * 60),
            warning_lead: Duration::from_secs(5 * 60),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Split a duration into whole minutes and seconds.
pub const fn minutes_seconds(remaining: Duration) -> (u64, u64) {
    let secs = remaining.as_secs();
    (secs / 60, secs % 60)
}
