//! Server configuration.

use std::time::Duration;

use rollcall_core::protocol::DEFAULT_MAX_FRAME_BYTES;
use rollcall_core::{DeliveryMode, ServerSettings};

use crate::session::{MIN_TICK_INTERVAL, TimerConfig};

/// Runtime configuration of the session coordinator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum simultaneous attendees.
    pub capacity: usize,

    /// Session timer settings.
    pub timer: TimerConfig,

    /// Upper bound for delivering one frame to one attendee.
    pub delivery_timeout: Duration,

    /// Longest accepted inbound frame line.
    pub max_frame_bytes: usize,

    /// How broadcasts reach attendees.
    pub delivery: DeliveryMode,

    /// Frames buffered per connection before senders wait.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            timer: TimerConfig::default(),
            delivery_timeout: Duration::from_secs(2),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            delivery: DeliveryMode::Link,
            outbox_capacity: 64,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            capacity: settings.capacity(),
            timer: TimerConfig {
                duration: settings.session_duration(),
                warning_lead: settings.warning_lead(),
                tick_interval: settings.tick_interval(),
            },
            delivery_timeout: settings.delivery_timeout(),
            max_frame_bytes: settings.max_frame_bytes,
            delivery: settings.delivery,
            ..Default::default()
        }
    }
}

impl ServerConfig {
    /// Set capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set session length and warning lead.
    #[must_use]
    pub const fn with_session(mut self, duration: Duration, warning_lead: Duration) -> Self {
        self.timer.duration = duration;
        self.timer.warning_lead = warning_lead;
        self
    }

    /// Set the timer tick interval. Zero is raised to [`MIN_TICK_INTERVAL`].
    #[must_use]
    pub const fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.timer.tick_interval = if tick_interval.is_zero() {
            MIN_TICK_INTERVAL
        } else {
            tick_interval
        };
        self
    }

    /// Set per-recipient delivery timeout.
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Set delivery mode.
    #[must_use]
    pub const fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

#[cfg(test)]
mod tests {
    use rollcall_core::SessionProfile;

    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.delivery, DeliveryMode::Link);
    }

    #[test]
    fn built_from_classroom_settings() {
        let settings = ServerSettings {
            profile: SessionProfile::Classroom,
            delivery_timeout_ms: 750,
            ..Default::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.capacity, 30);
        assert_eq!(config.timer.duration, Duration::from_secs(30 * 60));
        assert_eq!(config.timer.warning_lead, Duration::from_secs(5 * 60));
        assert_eq!(config.delivery_timeout, Duration::from_millis(750));
    }

    #[test]
    fn builder_overrides() {
        let config = ServerConfig::default()
            .with_capacity(5)
            .with_session(Duration::from_secs(10), Duration::from_secs(5))
            .with_delivery(DeliveryMode::Dial);
        assert_eq!(config.capacity, 5);
        assert_eq!(config.timer.duration, Duration::from_secs(10));
        assert_eq!(config.delivery, DeliveryMode::Dial);
    }

    #[test]
    fn zero_tick_interval_is_clamped() {
        let config = ServerConfig::default().with_tick_interval(Duration::ZERO);
        assert_eq!(config.timer.tick_interval, MIN_TICK_INTERVAL);
    }
}
