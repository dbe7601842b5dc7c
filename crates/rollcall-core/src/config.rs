//! Configuration resolution for Rollcall.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults (driven by the selected session profile)
//! 2. Global config (~/.config/rollcall/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

/// Complete Rollcall configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
}

/// Deployment profile that picks session defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionProfile {
    /// Small tutorial group: 3 students, 6 minute session.
    #[default]
    Small,
    /// Full classroom: 30 students, 30 minute session.
    Classroom,
}

impl SessionProfile {
    pub const fn capacity(self) -> usize {
        match self {
            Self::Small => 3,
            Self::Classroom => 30,
        }
    }

    pub const fn session_duration(self) -> Duration {
        match self {
            Self::Small => Duration::from_secs(6 * 60),
            Self::Classroom => Duration::from_secs(30 * 60),
        }
    }

    pub const fn warning_lead(self) -> Duration {
        Duration::from_secs(5 * 60)
    }
}

impl FromStr for SessionProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "classroom" => Ok(Self::Classroom),
            other => Err(Error::Config(format!("Unknown session profile: {other}"))),
        }
    }
}

/// How broadcast frames reach attendees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Over the attendee's own check-in connection.
    #[default]
    Link,
    /// By dialing the attendee's advertised contact port for every frame.
    Dial,
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "link" => Ok(Self::Link),
            "dial" => Ok(Self::Dial),
            other => Err(Error::Config(format!("Unknown delivery mode: {other}"))),
        }
    }
}

/// Tutor server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
    pub profile: SessionProfile,
    /// Overrides the profile's capacity.
    pub capacity: Option<usize>,
    /// Overrides the profile's session length.
    pub session_duration_secs: Option<u64>,
    /// Overrides the profile's warning lead time.
    pub warning_lead_secs: Option<u64>,
    pub tick_interval_ms: u64,
    /// Upper bound for delivering one frame to one attendee.
    pub delivery_timeout_ms: u64,
    pub max_frame_bytes: usize,
    pub delivery: DeliveryMode,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            profile: SessionProfile::default(),
            capacity: None,
            session_duration_secs: None,
            warning_lead_secs: None,
            tick_interval_ms: 1000,
            delivery_timeout_ms: 2000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            delivery: DeliveryMode::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerSettings {
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or_else(|| self.profile.capacity())
    }

    pub fn session_duration(&self) -> Duration {
        self.session_duration_secs
            .map_or_else(|| self.profile.session_duration(), Duration::from_secs)
    }

    pub fn warning_lead(&self) -> Duration {
        self.warning_lead_secs
            .map_or_else(|| self.profile.warning_lead(), Duration::from_secs)
    }

    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity() == 0 {
            return Err(Error::Config("capacity must be at least 1".into()));
        }
        if self.session_duration().is_zero() {
            return Err(Error::Config("session duration must be positive".into()));
        }
        if self.warning_lead() >= self.session_duration() {
            return Err(Error::Config(format!(
                "warning lead ({}s) must be shorter than the session ({}s)",
                self.warning_lead().as_secs(),
                self.session_duration().as_secs()
            )));
        }
        if self.tick_interval_ms == 0 || self.delivery_timeout_ms == 0 {
            return Err(Error::Config(
                "tick interval and delivery timeout must be positive".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(Error::Config("max frame size must be positive".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        debug!(path = %global_path.display(), "Loading global config");
        config = load_config_file(&global_path)?;
    }

    if let Some(path) = explicit_path {
        debug!(path = %path.display(), "Loading config file");
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rollcall").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let server = &mut config.server;
    if let Some(val) = lookup("ROLLCALL_LISTEN_ADDR") {
        server.listen_addr = val
            .parse()
            .map_err(|e| Error::Config(format!("ROLLCALL_LISTEN_ADDR: {e}")))?;
    }
    if let Some(val) = lookup("ROLLCALL_PROFILE") {
        server.profile = val.parse()?;
    }
    if let Some(val) = lookup("ROLLCALL_CAPACITY")
        && let Ok(n) = val.parse()
    {
        server.capacity = Some(n);
    }
    if let Some(val) = lookup("ROLLCALL_SESSION_SECS")
        && let Ok(n) = val.parse()
    {
        server.session_duration_secs = Some(n);
    }
    if let Some(val) = lookup("ROLLCALL_WARNING_SECS")
        && let Ok(n) = val.parse()
    {
        server.warning_lead_secs = Some(n);
    }
    if let Some(val) = lookup("ROLLCALL_DELIVERY") {
        server.delivery = val.parse()?;
    }
    if let Some(val) = lookup("ROLLCALL_LOG_LEVEL") {
        server.log_level = val;
    }
    Ok(())
}
