//! `Rollcall` Core Library
//!
//! Shared functionality for `Rollcall` components:
//! - Session protocol frames and NDJSON line framing
//! - Configuration resolution and hierarchy
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::{Config, DeliveryMode, ServerSettings, SessionProfile};
pub use error::{Error, Result};
