//! Session server: connection handling and the coordinator that ties the
//! registry, dispatcher and timer together.

mod config;
mod coordinator;
mod events;
mod handler;

pub use config::ServerConfig;
pub use coordinator::SessionCoordinator;
pub use events::SessionEvent;
