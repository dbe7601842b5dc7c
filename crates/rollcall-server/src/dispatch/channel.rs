//! Delivery channels for reaching one attendee.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use rollcall_core::protocol::{ServerFrame, write_frame};

use crate::registry::Contact;

/// Why a frame could not be delivered to an attendee.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Contact has no open link")]
    NoLink,

    #[error("Connection closed")]
    Closed,

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl From<rollcall_core::Error> for DeliveryError {
    fn from(err: rollcall_core::Error) -> Self {
        match err {
            rollcall_core::Error::Io(e) => Self::Io(e),
            other => Self::Encode(other.to_string()),
        }
    }
}

/// Capability to push a frame to one attendee.
#[async_trait]
pub trait ContactChannel: Send + Sync {
    async fn send(&self, contact: &Contact, frame: &ServerFrame) -> Result<(), DeliveryError>;
}

/// Delivers over the attendee's own check-in connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkChannel;

#[async_trait]
impl ContactChannel for LinkChannel {
    async fn send(&self, contact: &Contact, frame: &ServerFrame) -> Result<(), DeliveryError> {
        let link = contact.link.as_ref().ok_or(DeliveryError::NoLink)?;
        link.send(frame.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Dials the attendee's advertised port and writes one frame per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialChannel;

#[async_trait]
impl ContactChannel for DialChannel {
    async fn send(&self, contact: &Contact, frame: &ServerFrame) -> Result<(), DeliveryError> {
        let mut stream = TcpStream::connect(contact.peer_addr()).await?;
        write_frame(&mut stream, frame).await?;
        stream.shutdown().await?;
        Ok(())
    }
}
