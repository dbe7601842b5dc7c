//! Direct student-to-student messaging.
//!
//! Every student listens on a contact port. Peers dial it, write one
//! `peer_message` line and hang up. When the server runs in dial delivery
//! mode its broadcasts arrive on the same port.

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rollcall_core::protocol::{
    DEFAULT_MAX_FRAME_BYTES, FrameReader, PeerFrame, ServerFrame, parse_line, write_frame,
};

use crate::error::Result;

/// Base of the conventional contact port range.
pub const PEER_PORT_BASE: u16 = 6000;

/// Contact port for a numeric student id: 6000 plus its last two digits.
pub fn default_peer_port(id: &str) -> Option<u16> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let tail = &id[id.len().saturating_sub(2)..];
    tail.parse::<u16>().ok().map(|n| PEER_PORT_BASE + n)
}

/// Something that arrived on the contact port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message { from: Option<String>, text: String },
    Server(ServerFrame),
}

/// Accepts peer connections on the student's contact port.
pub struct PeerListener {
    listener: TcpListener,
}

impl PeerListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        debug!(addr = %listener.local_addr()?, "Peer listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, forwarding everything received to `tx`.
    ///
    /// Returns once `tx` is closed.
    pub async fn run(self, tx: mpsc::Sender<Inbound>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(read_peer(stream, peer, tx.clone()));
                    }
                    Err(e) => warn!(error = %e, "Peer accept failed"),
                },
                () = tx.closed() => return,
            }
        }
    }
}

async fn read_peer(stream: TcpStream, peer: SocketAddr, tx: mpsc::Sender<Inbound>) {
    let mut reader = FrameReader::new(BufReader::new(stream), DEFAULT_MAX_FRAME_BYTES);
    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) if e.is_frame_local() => {
                warn!(peer = %peer, error = %e, "Discarding peer frame");
                continue;
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Peer read failed");
                return;
            }
        };
        let Some(inbound) = decode_inbound(&line) else {
            warn!(peer = %peer, "Unrecognised frame on contact port");
            continue;
        };
        if tx.send(inbound).await.is_err() {
            return;
        }
    }
}

fn decode_inbound(line: &str) -> Option<Inbound> {
    if let Ok(PeerFrame::PeerMessage { from, text }) = parse_line::<PeerFrame>(line) {
        return Some(Inbound::Message { from, text });
    }
    parse_line::<ServerFrame>(line).ok().map(Inbound::Server)
}

/// Dial `addr`, deliver one message and hang up.
pub async fn send_peer_message(addr: SocketAddr, from: &str, text: &str) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(
        &mut stream,
        &PeerFrame::PeerMessage {
            from: Some(from.to_string()),
            text: text.to_string(),
        },
    )
    .await?;
    stream.shutdown().await?;
    Ok(())
}
