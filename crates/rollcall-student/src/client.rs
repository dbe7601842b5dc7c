//! Connection to the tutor server.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rollcall_core::protocol::{
    ClientFrame, DEFAULT_MAX_FRAME_BYTES, FrameReader, ServerFrame, parse_line, write_frame,
};

use crate::error::{ClientError, Result};

/// Frames buffered between the reader task and the caller.
const EVENT_BUFFER: usize = 64;

/// A student's session connection.
pub struct SessionClient {
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// Frames that arrived before the check-in reply.
    pending: VecDeque<ServerFrame>,
    id: Option<String>,
}

impl SessionClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        debug!(addr = %addr, "Connected to server");
        Ok(Self {
            reader: FrameReader::new(BufReader::new(read_half), DEFAULT_MAX_FRAME_BYTES),
            writer,
            pending: VecDeque::new(),
            id: None,
        })
    }

    /// Check in and wait for the server's verdict.
    ///
    /// Returns the server timestamp from the acknowledgement.
    pub async fn check_in(&mut self, id: &str, name: &str, port: u16) -> Result<String> {
        write_frame(
            &mut self.writer,
            &ClientFrame::CheckIn {
                id: id.to_string(),
                name: name.to_string(),
                port,
            },
        )
        .await?;

        loop {
            match self.read_frame().await? {
                Some(ServerFrame::CheckInAck { server_timestamp }) => {
                    info!(id, server_timestamp = %server_timestamp, "Checked in");
                    self.id = Some(id.to_string());
                    return Ok(server_timestamp);
                }
                Some(ServerFrame::CheckInReject { reason }) => {
                    return Err(ClientError::Rejected(reason));
                }
                Some(other) => self.pending.push_back(other),
                None => return Err(ClientError::Closed),
            }
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Next frame from the server. `Ok(None)` once the server hung up.
    pub async fn next_event(&mut self) -> Result<Option<ServerFrame>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        self.read_frame().await
    }

    /// Leave the session and close the connection.
    pub async fn exit(self) -> Result<()> {
        SessionSender {
            writer: self.writer,
            id: self.id,
        }
        .exit()
        .await
    }

    /// Move frame reading onto its own task.
    ///
    /// Reading is not cancel-safe, so callers that multiplex server events
    /// with other input should use this rather than racing
    /// [`Self::next_event`] in `select!`.
    pub fn into_split(self) -> (SessionSender, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let Self {
            reader,
            writer,
            pending,
            id,
        } = self;
        tokio::spawn(forward_events(reader, pending, tx));
        (SessionSender { writer, id }, rx)
    }

    async fn read_frame(&mut self) -> Result<Option<ServerFrame>> {
        read_server_frame(&mut self.reader).await
    }
}

/// Write side of a split [`SessionClient`].
pub struct SessionSender {
    writer: OwnedWriteHalf,
    id: Option<String>,
}

impl SessionSender {
    /// Leave the session and close the connection.
    pub async fn exit(mut self) -> Result<()> {
        let id = self.id.take().ok_or(ClientError::NotCheckedIn)?;
        write_frame(&mut self.writer, &ClientFrame::Exit { id }).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Skip malformed lines; stop at EOF or on a read error.
async fn read_server_frame(
    reader: &mut FrameReader<BufReader<OwnedReadHalf>>,
) -> Result<Option<ServerFrame>> {
    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(e) if e.is_frame_local() => {
                warn!(error = %e, "Discarding frame from server");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        match parse_line::<ServerFrame>(&line) {
            Ok(frame) => return Ok(Some(frame)),
            Err(e) => warn!(error = %e, "Unrecognised frame from server"),
        }
    }
}

async fn forward_events(
    mut reader: FrameReader<BufReader<OwnedReadHalf>>,
    pending: VecDeque<ServerFrame>,
    tx: mpsc::Sender<ServerFrame>,
) {
    for frame in pending {
        if tx.send(frame).await.is_err() {
            return;
        }
    }
    loop {
        match read_server_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("Server closed the connection");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Lost connection to server");
                return;
            }
        }
    }
}
