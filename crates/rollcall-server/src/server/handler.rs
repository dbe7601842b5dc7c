//! Per-connection control loop.
//!
//! Each connection gets a reader (this task) and a writer task draining the
//! connection's outbox. Everything sent to the student, including broadcasts
//! from other tasks, goes through the outbox, so frames on one connection
//! are never interleaved.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rollcall_core::protocol::{ClientFrame, FrameReader, ServerFrame, parse_client_frame, write_frame};

use super::coordinator::SessionCoordinator;
use crate::registry::{Contact, Outbox};

/// How long a closing connection may take to flush its outbox.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether the read loop keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

struct ConnectionHandler {
    coordinator: SessionCoordinator,
    peer: SocketAddr,
    connection_id: Uuid,
    outbox: Outbox,
    /// Student id checked in over this connection.
    bound: Option<String>,
}

/// Serve one student connection until it hangs up or is refused.
pub(crate) async fn run<S>(coordinator: SessionCoordinator, stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let connection_id = Uuid::new_v4();
    let (read_half, write_half) = tokio::io::split(stream);
    let (outbox, inbox) = mpsc::channel(coordinator.config().outbox_capacity);
    let mut writer = tokio::spawn(write_loop(write_half, inbox, peer));
    let mut reader = FrameReader::new(
        BufReader::new(read_half),
        coordinator.config().max_frame_bytes,
    );

    debug!(peer = %peer, connection = %connection_id, "Connection opened");
    let mut handler = ConnectionHandler {
        coordinator,
        peer,
        connection_id,
        outbox,
        bound: None,
    };
    handler.read_loop(&mut reader).await;
    handler.release().await;
    drop(handler);

    // The writer ends once every outbox handle is gone. A registry entry
    // being delivered to right now may still hold one for a moment.
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!(peer = %peer, "Writer did not drain in time, aborting");
        writer.abort();
    }
    debug!(peer = %peer, connection = %connection_id, "Connection closed");
}

async fn write_loop<W>(mut writer: W, mut inbox: mpsc::Receiver<ServerFrame>, peer: SocketAddr)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = inbox.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(peer = %peer, frame = frame.kind(), error = %e, "Write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

impl ConnectionHandler {
    async fn read_loop<R>(&mut self, reader: &mut FrameReader<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(peer = %self.peer, "Peer hung up");
                    return;
                }
                Err(e) if e.is_frame_local() => {
                    warn!(peer = %self.peer, error = %e, "Discarding frame");
                    continue;
                }
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "Read failed");
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let frame = match parse_client_frame(&line) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Malformed frame");
                    continue;
                }
            };
            if self.handle(frame).await == Flow::Close {
                return;
            }
        }
    }

    async fn handle(&mut self, frame: ClientFrame) -> Flow {
        match frame {
            ClientFrame::CheckIn { id, name, port } => self.check_in(id, name, port).await,
            ClientFrame::Exit { id } => {
                if self.bound.as_deref() == Some(id.as_str()) {
                    self.bound = None;
                }
                info!(peer = %self.peer, id = %id, "Exit requested");
                self.coordinator.exit(&id).await;
                Flow::Continue
            }
        }
    }

    async fn check_in(&mut self, id: String, name: String, port: u16) -> Flow {
        if let Some(bound) = self.bound.take() {
            if self
                .coordinator
                .registry()
                .holds(&bound, self.connection_id)
                .await
            {
                warn!(peer = %self.peer, bound = %bound, id = %id, "Repeated check-in ignored");
                self.bound = Some(bound);
                return Flow::Continue;
            }
            debug!(peer = %self.peer, bound = %bound, "Previous check-in no longer registered");
        }

        let contact = Contact::new(self.peer.ip(), port).with_link(self.outbox.clone());
        match self
            .coordinator
            .registry()
            .register(&id, &name, contact, self.connection_id)
            .await
        {
            Ok(registration) => {
                self.send(ServerFrame::CheckInAck {
                    server_timestamp: server_timestamp(),
                })
                .await;
                self.bound = Some(id);
                self.coordinator.admitted(registration).await;
                Flow::Continue
            }
            Err(e) => {
                info!(peer = %self.peer, id = %id, reason = %e, "Check-in refused");
                self.send(ServerFrame::CheckInReject {
                    reason: e.reject_reason(),
                })
                .await;
                Flow::Close
            }
        }
    }

    async fn send(&self, frame: ServerFrame) {
        if self.outbox.send(frame).await.is_err() {
            debug!(peer = %self.peer, "Writer gone, frame dropped");
        }
    }

    /// Implicit exit for a connection that ended while still checked in.
    async fn release(&mut self) {
        if let Some(id) = self.bound.take() {
            info!(peer = %self.peer, id = %id, "Checked-in student disconnected");
            self.coordinator.disconnected(&id, self.connection_id).await;
        }
    }
}

fn server_timestamp() -> String {
    chrono::Local::now().format("%d-%m-%Y %H:%M:%S").to_string()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, DuplexStream, Lines};

    use rollcall_core::protocol::{RejectReason, parse_line};

    use super::*;
    use crate::audit::TracingAuditSink;
    use crate::server::ServerConfig;

    struct TestClient {
        lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl TestClient {
        fn connect(coordinator: &SessionCoordinator, port: u16) -> Self {
            let (client, server) = tokio::io::duplex(16 * 1024);
            coordinator.accept_connection(server, SocketAddr::from(([127, 0, 0, 1], port)));
            let (read_half, writer) = tokio::io::split(client);
            Self {
                lines: BufReader::new(read_half).lines(),
                writer,
            }
        }

        async fn send_raw(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn check_in(&mut self, id: &str, port: u16) {
            self.send_raw(&format!(
                r#"{{"type":"check_in","id":"{id}","name":"Student {id}","port":{port}}}"#
            ))
            .await;
        }

        async fn recv(&mut self) -> Option<ServerFrame> {
            let line = self.lines.next_line().await.unwrap()?;
            Some(parse_line(&line).unwrap())
        }

        /// Check-in reply, skipping countdown frames that may overtake it.
        async fn reply(&mut self) -> ServerFrame {
            loop {
                match self.recv().await.unwrap() {
                    ServerFrame::TimeRemaining { .. } => {}
                    other => return other,
                }
            }
        }

        async fn recv_roster(&mut self) -> Vec<String> {
            loop {
                match self.recv().await.unwrap() {
                    ServerFrame::RosterUpdate { attendees } => {
                        return attendees.into_iter().map(|a| a.id).collect();
                    }
                    ServerFrame::TimeRemaining { .. } => {}
                    other => panic!("expected roster update, got {other:?}"),
                }
            }
        }
    }

    fn coordinator(capacity: usize) -> SessionCoordinator {
        SessionCoordinator::new(
            ServerConfig::default().with_capacity(capacity),
            Arc::new(TracingAuditSink),
        )
    }

    #[tokio::test]
    async fn check_in_is_acknowledged_then_roster_follows() {
        let coordinator = coordinator(3);
        let mut client = TestClient::connect(&coordinator, 40001);
        client.check_in("10001", 6001).await;

        match client.reply().await {
            ServerFrame::CheckInAck { server_timestamp } => {
                assert_eq!(server_timestamp.len(), "17-10-2026 10:00:00".len());
            }
            other => panic!("expected ack, got {other:?}"),
        }
        assert_eq!(client.recv_roster().await, vec!["10001"]);

        let roster = coordinator.current_roster().await;
        assert_eq!(roster[0].contact.port, 6001);
        assert_eq!(roster[0].display_name, "Student 10001");
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let coordinator = coordinator(3);
        let mut client = TestClient::connect(&coordinator, 40002);
        client.send_raw("this is not json").await;
        client.send_raw(r#"{"type":"teleport"}"#).await;
        client.send_raw(r#"{"type":"check_in","id":"x"}"#).await;
        client.send_raw("").await;
        client.check_in("10002", 6002).await;

        assert!(matches!(client.reply().await, ServerFrame::CheckInAck { .. }));
        assert_eq!(client.recv_roster().await, vec!["10002"]);
    }

    #[tokio::test]
    async fn oversized_frame_is_skipped() {
        let coordinator = coordinator(3);
        let mut client = TestClient::connect(&coordinator, 40003);
        client.send_raw(&"x".repeat(10 * 1024)).await;
        client.check_in("10003", 6003).await;

        assert!(matches!(client.reply().await, ServerFrame::CheckInAck { .. }));
    }

    #[tokio::test]
    async fn duplicate_is_rejected_and_connection_closed() {
        let coordinator = coordinator(3);
        let mut first = TestClient::connect(&coordinator, 40004);
        first.check_in("dup", 6004).await;
        first.reply().await;

        let mut second = TestClient::connect(&coordinator, 40005);
        second.check_in("dup", 6005).await;
        assert_eq!(
            second.reply().await,
            ServerFrame::CheckInReject {
                reason: RejectReason::DuplicateIdentity
            }
        );
        assert_eq!(second.recv().await, None);
        assert_eq!(coordinator.current_roster().await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_check_in_on_same_connection_is_ignored() {
        let coordinator = coordinator(3);
        let mut watcher = TestClient::connect(&coordinator, 40012);
        watcher.check_in("w", 6013).await;
        watcher.reply().await;
        watcher.recv_roster().await;

        let mut client = TestClient::connect(&coordinator, 40006);
        client.check_in("a", 6006).await;
        client.reply().await;
        assert_eq!(watcher.recv_roster().await, vec!["w", "a"]);

        client.check_in("b", 6007).await;
        client.send_raw(r#"{"type":"exit","id":"a"}"#).await;
        assert_eq!(watcher.recv_roster().await, vec!["w"]);
        assert!(!coordinator.registry().contains("b").await);
    }

    #[tokio::test]
    async fn hangup_removes_bound_student() {
        let coordinator = coordinator(3);
        let mut stays = TestClient::connect(&coordinator, 40007);
        stays.check_in("stays", 6008).await;
        stays.reply().await;
        stays.recv_roster().await;

        let mut leaves = TestClient::connect(&coordinator, 40008);
        leaves.check_in("leaves", 6009).await;
        leaves.reply().await;
        assert_eq!(stays.recv_roster().await, vec!["stays", "leaves"]);

        drop(leaves);
        assert_eq!(stays.recv_roster().await, vec!["stays"]);
    }

    #[tokio::test]
    async fn exit_then_hangup_removes_once() {
        let coordinator = coordinator(3);
        let mut watcher = TestClient::connect(&coordinator, 40009);
        watcher.check_in("watcher", 6010).await;
        watcher.reply().await;
        watcher.recv_roster().await;

        let mut client = TestClient::connect(&coordinator, 40010);
        client.check_in("a", 6011).await;
        client.reply().await;
        assert_eq!(watcher.recv_roster().await, vec!["watcher", "a"]);

        client.send_raw(r#"{"type":"exit","id":"a"}"#).await;
        assert_eq!(watcher.recv_roster().await, vec!["watcher"]);
        drop(client);

        // Another check-in proves no second roster went out for the hangup.
        let mut late = TestClient::connect(&coordinator, 40011);
        late.check_in("late", 6012).await;
        late.reply().await;
        assert_eq!(watcher.recv_roster().await, vec!["watcher", "late"]);
    }

    #[tokio::test]
    async fn open_connection_can_check_in_again_after_reset() {
        let coordinator = coordinator(3);
        let mut client = TestClient::connect(&coordinator, 40013);
        client.check_in("10001", 6014).await;
        client.reply().await;
        client.recv_roster().await;

        assert!(coordinator.end_session().await);
        while client.recv().await != Some(ServerFrame::SessionEnded) {}
        coordinator.reset().await;

        client.check_in("10001", 6014).await;
        assert!(matches!(client.reply().await, ServerFrame::CheckInAck { .. }));
        assert_eq!(client.recv_roster().await, vec!["10001"]);
    }
}
