//! Session coordinator: wires registry, dispatcher, timer and connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rollcall_core::DeliveryMode;
use rollcall_core::protocol::ServerFrame;

use super::config::ServerConfig;
use super::events::SessionEvent;
use super::handler;
use crate::audit::{AuditEntry, AuditSink, RemovalCause};
use crate::dispatch::{BroadcastDispatcher, ContactChannel, DialChannel, LinkChannel};
use crate::registry::{Attendee, Registration, SessionRegistry};
use crate::session::{SessionTimer, TimerEvent, TimerPhase, minutes_seconds};

/// Buffered session events per subscriber.
const EVENT_BUFFER: usize = 256;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything needed to notify attendees and subscribers.
///
/// Shared by the coordinator and the timer event pumps. Holds no timer, so a
/// pump never keeps its own timer alive.
#[derive(Clone)]
struct Notifier {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    events: broadcast::Sender<SessionEvent>,
    audit: Arc<dyn AuditSink>,
    /// Bumped by every reset; events of older sessions are dropped.
    generation: Arc<AtomicU64>,
    /// Serialises end-of-session handling, `end_session` and `reset`.
    lifecycle: Arc<Mutex<()>>,
}

impl Notifier {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Broadcast the roster until a round completes without evictions.
    ///
    /// Every repeat follows at least one eviction, so this terminates once the
    /// remaining attendees are all reachable.
    async fn broadcast_roster(&self) {
        loop {
            let (roster, report) = self.dispatcher.broadcast_roster().await;
            if report.evicted.is_empty() {
                self.publish(SessionEvent::RosterChanged { attendees: roster });
                return;
            }
            debug!(evicted = ?report.evicted, "Roster changed during broadcast, resending");
        }
    }

    /// Broadcast a frame and resend the roster if anyone was evicted.
    async fn broadcast(&self, frame: ServerFrame) {
        let report = self.dispatcher.broadcast(frame).await;
        if !report.evicted.is_empty() {
            self.broadcast_roster().await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn on_timer_event(&self, event: TimerEvent, generation: u64) {
        match event {
            TimerEvent::Started { duration } => {
                self.audit.record(AuditEntry::SessionStarted { duration });
                self.publish(SessionEvent::SessionStarted {
                    duration_secs: duration.as_secs(),
                });
            }
            TimerEvent::TimeRemaining { remaining } => {
                let (minutes, seconds) = minutes_seconds(remaining);
                self.publish(SessionEvent::TimeRemaining { minutes, seconds });
                self.broadcast(ServerFrame::TimeRemaining { minutes, seconds })
                    .await;
            }
            TimerEvent::Warning { remaining } => {
                let minutes_left = remaining.as_secs().div_ceil(60);
                self.audit.record(AuditEntry::WarningSent { remaining });
                self.broadcast(ServerFrame::WarningFired { minutes_left })
                    .await;
                self.publish(SessionEvent::WarningFired { minutes_left });
            }
            TimerEvent::Ended { manual } => {
                let _lifecycle = self.lifecycle.lock().await;
                if !self.is_current(generation) {
                    debug!(generation, "Session was reset before it could close");
                    return;
                }
                self.registry.close().await;
                self.audit.record(AuditEntry::SessionEnded { manual });
                self.dispatcher.broadcast(ServerFrame::SessionEnded).await;
                let cleared = self.registry.clear().await;
                info!(attendees = cleared.len(), manual, "Session closed");

                self.publish(SessionEvent::SessionEnded { manual });
                self.publish(SessionEvent::RosterChanged {
                    attendees: Vec::new(),
                });
            }
        }
    }

    /// Forward timer events until the timer goes away or a reset supersedes it.
    async fn pump(self, mut timer_events: mpsc::UnboundedReceiver<TimerEvent>, mine: u64) {
        while let Some(event) = timer_events.recv().await {
            if !self.is_current(mine) {
                debug!(generation = mine, "Dropping events of a superseded session");
                break;
            }
            self.on_timer_event(event, mine).await;
        }
        debug!(generation = mine, "Timer event pump exiting");
    }
}

/// Entry point of the session server.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    config: Arc<ServerConfig>,
    notifier: Notifier,
    timer: Arc<RwLock<Arc<SessionTimer>>>,
}

impl SessionCoordinator {
    /// Create a coordinator delivering broadcasts as `config.delivery` says.
    ///
    /// Must be called inside a Tokio runtime: the timer event pump is spawned
    /// immediately.
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditSink>) -> Self {
        let channel: Arc<dyn ContactChannel> = match config.delivery {
            DeliveryMode::Link => Arc::new(LinkChannel),
            DeliveryMode::Dial => Arc::new(DialChannel),
        };
        Self::with_channel(config, channel, audit)
    }

    /// Create a coordinator with a custom delivery channel.
    pub fn with_channel(
        config: ServerConfig,
        channel: Arc<dyn ContactChannel>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let registry = SessionRegistry::new(config.capacity, Arc::clone(&audit));
        let dispatcher =
            BroadcastDispatcher::new(registry.clone(), channel, config.delivery_timeout);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let notifier = Notifier {
            registry,
            dispatcher,
            events,
            audit,
            generation: Arc::new(AtomicU64::new(0)),
            lifecycle: Arc::new(Mutex::new(())),
        };

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let timer = Arc::new(SessionTimer::new(config.timer, timer_tx));
        tokio::spawn(notifier.clone().pump(timer_rx, 0));

        info!(
            capacity = config.capacity,
            duration_secs = config.timer.duration.as_secs(),
            warning_lead_secs = config.timer.warning_lead.as_secs(),
            delivery = ?config.delivery,
            "Session coordinator ready"
        );

        Self {
            config: Arc::new(config),
            notifier,
            timer: Arc::new(RwLock::new(timer)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub(crate) const fn registry(&self) -> &SessionRegistry {
        &self.notifier.registry
    }

    /// Handle one client connection on its own task.
    pub fn accept_connection<S>(&self, stream: S, peer: SocketAddr) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tokio::spawn(handler::run(self.clone(), stream, peer))
    }

    /// Accept connections until `shutdown` flips to `true`.
    ///
    /// Accept failures are logged and never end the loop. On shutdown the
    /// session timer is cancelled.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Accepting student connections");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        debug!(peer = %peer, "Connection accepted");
                        self.accept_connection(stream, peer);
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.current_timer().await.cancel().await;
        info!("Accept loop stopped");
    }

    async fn current_timer(&self) -> Arc<SessionTimer> {
        Arc::clone(&*self.timer.read().await)
    }

    /// Start the countdown without waiting for the first check-in.
    pub async fn start_session(&self) -> bool {
        self.current_timer().await.activate().await
    }

    /// End the session now and refuse further check-ins.
    ///
    /// Returns `false` if the session had already ended.
    pub async fn end_session(&self) -> bool {
        let _lifecycle = self.notifier.lifecycle.lock().await;
        let stopped = self.current_timer().await.stop().await;
        if stopped {
            self.notifier.registry.close().await;
        }
        stopped
    }

    /// Drop everyone and prepare a fresh, idle session.
    ///
    /// Waits for an end-of-session broadcast already in progress, so the old
    /// session can no longer touch the new one.
    pub async fn reset(&self) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let fresh = Arc::new(SessionTimer::new(self.config.timer, timer_tx));

        let lifecycle = self.notifier.lifecycle.lock().await;
        let mut slot = self.timer.write().await;
        let generation = self.notifier.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = std::mem::replace(&mut *slot, fresh);
        drop(slot);

        previous.cancel().await;
        tokio::spawn(self.notifier.clone().pump(timer_rx, generation));

        let cleared = self.notifier.registry.clear().await;
        self.notifier.registry.reopen().await;
        drop(lifecycle);
        info!(generation, cleared = cleared.len(), "Session reset");
        self.notifier.publish(SessionEvent::RosterChanged {
            attendees: Vec::new(),
        });
    }

    /// Attendees in check-in order.
    pub async fn current_roster(&self) -> Vec<Attendee> {
        self.notifier.registry.snapshot().await
    }

    /// `false` between the end of a session and the next reset.
    pub async fn accepting_check_ins(&self) -> bool {
        !self.notifier.registry.is_closed().await
    }

    pub async fn timer_phase(&self) -> TimerPhase {
        self.current_timer().await.phase().await
    }

    pub async fn remaining(&self) -> Option<Duration> {
        self.current_timer().await.remaining().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifier.events.subscribe()
    }

    /// A check-in succeeded: tell everyone and start the clock if it was the first.
    pub(crate) async fn admitted(&self, registration: Registration) {
        self.notifier.broadcast_roster().await;
        if registration.first && self.start_session().await {
            debug!(id = %registration.attendee.id, "First check-in started the session");
        }
    }

    /// Explicit exit. The roster is rebroadcast even if `id` was unknown.
    pub(crate) async fn exit(&self, id: &str) {
        if self
            .notifier
            .registry
            .remove(id, RemovalCause::Exit)
            .await
            .is_none()
        {
            warn!(id, "Exit for a student who is not checked in");
        }
        self.notifier.broadcast_roster().await;
    }

    /// The connection that checked `id` in went away.
    pub(crate) async fn disconnected(&self, id: &str, connection_id: Uuid) {
        if self
            .notifier
            .registry
            .remove_owned(id, connection_id, RemovalCause::Disconnect)
            .await
            .is_some()
        {
            self.notifier.broadcast_roster().await;
        }
    }
}
