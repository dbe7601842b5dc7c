//! Wall-clock driven session timer.
//!
//! The timer only publishes [`TimerEvent`]s on a channel; turning them into
//! broadcasts is the coordinator's job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::types::{MIN_TICK_INTERVAL, TimerConfig, TimerEvent, TimerPhase};

struct TimerState {
    phase: TimerPhase,
    deadline: Option<Instant>,
}

/// Session countdown: Idle → Active → WarningSent → Ended.
pub struct SessionTimer {
    config: TimerConfig,
    state: Mutex<TimerState>,
    events: mpsc::UnboundedSender<TimerEvent>,
    cancel: watch::Sender<bool>,
}

impl SessionTimer {
    pub fn new(config: TimerConfig, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            config,
            state: Mutex::new(TimerState {
                phase: TimerPhase::Idle,
                deadline: None,
            }),
            events,
            cancel,
        }
    }

    /// Start the countdown. Only the first call on an idle timer has an effect.
    pub async fn activate(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != TimerPhase::Idle {
            return false;
        }

        state.phase = TimerPhase::Active;
        state.deadline = Some(Instant::now() + self.config.duration);
        self.emit(TimerEvent::Started {
            duration: self.config.duration,
        });
        drop(state);

        info!(
            duration_secs = self.config.duration.as_secs(),
            warning_lead_secs = self.config.warning_lead.as_secs(),
            "Session timer started"
        );
        tokio::spawn(Arc::clone(self).run(self.cancel.subscribe()));
        true
    }

    /// End the session now. Returns `false` if it had already ended.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.phase == TimerPhase::Ended {
            return false;
        }
        state.phase = TimerPhase::Ended;
        self.emit(TimerEvent::Ended { manual: true });
        drop(state);

        self.cancel.send_replace(true);
        info!("Session stopped manually");
        true
    }

    /// Stop ticking without publishing anything.
    pub async fn cancel(&self) {
        self.state.lock().await.phase = TimerPhase::Ended;
        self.cancel.send_replace(true);
    }

    pub async fn phase(&self) -> TimerPhase {
        self.state.lock().await.phase
    }

    /// Time left while the countdown is running.
    pub async fn remaining(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        if !state.phase.is_running() {
            return None;
        }
        state
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let period = self.config.tick_interval.max(MIN_TICK_INTERVAL);
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    if !self.tick(Instant::now()).await {
                        break;
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Session timer task exiting");
    }

    /// Evaluate the deadline at `now`. Returns whether ticking should continue.
    pub(crate) async fn tick(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        if !state.phase.is_running() {
            return false;
        }
        let Some(deadline) = state.deadline else {
            return false;
        };

        let remaining = deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            state.phase = TimerPhase::Ended;
            self.emit(TimerEvent::Ended { manual: false });
            info!("Session time is up");
            return false;
        }

        if state.phase == TimerPhase::Active && remaining <= self.config.warning_lead {
            state.phase = TimerPhase::WarningSent;
            self.emit(TimerEvent::Warning { remaining });
            info!(remaining_secs = remaining.as_secs(), "Session warning fired");
        }

        self.emit(TimerEvent::TimeRemaining { remaining });
        true
    }

    fn emit(&self, event: TimerEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "No listener for timer event");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn timer(duration: u64, lead: u64) -> (Arc<SessionTimer>, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = TimerConfig {
            duration: Duration::from_secs(duration),
            warning_lead: Duration::from_secs(lead),
            tick_interval: Duration::from_secs(1),
        };
        (Arc::new(SessionTimer::new(config, tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn warning_then_end_on_schedule() {
        let (timer, mut rx) = timer(10, 5);
        let start = Instant::now();
        assert!(timer.activate().await);

        let mut warnings = Vec::new();
        let mut ended = Vec::new();
        let mut ticks = 0;
        while let Some(event) = rx.recv().await {
            let at = Instant::now() - start;
            match event {
                TimerEvent::Started { duration } => assert_eq!(duration, Duration::from_secs(10)),
                TimerEvent::TimeRemaining { .. } => ticks += 1,
                TimerEvent::Warning { .. } => warnings.push(at),
                TimerEvent::Ended { manual } => {
                    assert!(!manual);
                    ended.push(at);
                    break;
                }
            }
        }

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0] >= Duration::from_secs(5));
        assert!(warnings[0] < Duration::from_secs(10));
        assert_eq!(ended.len(), 1);
        assert!(ended[0] >= Duration::from_secs(10));
        assert_eq!(ticks, 9);
        assert_eq!(timer.phase().await, TimerPhase::Ended);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err(), "no events after the session ended");
    }

    #[tokio::test(start_paused = true)]
    async fn time_remaining_counts_down() {
        let (timer, mut rx) = timer(125, 60);
        timer.activate().await;

        assert!(matches!(rx.recv().await, Some(TimerEvent::Started { .. })));
        assert_eq!(
            rx.recv().await,
            Some(TimerEvent::TimeRemaining {
                remaining: Duration::from_secs(124)
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(TimerEvent::TimeRemaining {
                remaining: Duration::from_secs(123)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn activate_is_idempotent() {
        let (timer, mut rx) = timer(10, 5);
        assert!(timer.activate().await);
        tokio::time::advance(Duration::from_millis(1500)).await;
        let before = timer.remaining().await.unwrap();

        assert!(!timer.activate().await);
        assert_eq!(timer.remaining().await.unwrap(), before);

        let started = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, TimerEvent::Started { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (timer, mut rx) = timer(10, 5);
        timer.activate().await;

        assert!(timer.stop().await);
        assert!(!timer.stop().await);
        assert_eq!(timer.phase().await, TimerPhase::Ended);
        assert!(timer.remaining().await.is_none());

        tokio::time::sleep(Duration::from_secs(15)).await;
        let events: Vec<TimerEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                TimerEvent::Started {
                    duration: Duration::from_secs(10)
                },
                TimerEvent::Ended { manual: true },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_idle_timer_ends_it() {
        let (timer, mut rx) = timer(10, 5);
        assert!(timer.stop().await);
        assert!(!timer.activate().await);
        assert_eq!(rx.recv().await, Some(TimerEvent::Ended { manual: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_silent() {
        let (timer, mut rx) = timer(10, 5);
        timer.activate().await;
        assert!(matches!(rx.recv().await, Some(TimerEvent::Started { .. })));

        timer.cancel().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn warning_fires_immediately_when_lead_covers_first_tick() {
        let (timer, mut rx) = timer(3, 5);
        timer.activate().await;

        assert!(matches!(rx.recv().await, Some(TimerEvent::Started { .. })));
        assert!(matches!(rx.recv().await, Some(TimerEvent::Warning { .. })));
        assert!(matches!(rx.recv().await, Some(TimerEvent::TimeRemaining { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_interval_still_ends_the_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = TimerConfig {
            duration: Duration::from_millis(5),
            warning_lead: Duration::ZERO,
            tick_interval: Duration::ZERO,
        };
        let timer = Arc::new(SessionTimer::new(config, tx));
        timer.activate().await;

        loop {
            if rx.recv().await.unwrap() == (TimerEvent::Ended { manual: false }) {
                break;
            }
        }
        assert_eq!(timer.phase().await, TimerPhase::Ended);
    }
}
