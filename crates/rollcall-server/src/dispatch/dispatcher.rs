//! Fan-out of server frames to every attendee.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use rollcall_core::protocol::{RosterEntry, ServerFrame};

use super::channel::{ContactChannel, DeliveryError};
use crate::audit::RemovalCause;
use crate::registry::{Attendee, SessionRegistry};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Attendees the frame reached.
    pub delivered: usize,
    /// Ids removed from the registry because delivery failed.
    pub evicted: Vec<String>,
}

/// Delivers frames to all registered attendees, evicting unreachable ones.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: SessionRegistry,
    channel: Arc<dyn ContactChannel>,
    delivery_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        registry: SessionRegistry,
        channel: Arc<dyn ContactChannel>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channel,
            delivery_timeout,
        }
    }

    /// Send `frame` to everyone currently registered.
    pub async fn broadcast(&self, frame: ServerFrame) -> BroadcastReport {
        let recipients = self.registry.snapshot().await;
        self.deliver(recipients, frame).await
    }

    /// Send the current roster to everyone on it.
    ///
    /// Recipients and roster content come from the same snapshot.
    pub async fn broadcast_roster(&self) -> (Vec<RosterEntry>, BroadcastReport) {
        let recipients = self.registry.snapshot().await;
        let roster: Vec<RosterEntry> = recipients.iter().map(Attendee::roster_entry).collect();
        let report = self
            .deliver(
                recipients,
                ServerFrame::RosterUpdate {
                    attendees: roster.clone(),
                },
            )
            .await;
        (roster, report)
    }

    async fn deliver(&self, recipients: Vec<Attendee>, frame: ServerFrame) -> BroadcastReport {
        let kind = frame.kind();
        let frame = Arc::new(frame);
        let mut deliveries = JoinSet::new();

        for attendee in recipients {
            let channel = Arc::clone(&self.channel);
            let frame = Arc::clone(&frame);
            let limit = self.delivery_timeout;
            deliveries.spawn(async move {
                let result = timeout(limit, channel.send(&attendee.contact, &frame))
                    .await
                    .unwrap_or(Err(DeliveryError::Timeout(limit)));
                (attendee, result)
            });
        }

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((attendee, Err(e))) => {
                    warn!(id = %attendee.id, frame = kind, error = %e, "Delivery failed");
                    failed.push(attendee);
                }
                Err(e) => warn!(frame = kind, error = %e, "Delivery task failed"),
            }
        }

        for attendee in failed {
            if self
                .registry
                .remove_owned(&attendee.id, attendee.connection_id, RemovalCause::Unreachable)
                .await
                .is_some()
            {
                report.evicted.push(attendee.id);
            }
        }

        debug!(
            frame = kind,
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "Broadcast complete"
        );
        report
    }
}
