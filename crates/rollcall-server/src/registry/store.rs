//! In-memory attendee registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{Attendee, Contact, Registration, RegistryError};
use crate::audit::{AuditEntry, AuditSink, RemovalCause};

struct RegistryState {
    attendees: HashMap<String, Attendee>,
    next_seq: u64,
    closed: bool,
}

/// Thread-safe registry of checked-in students.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
    capacity: usize,
    audit: Arc<dyn AuditSink>,
}

impl SessionRegistry {
    pub fn new(capacity: usize, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                attendees: HashMap::new(),
                next_seq: 0,
                closed: false,
            })),
            capacity,
            audit,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check a student in.
    ///
    /// Identity and capacity are checked and the insert performed under one
    /// write lock, so two concurrent check-ins with the same id can never both
    /// succeed. `Registration::first` is decided under the same lock.
    pub async fn register(
        &self,
        id: &str,
        name: &str,
        contact: Contact,
        connection_id: Uuid,
    ) -> Result<Registration, RegistryError> {
        let mut state = self.state.write().await;

        if state.closed {
            return Err(RegistryError::SessionClosed);
        }
        if state.attendees.contains_key(id) {
            return Err(RegistryError::DuplicateIdentity { id: id.to_string() });
        }
        if state.attendees.len() >= self.capacity {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        state.next_seq += 1;
        let attendee = Attendee {
            id: id.to_string(),
            display_name: name.to_string(),
            contact,
            connection_id,
            joined_seq: state.next_seq,
        };
        let first = state.attendees.is_empty();
        state.attendees.insert(id.to_string(), attendee.clone());
        let size = state.attendees.len();
        drop(state);

        info!(id, name, size, capacity = self.capacity, "Student registered");
        self.audit.record(AuditEntry::CheckedIn {
            id: attendee.id.clone(),
            name: attendee.display_name.clone(),
            port: attendee.contact.port,
        });

        Ok(Registration { attendee, first })
    }

    /// Remove a student. No-op if absent.
    pub async fn remove(&self, id: &str, cause: RemovalCause) -> Option<Attendee> {
        let removed = self.state.write().await.attendees.remove(id);
        self.report_removal(removed.as_ref(), cause);
        removed
    }

    /// Remove a student only if the entry still belongs to `connection_id`.
    ///
    /// Used for hangups and failed deliveries, where the id may already have
    /// been released and taken by another connection.
    pub async fn remove_owned(
        &self,
        id: &str,
        connection_id: Uuid,
        cause: RemovalCause,
    ) -> Option<Attendee> {
        let mut state = self.state.write().await;
        let owned = state
            .attendees
            .get(id)
            .is_some_and(|a| a.connection_id == connection_id);
        let removed = if owned {
            state.attendees.remove(id)
        } else {
            None
        };
        drop(state);

        self.report_removal(removed.as_ref(), cause);
        removed
    }

    fn report_removal(&self, removed: Option<&Attendee>, cause: RemovalCause) {
        if let Some(attendee) = removed {
            info!(id = %attendee.id, cause = cause.as_str(), "Student removed");
            self.audit.record(AuditEntry::Removed {
                id: attendee.id.clone(),
                name: attendee.display_name.clone(),
                cause,
            });
        }
    }

    /// Consistent point-in-time copy, in check-in order.
    pub async fn snapshot(&self) -> Vec<Attendee> {
        let mut attendees: Vec<Attendee> =
            self.state.read().await.attendees.values().cloned().collect();
        attendees.sort_by_key(|a| a.joined_seq);
        attendees
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.attendees.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.attendees.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.attendees.contains_key(id)
    }

    /// Whether `id` is checked in through `connection_id`.
    pub async fn holds(&self, id: &str, connection_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .attendees
            .get(id)
            .is_some_and(|a| a.connection_id == connection_id)
    }

    /// Remove everyone at once.
    pub async fn clear(&self) -> Vec<Attendee> {
        let mut state = self.state.write().await;
        let mut cleared: Vec<Attendee> = state.attendees.drain().map(|(_, a)| a).collect();
        drop(state);

        cleared.sort_by_key(|a| a.joined_seq);
        if !cleared.is_empty() {
            info!(count = cleared.len(), "Registry cleared");
            self.audit.record(AuditEntry::Cleared {
                count: cleared.len(),
            });
        }
        cleared
    }

    /// Refuse further check-ins.
    pub async fn close(&self) {
        self.state.write().await.closed = true;
        debug!("Registry closed to new check-ins");
    }

    /// Accept check-ins again.
    pub async fn reopen(&self) {
        self.state.write().await.closed = false;
        debug!("Registry reopened");
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::audit::TracingAuditSink;
    use crate::audit::testing::RecordingSink;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn registry(capacity: usize) -> SessionRegistry {
        SessionRegistry::new(capacity, Arc::new(TracingAuditSink))
    }

    fn contact(port: u16) -> Contact {
        Contact::new(LOCALHOST, port)
    }

    #[tokio::test]
    async fn unique_check_ins_up_to_capacity_succeed() {
        let registry = registry(3);
        for (i, id) in ["10001", "10002", "10003"].into_iter().enumerate() {
            let reg = registry
                .register(id, "Student", contact(6001), Uuid::new_v4())
                .await
                .unwrap();
            assert_eq!(reg.first, i == 0);
        }

        let snapshot = registry.snapshot().await;
        let ids: Vec<&str> = snapshot.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["10001", "10002", "10003"]);
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let registry = registry(3);
        registry
            .register("10001", "Ada", contact(6001), Uuid::new_v4())
            .await
            .unwrap();

        let err = registry
            .register("10001", "Grace", contact(6002), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateIdentity {
                id: "10001".into()
            }
        );
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.snapshot().await[0].display_name, "Ada");
    }

    #[tokio::test]
    async fn full_registry_rejects_and_keeps_size() {
        let registry = registry(2);
        registry
            .register("a", "A", contact(1), Uuid::new_v4())
            .await
            .unwrap();
        registry
            .register("b", "B", contact(2), Uuid::new_v4())
            .await
            .unwrap();

        let err = registry
            .register("c", "C", contact(3), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::CapacityExceeded { capacity: 2 });
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_duplicate_check_ins_have_one_winner() {
        let registry = registry(30);
        let mut tasks = Vec::new();
        for port in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .register("same", "Twin", contact(port), Uuid::new_v4())
                    .await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(RegistryError::DuplicateIdentity { .. }) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = registry(3);
        registry
            .register("a", "A", contact(1), Uuid::new_v4())
            .await
            .unwrap();
        registry
            .register("b", "B", contact(2), Uuid::new_v4())
            .await
            .unwrap();

        assert!(registry.remove("a", RemovalCause::Exit).await.is_some());
        let after_once: Vec<String> = registry.snapshot().await.into_iter().map(|a| a.id).collect();
        assert!(registry.remove("a", RemovalCause::Exit).await.is_none());
        let after_twice: Vec<String> =
            registry.snapshot().await.into_iter().map(|a| a.id).collect();

        assert_eq!(after_once, after_twice);
        assert_eq!(after_twice, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn remove_owned_ignores_other_connections() {
        let registry = registry(3);
        let owner = Uuid::new_v4();
        registry
            .register("a", "A", contact(1), owner)
            .await
            .unwrap();

        assert!(
            registry
                .remove_owned("a", Uuid::new_v4(), RemovalCause::Disconnect)
                .await
                .is_none()
        );
        assert!(registry.contains("a").await);
        assert!(
            registry
                .remove_owned("a", owner, RemovalCause::Disconnect)
                .await
                .is_some()
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn first_flag_resets_after_registry_empties() {
        let registry = registry(3);
        let reg = registry
            .register("a", "A", contact(1), Uuid::new_v4())
            .await
            .unwrap();
        assert!(reg.first);
        registry.remove("a", RemovalCause::Exit).await;

        let reg = registry
            .register("b", "B", contact(2), Uuid::new_v4())
            .await
            .unwrap();
        assert!(reg.first);
    }

    #[tokio::test]
    async fn closed_registry_refuses_check_ins() {
        let registry = registry(3);
        registry.close().await;
        let err = registry
            .register("a", "A", contact(1), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::SessionClosed);

        registry.reopen().await;
        assert!(
            registry
                .register("a", "A", contact(1), Uuid::new_v4())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn mutations_are_audited() {
        let sink = RecordingSink::default();
        let registry = SessionRegistry::new(3, Arc::new(sink.clone()));

        registry
            .register("a", "Ada", contact(6001), Uuid::new_v4())
            .await
            .unwrap();
        registry.remove("a", RemovalCause::Exit).await;
        registry.remove("a", RemovalCause::Exit).await;
        registry
            .register("b", "Bob", contact(6002), Uuid::new_v4())
            .await
            .unwrap();
        let cleared = registry.clear().await;

        assert_eq!(cleared.len(), 1);
        assert_eq!(
            sink.entries(),
            vec![
                AuditEntry::CheckedIn {
                    id: "a".into(),
                    name: "Ada".into(),
                    port: 6001
                },
                AuditEntry::Removed {
                    id: "a".into(),
                    name: "Ada".into(),
                    cause: RemovalCause::Exit
                },
                AuditEntry::CheckedIn {
                    id: "b".into(),
                    name: "Bob".into(),
                    port: 6002
                },
                AuditEntry::Cleared { count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn holds_checks_connection_ownership() {
        let registry = registry(3);
        let owner = Uuid::new_v4();
        registry
            .register("10001", "Alice", contact(6001), owner)
            .await
            .unwrap();

        assert!(registry.holds("10001", owner).await);
        assert!(!registry.holds("10001", Uuid::new_v4()).await);
        registry.clear().await;
        assert!(!registry.holds("10001", owner).await);
    }
}
