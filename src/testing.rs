//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use ulid::Ulid;

use crate::collab::*;
use crate::error::{NotificationDispatchError, StoreError};
use crate::model::*;
use crate::notify::NotifyHub;

/// Repository with switchable failure modes and no disk I/O.
#[derive(Default)]
pub struct MemoryRepo {
    days: Mutex<HashMap<DayKey, DayState>>,
    hub: NotifyHub,
    pub fail_inserts: AtomicBool,
    pub stall_inserts: AtomicBool,
    pub fail_fetches: AtomicBool,
    pub fetches: AtomicUsize,
    pub inserts: AtomicUsize,
}

impl MemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self, day: &DayKey) -> Vec<Reservation> {
        self.days
            .lock()
            .unwrap()
            .get(day)
            .map(|d| d.reservations.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReservationRepository for MemoryRepo {
    fn watch(&self, day: &DayKey) -> broadcast::Receiver<Event> {
        self.hub.subscribe(day)
    }

    async fn fetch_day(&self, day: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fetch disabled".into()));
        }
        Ok(self.snapshot(day))
    }

    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        if self.stall_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert disabled".into()));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let reservation = new.commit(Ulid::new(), now_ms());
        self.days
            .lock()
            .unwrap()
            .entry(reservation.day.clone())
            .or_insert_with(|| DayState::new(reservation.day.clone()))
            .insert_reservation(reservation.clone());
        self.hub.send(&Event::ReservationCreated {
            reservation: reservation.clone(),
        });
        Ok(reservation)
    }

    async fn cancel(&self, id: Ulid) -> Result<Reservation, StoreError> {
        let removed = self
            .days
            .lock()
            .unwrap()
            .values_mut()
            .find_map(|d| d.remove_reservation(id))
            .ok_or(StoreError::NotFound(id))?;
        self.hub.send(&Event::ReservationCancelled {
            id,
            day: removed.day.clone(),
        });
        Ok(removed)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Reservation>, StoreError> {
        let mut out: Vec<_> = self
            .days
            .lock()
            .unwrap()
            .values()
            .flat_map(|d| d.reservations.iter().filter(|r| r.owner_id == owner_id).cloned())
            .collect();
        out.sort_by(|a, b| (&a.day, a.span.start).cmp(&(&b.day, b.span.start)));
        Ok(out)
    }
}

#[derive(Default)]
pub struct RecordingNotifier(pub Mutex<Vec<Notice>>);

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

/// Records every email and optionally fails delivery.
pub struct RecordingEmail {
    pub sent: mpsc::UnboundedSender<ConfirmationEmail>,
    pub fail: bool,
}

#[async_trait]
impl EmailDispatcher for RecordingEmail {
    async fn send_confirmation(
        &self,
        email: ConfirmationEmail,
    ) -> Result<(), NotificationDispatchError> {
        let _ = self.sent.send(email);
        if self.fail {
            return Err(NotificationDispatchError("smtp down".into()));
        }
        Ok(())
    }
}

pub fn identity(owner: &str) -> Arc<SessionIdentity> {
    Arc::new(SessionIdentity::new(Some(Identity {
        owner_id: owner.to_string(),
        owner_email: format!("{owner}@example.com"),
    })))
}
