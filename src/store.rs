use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::collab::ReservationRepository;
use crate::error::{StoreError, WriteError};
use crate::model::*;

/// Live view of reservations, one day at a time, over a repository.
#[derive(Clone)]
pub struct ReservationStore {
    repo: Arc<dyn ReservationRepository>,
}

/// Handle for a running day subscription. Dropping it stops delivery.
pub struct Subscription {
    day: DayKey,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn day(&self) -> &DayKey {
        &self.day
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ReservationStore {
    pub fn new(repo: Arc<dyn ReservationRepository>) -> Self {
        Self { repo }
    }

    /// Push the day's reservations (sorted by start) to `on_update` now and
    /// after every change.
    pub fn subscribe<F>(&self, day: DayKey, on_update: F) -> Subscription
    where
        F: Fn(Vec<Reservation>) + Send + Sync + 'static,
    {
        // Register first so a change landing during the initial read is not missed.
        let mut rx = self.repo.watch(&day);
        let repo = self.repo.clone();
        let task_day = day.clone();

        let task = tokio::spawn(async move {
            let day = task_day;
            let mut view = DayState::new(day.clone());
            if !resync(repo.as_ref(), &mut view).await {
                return;
            }
            on_update(view.reservations.clone());

            loop {
                match rx.recv().await {
                    Ok(event) => view.apply_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("subscription on {day} lagged by {skipped}; refetching");
                        if !resync(repo.as_ref(), &mut view).await {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
                on_update(view.reservations.clone());
            }
        });

        Subscription { day, task }
    }

    /// Authoritative point-in-time read, bypassing any subscription.
    pub async fn fetch_fresh(&self, day: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        let mut reservations = self.repo.fetch_day(day).await?;
        reservations.sort_by_key(|r| (r.span.start, r.id));
        Ok(reservations)
    }

    pub async fn create(&self, new: NewReservation) -> Result<Reservation, WriteError> {
        Ok(self.repo.insert(new).await?)
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.repo.cancel(id).await
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Reservation>, StoreError> {
        self.repo.list_by_owner(owner_id).await
    }
}

/// Replace `view` with a fresh read. False if the repository failed.
async fn resync(repo: &dyn ReservationRepository, view: &mut DayState) -> bool {
    match repo.fetch_day(&view.day).await {
        Ok(reservations) => {
            let mut fresh = DayState::new(view.day.clone());
            for r in reservations {
                fresh.insert_reservation(r);
            }
            *view = fresh;
            true
        }
        Err(e) => {
            warn!("subscription on {} stopped: {e}", view.day);
            false
        }
    }
}
