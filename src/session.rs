//! One client's explicit scheduling state: the selected day, its live
//! snapshot and the form being filled in.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use ulid::Ulid;

use crate::availability::{self, SlotAvailability};
use crate::conflict::{self, Validation};
use crate::coordinator::{self, BookingForm, SubmissionCoordinator};
use crate::error::{StoreError, SubmitError, ValidationError};
use crate::model::*;
use crate::store::Subscription;

/// A day's reservation set as last delivered by the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySnapshot {
    pub day: DayKey,
    pub reservations: Vec<Reservation>,
}

#[derive(Default)]
struct LiveView {
    day: Option<DayKey>,
    reservations: Vec<Reservation>,
}

pub struct Session {
    coordinator: Arc<SubmissionCoordinator>,
    view: Arc<Mutex<LiveView>>,
    subscription: Option<Subscription>,
    pushes: mpsc::UnboundedSender<DaySnapshot>,
    pub form: BookingForm,
}

impl Session {
    /// `pushes` receives every snapshot of the selected day.
    pub fn new(
        coordinator: Arc<SubmissionCoordinator>,
        pushes: mpsc::UnboundedSender<DaySnapshot>,
    ) -> Self {
        Self {
            coordinator,
            view: Arc::new(Mutex::new(LiveView::default())),
            subscription: None,
            pushes,
            form: BookingForm::default(),
        }
    }

    pub fn coordinator(&self) -> &SubmissionCoordinator {
        &self.coordinator
    }

    pub fn day(&self) -> Option<DayKey> {
        self.view.lock().ok().and_then(|v| v.day.clone())
    }

    /// Latest reservations of the selected day, ascending by start.
    pub fn snapshot(&self) -> Vec<Reservation> {
        self.view
            .lock()
            .map(|v| v.reservations.clone())
            .unwrap_or_default()
    }

    /// Switch the live view to `day`. The previous subscription is
    /// dropped and the chosen times are reset.
    pub fn select_day(&mut self, day: DayKey) {
        if self.day().as_ref() == Some(&day) {
            return;
        }
        self.subscription = None;
        if let Ok(mut view) = self.view.lock() {
            view.day = Some(day.clone());
            view.reservations.clear();
        }
        self.form.start = None;
        self.form.end = None;

        let view = self.view.clone();
        let coordinator = self.coordinator.clone();
        let pushes = self.pushes.clone();
        let watched = day.clone();
        let subscription = self.coordinator.store().subscribe(day, move |set| {
            {
                let Ok(mut view) = view.lock() else { return };
                // A late delivery for a day we already left.
                if view.day.as_ref() != Some(&watched) {
                    return;
                }
                view.reservations = set.clone();
            }
            coordinator.observe_snapshot(&set);
            let _ = pushes.send(DaySnapshot {
                day: watched.clone(),
                reservations: set,
            });
        });
        debug!("session watching {}", subscription.day());
        self.subscription = Some(subscription);
    }

    pub fn available_slots(&self) -> Vec<SlotAvailability> {
        availability::available_slots(&self.snapshot())
    }

    /// Advisory check of `[start, end)` against the live snapshot. Our own
    /// not-yet-echoed booking never counts as a conflict.
    pub fn validate(&self, start: SlotTime, end: SlotTime) -> Result<Validation, ValidationError> {
        if self.day().is_none() {
            return Err(ValidationError::NoDaySelected);
        }
        let span = coordinator::grid_span(start, end)?;
        let pending = self.coordinator.pending();
        Ok(conflict::check(
            &span,
            &self.snapshot(),
            None,
            pending.as_ref(),
        ))
    }

    /// Submit the current form for the selected day.
    pub async fn submit(&mut self) -> Result<Reservation, SubmitError> {
        let day = self.day().ok_or(ValidationError::NoDaySelected)?;
        self.coordinator.submit(&day, &mut self.form).await
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.coordinator.store().cancel(id).await
    }

    /// The signed-in user's reservations across all days. Empty when
    /// nobody is signed in.
    pub async fn my_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        match self.coordinator.identity() {
            Some(me) => self.coordinator.store().list_for_owner(&me.owner_id).await,
            None => Ok(Vec::new()),
        }
    }
}
