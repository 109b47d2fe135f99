//! The create flow: local validation, authoritative re-validation against a
//! fresh read, commit under a timeout, then optimistic-marker cleanup.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::catalog::{self, DurationLabel};
use crate::collab::*;
use crate::conflict::{self, PendingReservation};
use crate::error::*;
use crate::limits::*;
use crate::model::*;
use crate::store::ReservationStore;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Bound on the commit step; past it the write counts as failed.
    pub write_timeout: Duration,
    /// Longest a pending marker survives without its echo.
    pub pending_grace: Duration,
    /// Delay before the "collect the keys" reminder.
    pub follow_up_delay: Duration,
    /// Extra recipient copied on confirmation emails.
    pub notify_email: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            pending_grace: Duration::from_secs(10),
            follow_up_delay: Duration::from_millis(1500),
            notify_email: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Validating,
    FetchingFreshSnapshot,
    RevalidatingConflict,
    Committing,
    Confirmed,
    ValidationFailed,
    ConflictDetected,
    WriteFailed,
}

/// The booking form as the user fills it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<CategoryKind>,
    #[serde(default)]
    pub custom_category: String,
    #[serde(default)]
    pub start: Option<SlotTime>,
    #[serde(default)]
    pub end: Option<SlotTime>,
    #[serde(default)]
    pub materials: BTreeSet<String>,
}

impl BookingForm {
    /// Pick a start; fills in a one-hour end if none was chosen yet.
    pub fn set_start(&mut self, start: SlotTime) {
        self.start = Some(start);
        if self.end.is_none() {
            self.end = Some(catalog::suggest_default_end(start));
        }
    }

    /// Quick-pick duration. Needs a start.
    pub fn apply_duration(&mut self, duration: DurationLabel) -> Option<SlotTime> {
        let end = catalog::suggest_end(self.start?, duration);
        self.end = Some(end);
        Some(end)
    }

    pub fn toggle_material(&mut self, material: &str) {
        if !self.materials.remove(material) {
            self.materials.insert(material.to_string());
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A non-empty span on the half-hour grid within opening hours.
pub fn grid_span(start: SlotTime, end: SlotTime) -> Result<Span, ValidationError> {
    if start >= end {
        return Err(ValidationError::EndNotAfterStart);
    }
    if !catalog::is_start_slot(start) {
        return Err(ValidationError::OffGrid("start time"));
    }
    if !catalog::is_end_boundary(end) {
        return Err(ValidationError::OffGrid("end time"));
    }
    Ok(Span::new(start, end))
}

/// Turn a filled-in form into a repository payload, or say what is wrong.
pub fn build_reservation(
    day: &DayKey,
    identity: Option<Identity>,
    form: &BookingForm,
) -> Result<NewReservation, ValidationError> {
    let identity = identity.ok_or(ValidationError::NotSignedIn)?;
    if identity.owner_id.len() > MAX_OWNER_LEN || identity.owner_email.len() > MAX_OWNER_LEN {
        return Err(ValidationError::TooLong("owner"));
    }

    let title = form.title.trim();
    if title.is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong("title"));
    }

    let category = match form.category.ok_or(ValidationError::MissingField("category"))? {
        CategoryKind::TeamMeeting => Category::TeamMeeting,
        CategoryKind::ClientPresentation => Category::ClientPresentation,
        CategoryKind::Interview => Category::Interview,
        CategoryKind::Training => Category::Training,
        CategoryKind::VideoConference => Category::VideoConference,
        CategoryKind::Other => {
            let text = form.custom_category.trim();
            if text.is_empty() {
                return Err(ValidationError::CustomCategoryRequired);
            }
            if text.len() > MAX_CUSTOM_CATEGORY_LEN {
                return Err(ValidationError::TooLong("custom category"));
            }
            Category::Other(text.to_string())
        }
    };

    let start = form.start.ok_or(ValidationError::MissingField("start time"))?;
    let end = form.end.ok_or(ValidationError::MissingField("end time"))?;
    let span = grid_span(start, end)?;

    let materials: BTreeSet<String> = form
        .materials
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if materials.is_empty() {
        return Err(ValidationError::NoMaterials);
    }
    if materials.len() > MAX_MATERIALS || materials.iter().any(|m| m.len() > MAX_MATERIAL_LEN) {
        return Err(ValidationError::TooLong("materials"));
    }

    Ok(NewReservation {
        day: day.clone(),
        span,
        title: title.to_string(),
        category,
        materials,
        owner_id: identity.owner_id,
        owner_email: identity.owner_email,
    })
}

/// Runs one submission at a time for a single client session and owns that
/// session's pending marker.
pub struct SubmissionCoordinator {
    store: ReservationStore,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn NotificationSink>,
    email: Arc<dyn EmailDispatcher>,
    config: CoordinatorConfig,
    pending: Arc<Mutex<Option<PendingReservation>>>,
    state: watch::Sender<SubmissionState>,
}

/// Puts the coordinator back to idle if a submission future is dropped
/// before it finishes.
struct Flight<'a> {
    coordinator: &'a SubmissionCoordinator,
    landed: bool,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.landed {
            debug!("submission abandoned mid-flight");
            self.coordinator.take_pending();
            self.coordinator.state.send_replace(SubmissionState::Idle);
        }
    }
}

impl SubmissionCoordinator {
    pub fn new(
        store: ReservationStore,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
        email: Arc<dyn EmailDispatcher>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
            email,
            config,
            pending: Arc::new(Mutex::new(None)),
            state: watch::Sender::new(SubmissionState::Idle),
        }
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.current()
    }

    pub fn state(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    pub fn pending(&self) -> Option<PendingReservation> {
        self.pending.lock().ok().and_then(|p| p.clone())
    }

    /// Feed a subscription update; clears the pending marker once its
    /// reservation shows up. Returns true if it did.
    pub fn observe_snapshot(&self, reservations: &[Reservation]) -> bool {
        let Ok(mut slot) = self.pending.lock() else {
            return false;
        };
        let echoed = slot
            .as_ref()
            .is_some_and(|p| reservations.iter().any(|r| p.matches(r)));
        if echoed {
            debug!("pending reservation echoed");
            *slot = None;
        }
        echoed
    }

    fn take_pending(&self) -> Option<PendingReservation> {
        self.pending.lock().ok().and_then(|mut p| p.take())
    }

    fn transition(&self, next: SubmissionState) {
        debug!("submission -> {next:?}");
        self.state.send_replace(next);
    }

    /// Submit `form` for `day`. On success the form is cleared.
    pub async fn submit(
        &self,
        day: &DayKey,
        form: &mut BookingForm,
    ) -> Result<Reservation, SubmitError> {
        let claimed = self.state.send_if_modified(|s| {
            if *s == SubmissionState::Idle {
                *s = SubmissionState::Validating;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ValidationError::SubmissionInProgress.into());
        }
        let mut flight = Flight {
            coordinator: self,
            landed: false,
        };

        let started = std::time::Instant::now();
        let result = self.run(day, form).await;
        metrics::histogram!(crate::observability::SUBMIT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let outcome = crate::observability::outcome_label(*self.state.borrow());
        metrics::counter!(crate::observability::SUBMISSIONS_TOTAL, "outcome" => outcome)
            .increment(1);

        if let Err(e) = &result {
            self.notifier.notify(Notice::Error(e.to_string()));
        }
        self.transition(SubmissionState::Idle);
        flight.landed = true;
        result
    }

    async fn run(&self, day: &DayKey, form: &mut BookingForm) -> Result<Reservation, SubmitError> {
        let new = build_reservation(day, self.identity.current(), form).map_err(|e| {
            self.transition(SubmissionState::ValidationFailed);
            e
        })?;

        self.transition(SubmissionState::FetchingFreshSnapshot);
        let fresh = self.store.fetch_fresh(day).await.map_err(|e| {
            self.transition(SubmissionState::WriteFailed);
            WriteError::Store(e)
        })?;

        self.transition(SubmissionState::RevalidatingConflict);
        if let Some(conflicting) = conflict::check(&new.span, &fresh, None, None).conflicting {
            self.transition(SubmissionState::ConflictDetected);
            info!(
                "booking {} on {} rejected: overlaps {}",
                new.span, new.day, conflicting.id
            );
            return Err(ConflictError { conflicting }.into());
        }

        self.transition(SubmissionState::Committing);
        let pending = PendingReservation::new(new.clone());
        let token = pending.token;
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(pending);
        }

        let written = match tokio::time::timeout(self.config.write_timeout, self.store.create(new))
            .await
        {
            Ok(written) => written,
            Err(_) => Err(WriteError::Timeout(self.config.write_timeout)),
        };
        let reservation = written.map_err(|e| {
            self.take_pending();
            self.transition(SubmissionState::WriteFailed);
            warn!("booking on {day} failed: {e}");
            e
        })?;

        self.transition(SubmissionState::Confirmed);
        info!(
            "booked {} on {} {} for {}",
            reservation.id, reservation.day, reservation.span, reservation.owner_id
        );
        form.clear();
        self.expire_pending_after(token);
        self.announce(&reservation);
        Ok(reservation)
    }

    /// Drop the marker after the grace period unless a newer one replaced it.
    fn expire_pending_after(&self, token: Ulid) {
        let pending = self.pending.clone();
        let grace = self.config.pending_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Ok(mut slot) = pending.lock()
                && let Some(p) = slot.take_if(|p| p.token == token)
            {
                debug!(
                    "pending reservation on {} expired without echo after {:?}",
                    p.payload.day,
                    p.placed_at.elapsed()
                );
            }
        });
    }

    fn announce(&self, r: &Reservation) {
        self.notifier.notify(Notice::Success(format!(
            "Reservation confirmed! {} - {} on {} from {} to {}",
            r.title,
            r.category.label(),
            r.day,
            r.span.start,
            r.span.end
        )));

        let notifier = self.notifier.clone();
        let delay = self.config.follow_up_delay;
        let start = r.span.start;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.notify(Notice::Info(format!(
                "Important: collect the keys and materials from administration 5 minutes before {start}"
            )));
        });

        let email = self.email.clone();
        let message = ConfirmationEmail::for_reservation(r, self.config.notify_email.clone());
        let id = r.id;
        tokio::spawn(async move {
            if let Err(e) = email.send_confirmation(message).await {
                warn!("confirmation email for {id} not sent: {e}");
                metrics::counter!(crate::observability::NOTIFICATION_FAILURES_TOTAL).increment(1);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::mpsc;

    use super::*;
    use crate::model::fixtures::*;
    use crate::testing::*;

    const DAY: &str = "2026-10-19";

    struct Harness {
        repo: Arc<MemoryRepo>,
        notifier: Arc<RecordingNotifier>,
        emails: mpsc::UnboundedReceiver<ConfirmationEmail>,
        coordinator: SubmissionCoordinator,
    }

    fn harness_with(repo: Arc<MemoryRepo>, owner: &str, fail_email: bool) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, emails) = mpsc::unbounded_channel();
        let coordinator = SubmissionCoordinator::new(
            ReservationStore::new(repo.clone()),
            identity(owner),
            notifier.clone(),
            Arc::new(RecordingEmail {
                sent: tx,
                fail: fail_email,
            }),
            CoordinatorConfig::default(),
        );
        Harness {
            repo,
            notifier,
            emails,
            coordinator,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryRepo::new(), "u-1", false)
    }

    fn form(start: &str, end: &str, title: &str) -> BookingForm {
        BookingForm {
            title: title.into(),
            category: Some(CategoryKind::TeamMeeting),
            custom_category: String::new(),
            start: Some(t(start)),
            end: Some(t(end)),
            materials: BTreeSet::from(["Projector".to_string()]),
        }
    }

    // ── Form building ────────────────────────────────────────

    fn who() -> Option<Identity> {
        Some(Identity {
            owner_id: "u-1".into(),
            owner_email: "u1@example.com".into(),
        })
    }

    #[test]
    fn complete_form_builds() {
        let new = build_reservation(&day(DAY), who(), &form("09:00", "10:00", " Sync ")).unwrap();
        assert_eq!(new.title, "Sync");
        assert_eq!(new.span, span("09:00", "10:00"));
        assert_eq!(new.owner_email, "u1@example.com");
    }

    #[test]
    fn form_rejections() {
        let d = day(DAY);
        let base = form("09:00", "10:00", "Sync");

        assert_eq!(
            build_reservation(&d, None, &base),
            Err(ValidationError::NotSignedIn)
        );

        let mut f = base.clone();
        f.title = "   ".into();
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::MissingField("title"))
        );

        let mut f = base.clone();
        f.category = None;
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::MissingField("category"))
        );

        let mut f = base.clone();
        f.category = Some(CategoryKind::Other);
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::CustomCategoryRequired)
        );
        f.custom_category = "Yoga".into();
        assert_eq!(
            build_reservation(&d, who(), &f).unwrap().category,
            Category::Other("Yoga".into())
        );

        let mut f = base.clone();
        f.end = None;
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::MissingField("end time"))
        );

        let f = form("10:00", "10:00", "Sync");
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::EndNotAfterStart)
        );

        let f = form("09:15", "10:00", "Sync");
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::OffGrid("start time"))
        );

        let f = form("22:00", "23:00", "Sync");
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::OffGrid("end time"))
        );

        let mut f = base.clone();
        f.materials.clear();
        f.materials.insert("  ".into());
        assert_eq!(
            build_reservation(&d, who(), &f),
            Err(ValidationError::NoMaterials)
        );
    }

    #[test]
    fn form_start_autofills_end_once() {
        let mut f = BookingForm::default();
        f.set_start(t("10:00"));
        assert_eq!(f.end, Some(t("11:00")));
        f.set_start(t("12:00"));
        assert_eq!(f.end, Some(t("11:00")));
        assert_eq!(f.apply_duration(DurationLabel::TwoHours), Some(t("14:00")));

        let mut late = BookingForm::default();
        late.set_start(t("22:00"));
        assert_eq!(late.end, Some(t("22:30")));
    }

    #[test]
    fn toggle_material_adds_and_removes() {
        let mut f = BookingForm::default();
        f.toggle_material("Projector");
        f.toggle_material("Whiteboard");
        f.toggle_material("Projector");
        assert_eq!(f.materials, BTreeSet::from(["Whiteboard".to_string()]));
    }

    // ── Submission flow ──────────────────────────────────────

    #[tokio::test]
    async fn successful_submit_commits_and_clears_form() {
        let mut h = harness();
        let mut f = form("09:00", "10:00", "Sync");
        let r = h.coordinator.submit(&day(DAY), &mut f).await.unwrap();

        assert_eq!(r.span, span("09:00", "10:00"));
        assert_eq!(f, BookingForm::default());
        assert_eq!(h.repo.snapshot(&day(DAY)), vec![r.clone()]);
        assert_eq!(*h.coordinator.state().borrow(), SubmissionState::Idle);
        assert!(matches!(&h.notifier.notices()[0], Notice::Success(m) if m.contains("Sync")));

        let email = h.emails.recv().await.unwrap();
        assert_eq!(email.to, "u-1@example.com");
    }

    #[tokio::test]
    async fn validation_failure_does_no_io() {
        let h = harness();
        let mut f = form("09:00", "10:00", "Sync");
        f.materials.clear();
        let err = h.coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::NoMaterials)));
        assert_eq!(h.repo.fetches.load(Ordering::SeqCst), 0);
        assert!(h.coordinator.pending().is_none());
        assert!(matches!(&h.notifier.notices()[0], Notice::Error(_)));
        // Failed forms are kept for correction.
        assert_eq!(f.title, "Sync");
    }

    #[tokio::test]
    async fn conflict_against_fresh_data_names_reservation() {
        let h = harness();
        h.repo
            .insert(new_reservation(DAY, "09:00", "10:00", "Team Sync"))
            .await
            .unwrap();
        let mut f = form("09:30", "10:30", "Mine");
        let err = h.coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        match err {
            SubmitError::Conflict(c) => {
                assert_eq!(c.conflicting.title, "Team Sync");
                assert_eq!(
                    c.to_string(),
                    "Schedule conflict with \"Team Sync\" (09:00-10:00)"
                );
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(h.coordinator.pending().is_none());
        assert_eq!(h.repo.snapshot(&day(DAY)).len(), 1);
    }

    #[tokio::test]
    async fn touching_boundary_books() {
        let h = harness();
        h.repo
            .insert(new_reservation(DAY, "09:00", "10:00", "Team Sync"))
            .await
            .unwrap();
        let mut f = form("08:30", "09:00", "Before");
        tokio_test::assert_ok!(h.coordinator.submit(&day(DAY), &mut f).await);
    }

    #[tokio::test]
    async fn stale_snapshot_race_is_caught_at_commit() {
        let repo = MemoryRepo::new();
        let s1 = harness_with(repo.clone(), "alice", false);
        let s2 = harness_with(repo.clone(), "bob", false);

        // Both sessions looked at the same (empty) day and saw 14:00-15:00 free.
        let stale: Vec<Reservation> = Vec::new();
        let candidate = span("14:00", "15:00");
        assert!(conflict::check(&candidate, &stale, None, None).valid);
        assert!(conflict::check(&candidate, &stale, None, None).valid);

        let mut f1 = form("14:00", "15:00", "Alice's review");
        let mut f2 = form("14:00", "15:00", "Bob's interview");
        s1.coordinator.submit(&day(DAY), &mut f1).await.unwrap();
        let err = s2.coordinator.submit(&day(DAY), &mut f2).await.unwrap_err();

        assert!(matches!(err, SubmitError::Conflict(ref c) if c.conflicting.title == "Alice's review"));
        assert_eq!(repo.snapshot(&day(DAY)).len(), 1);
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_failure_clears_pending_and_allows_retry() {
        let h = harness();
        h.repo.fail_inserts.store(true, Ordering::SeqCst);
        let mut f = form("11:00", "12:00", "Retry me");
        let err = h.coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        assert!(matches!(err, SubmitError::Write(WriteError::Store(_))));
        assert!(h.coordinator.pending().is_none());
        assert_eq!(*h.coordinator.state().borrow(), SubmissionState::Idle);

        h.repo.fail_inserts.store(false, Ordering::SeqCst);
        tokio_test::assert_ok!(h.coordinator.submit(&day(DAY), &mut f).await);
    }

    #[tokio::test]
    async fn fetch_failure_is_a_write_failure() {
        let h = harness();
        h.repo.fail_fetches.store(true, Ordering::SeqCst);
        let mut f = form("11:00", "12:00", "x");
        let err = h.coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        assert!(matches!(err, SubmitError::Write(WriteError::Store(_))));
        assert_eq!(h.repo.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let h = harness();
        h.repo.stall_inserts.store(true, Ordering::SeqCst);
        let mut f = form("11:00", "12:00", "Slow");
        let err = h.coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        assert!(matches!(err, SubmitError::Write(WriteError::Timeout(d)) if d == Duration::from_secs(10)));
        assert!(h.coordinator.pending().is_none());
    }

    #[tokio::test]
    async fn pending_cleared_by_echo() {
        let h = harness();
        let mut f = form("09:00", "10:00", "Sync");
        let r = h.coordinator.submit(&day(DAY), &mut f).await.unwrap();
        let pending = h.coordinator.pending().expect("marker kept until echo");
        assert!(pending.matches(&r));

        assert!(!h.coordinator.observe_snapshot(&[]));
        assert!(h.coordinator.pending().is_some());
        assert!(h.coordinator.observe_snapshot(&[r]));
        assert!(h.coordinator.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_cleared_after_grace() {
        let h = harness();
        let mut f = form("09:00", "10:00", "Sync");
        h.coordinator.submit(&day(DAY), &mut f).await.unwrap();
        assert!(h.coordinator.pending().is_some());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(h.coordinator.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_reminder_arrives_later() {
        let h = harness();
        let mut f = form("09:00", "10:00", "Sync");
        h.coordinator.submit(&day(DAY), &mut f).await.unwrap();
        assert_eq!(h.notifier.notices().len(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let notices = h.notifier.notices();
        assert!(matches!(&notices[1], Notice::Info(m) if m.contains("09:00")));
    }

    #[tokio::test]
    async fn email_failure_does_not_fail_booking() {
        let mut h = harness_with(MemoryRepo::new(), "u-1", true);
        let mut f = form("09:00", "10:00", "Sync");
        let r = h.coordinator.submit(&day(DAY), &mut f).await.unwrap();
        let attempted = h.emails.recv().await.unwrap();
        assert!(attempted.subject.contains("Sync"));
        assert_eq!(h.repo.snapshot(&day(DAY)), vec![r]);
        assert!(h
            .notifier
            .notices()
            .iter()
            .all(|n| !matches!(n, Notice::Error(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_while_in_flight_is_refused() {
        let Harness {
            repo, coordinator, ..
        } = harness();
        let coordinator = Arc::new(coordinator);
        repo.stall_inserts.store(true, Ordering::SeqCst);

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let mut f = form("09:00", "10:00", "First");
                coordinator.submit(&day(DAY), &mut f).await
            })
        };
        let mut state = coordinator.state();
        state
            .wait_for(|s| *s == SubmissionState::Committing)
            .await
            .unwrap();

        let mut f = form("11:00", "12:00", "Second");
        let err = coordinator.submit(&day(DAY), &mut f).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::SubmissionInProgress)
        ));

        assert!(first.await.unwrap().is_err());
        assert_eq!(*coordinator.state().borrow(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn dropped_submission_returns_to_idle() {
        let h = harness();
        h.repo.stall_inserts.store(true, Ordering::SeqCst);
        let mut f = form("09:00", "10:00", "Dropped");
        let d = day(DAY);
        let attempt = h.coordinator.submit(&d, &mut f);
        let _ = tokio::time::timeout(Duration::from_millis(20), attempt).await;
        assert_eq!(*h.coordinator.state().borrow(), SubmissionState::Idle);
        assert!(h.coordinator.pending().is_none());
    }
}
