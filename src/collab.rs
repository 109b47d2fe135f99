//! Collaborators the scheduling core talks to but does not own.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::catalog::format_duration;
use crate::error::{NotificationDispatchError, StoreError};
use crate::model::*;

// ── Identity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub owner_id: String,
    pub owner_email: String,
}

pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any. Treated as opaque strings.
    fn current(&self) -> Option<Identity>;
}

/// Identity of one connection. Empty until the client signs in.
#[derive(Default)]
pub struct SessionIdentity(RwLock<Option<Identity>>);

impl SessionIdentity {
    pub fn new(identity: Option<Identity>) -> Self {
        Self(RwLock::new(identity))
    }

    pub fn sign_in(&self, identity: Identity) {
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(identity);
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<Identity> {
        self.0.read().ok().and_then(|i| i.clone())
    }
}

// ── Repository ───────────────────────────────────────────────────

/// Backing store for reservations. Eventually consistent and not
/// transactional: `insert` never checks for overlap.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Change feed for one day. Register before reading to avoid gaps.
    fn watch(&self, day: &DayKey) -> broadcast::Receiver<Event>;

    /// Point-in-time read of a day, sorted by start.
    async fn fetch_day(&self, day: &DayKey) -> Result<Vec<Reservation>, StoreError>;

    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError>;

    async fn cancel(&self, id: Ulid) -> Result<Reservation, StoreError>;

    /// All reservations of one owner, sorted by day then start.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Reservation>, StoreError>;
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Success(String),
    Error(String),
    Info(String),
}

/// Fire-and-forget user signalling. Must not fail the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Success(m) | Notice::Info(m) => info!("notice: {m}"),
            Notice::Error(m) => info!("notice (error): {m}"),
        }
    }
}

/// Forwards notices to a channel, e.g. a client connection's writer.
pub struct ChannelNotifier(pub mpsc::UnboundedSender<Notice>);

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.0.send(notice).is_err() {
            debug!("notice dropped: receiver closed");
        }
    }
}

// ── Email ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEmail {
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub body: String,
}

impl ConfirmationEmail {
    pub fn for_reservation(r: &Reservation, cc: Option<String>) -> Self {
        let materials = r.materials.iter().cloned().collect::<Vec<_>>().join(", ");
        let body = format!(
            "Your room reservation is confirmed.\n\n\
             Requested by: {}\n\
             Event: {}\n\
             Category: {}\n\
             Day: {}\n\
             Time: {} - {}\n\
             Duration: {}\n\
             Materials: {materials}\n",
            r.owner_email,
            r.title,
            r.category.label(),
            r.day,
            r.span.start,
            r.span.end,
            format_duration(&r.span),
        );
        Self {
            to: r.owner_email.clone(),
            cc,
            subject: format!("Reservation confirmed: {} on {}", r.title, r.day),
            body,
        }
    }
}

/// Best-effort confirmation mail. Errors are logged by the caller and
/// never turn a booking into a failure.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_confirmation(&self, email: ConfirmationEmail)
        -> Result<(), NotificationDispatchError>;
}

/// Logs the rendered message instead of delivering it.
pub struct LogEmailDispatcher;

#[async_trait]
impl EmailDispatcher for LogEmailDispatcher {
    async fn send_confirmation(
        &self,
        email: ConfirmationEmail,
    ) -> Result<(), NotificationDispatchError> {
        if email.to.is_empty() {
            return Err(NotificationDispatchError("no recipient".into()));
        }
        info!(to = %email.to, cc = ?email.cc, "email: {}", email.subject);
        debug!("{}", email.body);
        Ok(())
    }
}
