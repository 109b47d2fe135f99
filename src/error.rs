use std::time::Duration;

use ulid::Ulid;

use crate::conflict::conflict_message;
use crate::model::Reservation;

/// Repository-level failure.
#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
            StoreError::Unavailable(e) => write!(f, "repository unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Missing or malformed form input. Detected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NotSignedIn,
    NoDaySelected,
    MissingField(&'static str),
    EndNotAfterStart,
    OffGrid(&'static str),
    CustomCategoryRequired,
    NoMaterials,
    TooLong(&'static str),
    SubmissionInProgress,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NotSignedIn => write!(f, "you must be signed in to book"),
            ValidationError::NoDaySelected => write!(f, "select a day first"),
            ValidationError::MissingField(field) => {
                write!(f, "please complete all required fields ({field})")
            }
            ValidationError::EndNotAfterStart => {
                write!(f, "end time must be after start time")
            }
            ValidationError::OffGrid(field) => {
                write!(f, "{field} is not a bookable half-hour slot")
            }
            ValidationError::CustomCategoryRequired => {
                write!(f, "describe the category when choosing \"Other\"")
            }
            ValidationError::NoMaterials => write!(f, "select at least one material"),
            ValidationError::TooLong(field) => write!(f, "{field} is too long"),
            ValidationError::SubmissionInProgress => {
                write!(f, "a booking is already being submitted")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// The candidate overlaps a reservation in the fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictError {
    pub conflicting: Reservation,
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&conflict_message(&self.conflicting))
    }
}

impl std::error::Error for ConflictError {}

/// The commit did not go through. Resubmitting the same payload is safe.
#[derive(Debug)]
pub enum WriteError {
    Store(StoreError),
    Timeout(Duration),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Store(e) => write!(f, "could not save reservation: {e}"),
            WriteError::Timeout(d) => {
                write!(f, "could not save reservation: no answer after {}ms", d.as_millis())
            }
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Store(e) => Some(e),
            WriteError::Timeout(_) => None,
        }
    }
}

impl From<StoreError> for WriteError {
    fn from(e: StoreError) -> Self {
        WriteError::Store(e)
    }
}

/// A notification or email could not be delivered. Logged, never surfaced.
#[derive(Debug)]
pub struct NotificationDispatchError(pub String);

impl std::fmt::Display for NotificationDispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification dispatch failed: {}", self.0)
    }
}

impl std::error::Error for NotificationDispatchError {}

/// Terminal failure of a submission. The coordinator is back to idle.
#[derive(Debug)]
pub enum SubmitError {
    Validation(ValidationError),
    Conflict(ConflictError),
    Write(WriteError),
}

impl SubmitError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "validation",
            SubmitError::Conflict(_) => "conflict",
            SubmitError::Write(_) => "write",
        }
    }
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Validation(e) => e.fmt(f),
            SubmitError::Conflict(e) => e.fmt(f),
            SubmitError::Write(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<ValidationError> for SubmitError {
    fn from(e: ValidationError) -> Self {
        SubmitError::Validation(e)
    }
}

impl From<ConflictError> for SubmitError {
    fn from(e: ConflictError) -> Self {
        SubmitError::Conflict(e)
    }
}

impl From<WriteError> for SubmitError {
    fn from(e: WriteError) -> Self {
        SubmitError::Write(e)
    }
}
