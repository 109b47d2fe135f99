//! Newline-delimited JSON protocol. One [`Session`] per connection; day
//! snapshots and notices are pushed between replies.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::availability::{self, SlotAvailability};
use crate::catalog::{self, DurationLabel};
use crate::collab::*;
use crate::coordinator::{BookingForm, CoordinatorConfig, SubmissionCoordinator};
use crate::error::ValidationError;
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::session::{DaySnapshot, Session};
use crate::store::ReservationStore;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello {
        owner_id: String,
        owner_email: String,
    },
    SelectDay {
        day: DayKey,
    },
    Catalog,
    Slots,
    SuggestEnd {
        start: SlotTime,
        #[serde(default)]
        duration: Option<DurationLabel>,
    },
    Validate {
        start: SlotTime,
        end: SlotTime,
    },
    Submit {
        form: BookingForm,
    },
    Cancel {
        id: Ulid,
    },
    MyReservations,
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::SelectDay { .. } => "select_day",
            Request::Catalog => "catalog",
            Request::Slots => "slots",
            Request::SuggestEnd { .. } => "suggest_end",
            Request::Validate { .. } => "validate",
            Request::Submit { .. } => "submit",
            Request::Cancel { .. } => "cancel",
            Request::MyReservations => "my_reservations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Error {
        kind: &'static str,
        message: String,
    },
    Snapshot(DaySnapshot),
    Catalog {
        slots: Vec<SlotTime>,
        closing: SlotTime,
        durations: Vec<DurationLabel>,
        categories: Vec<CategoryKind>,
        materials: Vec<&'static str>,
    },
    Slots {
        day: DayKey,
        slots: Vec<SlotAvailability>,
        busy: Vec<Span>,
    },
    Suggestion {
        start: SlotTime,
        end: SlotTime,
        duration: String,
    },
    Validation {
        valid: bool,
        conflicting: Option<Reservation>,
        message: String,
    },
    Booked {
        reservation: Reservation,
        duration: String,
    },
    Notice {
        notice: Notice,
    },
    Reservations {
        reservations: Vec<Reservation>,
    },
}

impl Reply {
    fn error(kind: &'static str, message: impl ToString) -> Self {
        Reply::Error {
            kind,
            message: message.to_string(),
        }
    }

    fn invalid(e: ValidationError) -> Self {
        Reply::error("validation", e)
    }
}

#[derive(Debug)]
pub enum WireError {
    Codec(LinesCodecError),
    Json(serde_json::Error),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Codec(e) => write!(f, "connection error: {e}"),
            WireError::Json(e) => write!(f, "encoding error: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<LinesCodecError> for WireError {
    fn from(e: LinesCodecError) -> Self {
        WireError::Codec(e)
    }
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(e)
    }
}

/// What every connection shares.
#[derive(Clone)]
pub struct Backend {
    pub store: ReservationStore,
    pub email: Arc<dyn EmailDispatcher>,
    pub config: CoordinatorConfig,
}

type Lines<S> = Framed<S, LinesCodec>;

async fn send<S>(framed: &mut Lines<S>, reply: &Reply) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(serde_json::to_string(reply)?).await?;
    Ok(())
}

/// Serve one client until it disconnects.
pub async fn process_connection<S>(socket: S, backend: Backend) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    let identity = Arc::new(SessionIdentity::default());
    let (notice_tx, mut notices) = mpsc::unbounded_channel();
    let coordinator = SubmissionCoordinator::new(
        backend.store.clone(),
        identity.clone(),
        Arc::new(ChannelNotifier(notice_tx)),
        backend.email.clone(),
        backend.config.clone(),
    );
    let (snapshot_tx, mut snapshots) = mpsc::unbounded_channel();
    let mut session = Session::new(Arc::new(coordinator), snapshot_tx);

    loop {
        tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        send(&mut framed, &Reply::error("bad_request", "line too long")).await?;
                        continue;
                    }
                    Some(Err(e)) => return Err(e.into()),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match serde_json::from_str::<Request>(&line) {
                    Ok(request) => handle(&mut session, &identity, request).await,
                    Err(e) => Reply::error("bad_request", e),
                };
                send(&mut framed, &reply).await?;
            }
            Some(snapshot) = snapshots.recv() => {
                send(&mut framed, &Reply::Snapshot(snapshot)).await?;
            }
            Some(notice) = notices.recv() => {
                send(&mut framed, &Reply::Notice { notice }).await?;
            }
        }
    }
    debug!("client disconnected");
    Ok(())
}

async fn handle(session: &mut Session, identity: &SessionIdentity, request: Request) -> Reply {
    metrics::counter!(crate::observability::REQUESTS_TOTAL, "op" => request.op()).increment(1);
    match request {
        Request::Hello {
            owner_id,
            owner_email,
        } => {
            let owner_id = owner_id.trim().to_string();
            if owner_id.is_empty() {
                return Reply::invalid(ValidationError::MissingField("owner_id"));
            }
            debug!("signed in as {owner_id}");
            identity.sign_in(Identity {
                owner_id,
                owner_email: owner_email.trim().to_string(),
            });
            Reply::Ok
        }
        Request::SelectDay { day } => {
            session.select_day(day);
            Reply::Ok
        }
        Request::Catalog => Reply::Catalog {
            slots: catalog::generate(),
            closing: catalog::CLOSING,
            durations: DurationLabel::ALL.to_vec(),
            categories: CategoryKind::ALL.to_vec(),
            materials: MATERIALS.to_vec(),
        },
        Request::Slots => match session.day() {
            Some(day) => {
                let snapshot = session.snapshot();
                Reply::Slots {
                    day,
                    slots: availability::available_slots(&snapshot),
                    busy: availability::occupied_blocks(&snapshot),
                }
            }
            None => Reply::invalid(ValidationError::NoDaySelected),
        },
        Request::SuggestEnd { start, duration } => {
            if !catalog::is_start_slot(start) {
                return Reply::invalid(ValidationError::OffGrid("start time"));
            }
            let mut draft = BookingForm::default();
            draft.set_start(start);
            if let Some(d) = duration {
                draft.apply_duration(d);
            }
            let Some(end) = draft.end else {
                return Reply::invalid(ValidationError::MissingField("end time"));
            };
            Reply::Suggestion {
                start,
                end,
                duration: catalog::format_duration(&Span::new(start, end)),
            }
        }
        Request::Validate { start, end } => match session.validate(start, end) {
            Ok(v) => Reply::Validation {
                message: v.message(),
                valid: v.valid,
                conflicting: v.conflicting,
            },
            Err(e) => Reply::invalid(e),
        },
        Request::Submit { form } => {
            session.form = form;
            match session.submit().await {
                Ok(reservation) => Reply::Booked {
                    duration: catalog::format_duration(&reservation.span),
                    reservation,
                },
                Err(e) => Reply::error(e.kind(), e),
            }
        }
        Request::Cancel { id } => {
            if identity.current().is_none() {
                return Reply::invalid(ValidationError::NotSignedIn);
            }
            match session.cancel(id).await {
                Ok(_) => Reply::Ok,
                Err(e) => Reply::error("store", e),
            }
        }
        Request::MyReservations => match session.my_reservations().await {
            Ok(reservations) => Reply::Reservations { reservations },
            Err(e) => Reply::error("store", e),
        },
    }
}
