use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for creation stamps.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// A wall-clock label on the booking grid, stored as minutes since midnight.
/// Displayed and parsed as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime(u16);

impl SlotTime {
    pub const fn from_minutes(minutes: u16) -> Self {
        Self(minutes)
    }

    pub const fn hm(hour: u16, minute: u16) -> Self {
        Self(hour * 60 + minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(pub String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time label {:?}: expected HH:MM", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for SlotTime {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        if hour > 23 || minute > 59 {
            return Err(err());
        }
        Ok(Self::hm(hour, minute))
    }
}

impl TryFrom<String> for SlotTime {
    type Error = ParseTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.to_string()
    }
}

/// Half-open interval `[start, end)` on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: SlotTime,
    pub end: SlotTime,
}

impl Span {
    pub fn new(start: SlotTime, end: SlotTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, t: SlotTime) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Calendar-day identity, normalized to `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDayError(pub String);

impl fmt::Display for ParseDayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid day {:?}: expected YYYY-MM-DD", self.0)
    }
}

impl std::error::Error for ParseDayError {}

impl DayKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DayKey {
    type Err = ParseDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDayError(s.to_string());
        let s = s.trim();
        let mut parts = s.splitn(3, '-');
        let (Some(y), Some(m), Some(d)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(err());
        };
        if y.len() != 4 || m.is_empty() || m.len() > 2 || d.is_empty() || d.len() > 2 {
            return Err(err());
        }
        let year: u16 = y.parse().map_err(|_| err())?;
        let month: u8 = m.parse().map_err(|_| err())?;
        let day: u8 = d.parse().map_err(|_| err())?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(err());
        }
        Ok(Self(format!("{year:04}-{month:02}-{day:02}")))
    }
}

impl TryFrom<String> for DayKey {
    type Error = ParseDayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a reservation is for. `Other` carries the free-text description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TeamMeeting,
    ClientPresentation,
    Interview,
    Training,
    VideoConference,
    Other(String),
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::TeamMeeting => "Team meeting",
            Category::ClientPresentation => "Client presentation",
            Category::Interview => "Interview",
            Category::Training => "Training",
            Category::VideoConference => "Video conference",
            Category::Other(text) => text,
        }
    }
}

/// The category picker value, before free text is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    TeamMeeting,
    ClientPresentation,
    Interview,
    Training,
    VideoConference,
    Other,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 6] = [
        CategoryKind::TeamMeeting,
        CategoryKind::ClientPresentation,
        CategoryKind::Interview,
        CategoryKind::Training,
        CategoryKind::VideoConference,
        CategoryKind::Other,
    ];
}

/// Equipment offered with the room. Free strings are still accepted.
pub const MATERIALS: [&str; 4] = ["Projector", "Whiteboard", "Audio system", "Video conference"];

/// A committed reservation. Never mutated after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub day: DayKey,
    pub span: Span,
    pub title: String,
    pub category: Category,
    pub materials: BTreeSet<String>,
    pub owner_id: String,
    pub owner_email: String,
    pub created_at: Ms,
}

/// Payload handed to the repository; it assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub day: DayKey,
    pub span: Span,
    pub title: String,
    pub category: Category,
    pub materials: BTreeSet<String>,
    pub owner_id: String,
    pub owner_email: String,
}

impl NewReservation {
    pub fn commit(self, id: Ulid, created_at: Ms) -> Reservation {
        Reservation {
            id,
            day: self.day,
            span: self.span,
            title: self.title,
            category: self.category,
            materials: self.materials,
            owner_id: self.owner_id,
            owner_email: self.owner_email,
            created_at,
        }
    }
}

/// All committed reservations of one day, sorted by `(span.start, id)`.
#[derive(Debug, Clone)]
pub struct DayState {
    pub day: DayKey,
    pub reservations: Vec<Reservation>,
}

impl DayState {
    pub fn new(day: DayKey) -> Self {
        Self {
            day,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order. Returns false if the id is already present.
    pub fn insert_reservation(&mut self, reservation: Reservation) -> bool {
        if self.reservations.iter().any(|r| r.id == reservation.id) {
            return false;
        }
        let key = (reservation.span.start, reservation.id);
        let pos = self
            .reservations
            .binary_search_by_key(&key, |r| (r.span.start, r.id))
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
        true
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose span overlaps `query`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } if reservation.day == self.day => {
                self.insert_reservation(reservation.clone());
            }
            Event::ReservationCancelled { id, day } if *day == self.day => {
                self.remove_reservation(*id);
            }
            _ => {}
        }
    }
}

/// WAL record and change-broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated { reservation: Reservation },
    ReservationCancelled { id: Ulid, day: DayKey },
}

impl Event {
    pub fn day(&self) -> &DayKey {
        match self {
            Event::ReservationCreated { reservation } => &reservation.day,
            Event::ReservationCancelled { day, .. } => day,
        }
    }
}
