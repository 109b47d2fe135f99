use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{SlotTime, Span};

/// First bookable slot.
pub const OPENING: SlotTime = SlotTime::hm(8, 0);
/// Start of the last bookable slot.
pub const LAST_SLOT: SlotTime = SlotTime::hm(22, 0);
/// Closing boundary: a valid end time, never a start.
pub const CLOSING: SlotTime = SlotTime::hm(22, 30);
pub const STEP_MINUTES: u16 = 30;

// ── Slot catalog ─────────────────────────────────────────────────

/// The day's bookable grid: 08:00 through 22:00 every 30 minutes (29 labels).
pub fn generate() -> Vec<SlotTime> {
    (OPENING.minutes()..=LAST_SLOT.minutes())
        .step_by(STEP_MINUTES as usize)
        .map(SlotTime::from_minutes)
        .collect()
}

fn on_grid(t: SlotTime) -> bool {
    t.minutes() % STEP_MINUTES == 0
}

pub fn is_start_slot(t: SlotTime) -> bool {
    on_grid(t) && OPENING <= t && t <= LAST_SLOT
}

/// Any grid label after opening, up to and including the closing boundary.
pub fn is_end_boundary(t: SlotTime) -> bool {
    on_grid(t) && OPENING < t && t <= CLOSING
}

// ── Duration suggester ───────────────────────────────────────────

/// Quick-pick durations offered once a start time is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DurationLabel {
    HalfHour,
    OneHour,
    HourAndHalf,
    TwoHours,
    ThreeHours,
}

impl DurationLabel {
    pub const ALL: [DurationLabel; 5] = [
        DurationLabel::HalfHour,
        DurationLabel::OneHour,
        DurationLabel::HourAndHalf,
        DurationLabel::TwoHours,
        DurationLabel::ThreeHours,
    ];

    pub fn minutes(self) -> u16 {
        match self {
            DurationLabel::HalfHour => 30,
            DurationLabel::OneHour => 60,
            DurationLabel::HourAndHalf => 90,
            DurationLabel::TwoHours => 120,
            DurationLabel::ThreeHours => 180,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DurationLabel::HalfHour => "30min",
            DurationLabel::OneHour => "1h",
            DurationLabel::HourAndHalf => "1h 30min",
            DurationLabel::TwoHours => "2h",
            DurationLabel::ThreeHours => "3h",
        }
    }
}

impl fmt::Display for DurationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDuration(pub String);

impl fmt::Display for UnknownDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown duration {:?}", self.0)
    }
}

impl std::error::Error for UnknownDuration {}

impl FromStr for DurationLabel {
    type Err = UnknownDuration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.label() == s.trim())
            .ok_or_else(|| UnknownDuration(s.to_string()))
    }
}

impl TryFrom<String> for DurationLabel {
    type Error = UnknownDuration;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DurationLabel> for String {
    fn from(value: DurationLabel) -> Self {
        value.label().to_string()
    }
}

/// End time for `start + duration`, clamped to the closing boundary.
pub fn suggest_end(start: SlotTime, duration: DurationLabel) -> SlotTime {
    let end = start.minutes().saturating_add(duration.minutes());
    if end > CLOSING.minutes() {
        CLOSING
    } else {
        SlotTime::from_minutes(end)
    }
}

/// Auto-fill used when a start is picked and no end has been chosen yet.
pub fn suggest_default_end(start: SlotTime) -> SlotTime {
    suggest_end(start, DurationLabel::OneHour)
}

/// Human-readable length of a span: `"45 min"`, `"2 h"`, `"1 h 30 min"`.
pub fn format_duration(span: &Span) -> String {
    let total = span.duration_minutes();
    let (hours, minutes) = (total / 60, total % 60);
    match (hours, minutes) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    }
}
