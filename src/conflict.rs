use serde::Serialize;
use tokio::time::Instant;
use ulid::Ulid;

use crate::model::*;

/// Client-local marker for a reservation written but not yet echoed back
/// through the live subscription.
#[derive(Debug, Clone)]
pub struct PendingReservation {
    pub token: Ulid,
    pub payload: NewReservation,
    pub placed_at: Instant,
}

impl PendingReservation {
    pub fn new(payload: NewReservation) -> Self {
        Self {
            token: Ulid::new(),
            payload,
            placed_at: Instant::now(),
        }
    }

    /// True if `r` is the committed form of this payload.
    pub fn matches(&self, r: &Reservation) -> bool {
        r.day == self.payload.day
            && r.span == self.payload.span
            && r.owner_id == self.payload.owner_id
            && r.title == self.payload.title
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub conflicting: Option<Reservation>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            conflicting: None,
        }
    }

    pub fn message(&self) -> String {
        match &self.conflicting {
            Some(r) => conflict_message(r),
            None => String::new(),
        }
    }
}

pub fn conflict_message(r: &Reservation) -> String {
    format!("Schedule conflict with \"{}\" ({})", r.title, r.span)
}

/// Check `candidate` against a day's reservations.
///
/// Reservations are scanned in the order given and the first overlap is
/// reported, so callers pass them sorted by start. `ignore_id` and any
/// reservation matching `pending_self` are skipped.
pub fn check(
    candidate: &Span,
    day_reservations: &[Reservation],
    ignore_id: Option<Ulid>,
    pending_self: Option<&PendingReservation>,
) -> Validation {
    let hit = day_reservations
        .iter()
        .filter(|r| Some(r.id) != ignore_id)
        .filter(|r| !pending_self.is_some_and(|p| p.matches(r)))
        .find(|r| candidate.start < r.span.end && candidate.end > r.span.start);

    match hit {
        Some(r) => Validation {
            valid: false,
            conflicting: Some(r.clone()),
        },
        None => Validation::ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::model::fixtures::*;

    const DAY: &str = "2026-10-19";

    #[test]
    fn touching_boundary_is_free() {
        let day = vec![reservation(DAY, "09:00", "10:00", "Team Sync")];
        let v = check(&span("08:30", "09:00"), &day, None, None);
        assert!(v.valid);
        assert!(v.conflicting.is_none());
        assert!(check(&span("10:00", "11:00"), &day, None, None).valid);
    }

    #[test]
    fn overlap_names_the_reservation() {
        let day = vec![reservation(DAY, "09:00", "10:00", "Team Sync")];
        let v = check(&span("09:30", "10:30"), &day, None, None);
        assert!(!v.valid);
        assert_eq!(v.conflicting.as_ref().unwrap().title, "Team Sync");
        assert_eq!(v.message(), "Schedule conflict with \"Team Sync\" (09:00-10:00)");
    }

    #[test]
    fn enclosing_candidate_conflicts() {
        let day = vec![reservation(DAY, "10:00", "10:30", "Short")];
        assert!(!check(&span("09:00", "12:00"), &day, None, None).valid);
    }

    #[test]
    fn first_conflict_in_input_order_wins() {
        let day = vec![
            reservation(DAY, "09:00", "10:00", "First"),
            reservation(DAY, "10:00", "11:00", "Second"),
        ];
        let v = check(&span("09:30", "10:30"), &day, None, None);
        assert_eq!(v.conflicting.unwrap().title, "First");
    }

    #[test]
    fn ignore_id_skips_reservation() {
        let r = reservation(DAY, "09:00", "10:00", "Mine");
        let id = r.id;
        let day = vec![r];
        assert!(check(&span("09:00", "10:00"), &day, Some(id), None).valid);
    }

    #[test]
    fn pending_self_is_not_a_conflict() {
        let payload = new_reservation(DAY, "14:00", "15:00", "Planning");
        let pending = PendingReservation::new(payload.clone());
        let echoed = payload.commit(Ulid::new(), 1);
        let day = vec![echoed];
        assert!(check(&span("14:00", "15:00"), &day, None, Some(&pending)).valid);
        assert!(!check(&span("14:00", "15:00"), &day, None, None).valid);
    }

    #[test]
    fn pending_from_other_owner_still_conflicts() {
        let payload = new_reservation(DAY, "14:00", "15:00", "Planning");
        let pending = PendingReservation::new(payload.clone());
        let mut theirs = payload.commit(Ulid::new(), 1);
        theirs.owner_id = "someone-else".into();
        assert!(!check(&span("14:00", "15:00"), &[theirs], None, Some(&pending)).valid);
    }

    #[test]
    fn valid_candidates_preserve_disjointness() {
        let grid = catalog::generate();
        let ends: Vec<_> = grid
            .iter()
            .skip(1)
            .copied()
            .chain([catalog::CLOSING])
            .collect();
        let day = vec![
            reservation(DAY, "09:00", "10:30", "a"),
            reservation(DAY, "13:00", "13:30", "b"),
            reservation(DAY, "18:00", "21:00", "c"),
        ];
        for &s in &grid {
            for &e in ends.iter().filter(|e| **e > s) {
                let candidate = Span::new(s, e);
                if check(&candidate, &day, None, None).valid {
                    assert!(day.iter().all(|r| !r.span.overlaps(&candidate)), "{candidate}");
                }
            }
        }
    }
}
