use crate::model::*;

use super::Engine;

impl Engine {
    /// Current reservations of a day, sorted by start. Unknown days are empty.
    pub async fn day_reservations(&self, day: &DayKey) -> Vec<Reservation> {
        let Some(state) = self.days.get(day).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        let guard = state.read().await;
        guard.reservations.clone()
    }

    /// Every reservation owned by `owner_id`, sorted by day then start.
    pub async fn reservations_for_owner(&self, owner_id: &str) -> Vec<Reservation> {
        let days: Vec<_> = self.days.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for state in days {
            let guard = state.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.owner_id == owner_id)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| (&a.day, a.span.start).cmp(&(&b.day, b.span.start)));
        out
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_day.len()
    }
}
