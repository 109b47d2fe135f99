use serde::Serialize;

use crate::catalog;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub label: SlotTime,
    pub is_free: bool,
}

/// Mark each grid slot free unless a reservation covers it (`start <= t < end`).
pub fn available_slots(reservations: &[Reservation]) -> Vec<SlotAvailability> {
    catalog::generate()
        .into_iter()
        .map(|label| SlotAvailability {
            label,
            is_free: !reservations.iter().any(|r| r.span.contains(label)),
        })
        .collect()
}

/// Merge sorted spans into disjoint occupied blocks.
pub fn occupied_blocks(reservations: &[Reservation]) -> Vec<Span> {
    let mut spans: Vec<Span> = reservations.iter().map(|r| r.span).collect();
    spans.sort_by_key(|s| s.start);
    let mut merged: Vec<Span> = Vec::new();
    for span in spans {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}
