use tokio::sync::oneshot;
use tracing::warn;
use ulid::Ulid;

use crate::error::StoreError;
use crate::limits::*;
use crate::model::*;

use super::{Engine, WalCommand};

impl Engine {
    /// Commit a reservation. Overlap is not rejected here: the repository is
    /// not transactional. An overlap that slips through is logged and counted
    /// so an administrator can cancel one side.
    pub async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        if new.span.start >= new.span.end {
            return Err(StoreError::LimitExceeded("empty or inverted span"));
        }
        let gate = self.commit_gate.clone().read_owned().await;
        let guard = self.day_state(&new.day).write_owned().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_DAY {
            return Err(StoreError::LimitExceeded("too many reservations on day"));
        }

        let reservation = new.commit(Ulid::new(), now_ms());
        if let Some(existing) = guard.overlapping(&reservation.span).next() {
            warn!(
                "double booking on {}: {} ({}) overlaps {} ({})",
                reservation.day, reservation.id, reservation.span, existing.id, existing.span
            );
            metrics::counter!(crate::observability::DOUBLE_BOOKINGS_TOTAL).increment(1);
        }

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.commit(gate, guard, event).await?;
        Ok(reservation)
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        let day = self
            .reservation_day
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        let gate = self.commit_gate.clone().read_owned().await;
        let guard = self.day_state(&day).write_owned().await;
        let reservation = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        let event = Event::ReservationCancelled { id, day };
        self.commit(gate, guard, event).await?;
        Ok(reservation)
    }

    /// Rewrite the WAL as one `ReservationCreated` per live reservation.
    /// Commits wait on the gate until the rewrite is done.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;
        let days: Vec<_> = self.days.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for state in days {
            let guard = state.read().await;
            events.extend(guard.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
