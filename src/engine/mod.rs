mod mutations;
mod queries;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{
    broadcast, mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};
use tracing::warn;
use ulid::Ulid;

use crate::collab::ReservationRepository;
use crate::error::StoreError;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is running are
/// committed together with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a half-written batch doesn't leak
    // into the next one.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// WAL-backed, in-process reservation repository.
pub struct Engine {
    pub(super) days: DashMap<DayKey, SharedDayState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → day.
    pub(super) reservation_day: Arc<DashMap<Ulid, DayKey>>,
    /// Commits hold it shared (taken before any day lock); compaction holds
    /// it exclusively so no commit lands between snapshot and swap.
    pub(super) commit_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Replay the journal at `wal_path` and start its writer task.
    /// Must be called inside a Tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_tail {
            warn!(
                "{}: ignored damaged records after {} events",
                wal_path.display(),
                replay.events.len()
            );
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            days: DashMap::new(),
            wal_tx,
            notify,
            reservation_day: Arc::new(DashMap::new()),
            commit_gate: Arc::new(RwLock::new(())),
        };

        // Sole owner of every lock here, so try_write never contends.
        for event in &replay.events {
            let state = engine.day_state(event.day());
            if let Ok(mut guard) = state.try_write() {
                apply(&engine.reservation_day, &mut guard, event);
            }
        }

        Ok(engine)
    }

    /// Get or create the state for a day.
    pub(super) fn day_state(&self, day: &DayKey) -> SharedDayState {
        if let Some(state) = self.days.get(day) {
            return state.value().clone();
        }
        self.days
            .entry(day.clone())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(day.clone()))))
            .value()
            .clone()
    }

    /// WAL-append, apply, then broadcast, on a task of its own. Once the
    /// locks are handed over the commit finishes even if the caller is
    /// dropped.
    pub(super) async fn commit(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut ds: OwnedRwLockWriteGuard<DayState>,
        event: Event,
    ) -> Result<(), StoreError> {
        let wal_tx = self.wal_tx.clone();
        let reservation_day = self.reservation_day.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            let _gate = gate;
            wal_append(&wal_tx, &event).await?;
            apply(&reservation_day, &mut ds, &event);
            notify.send(&event);
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("commit task failed: {e}")))?
    }
}

fn apply(reservation_day: &DashMap<Ulid, DayKey>, ds: &mut DayState, event: &Event) {
    match event {
        Event::ReservationCreated { reservation } => {
            reservation_day.insert(reservation.id, reservation.day.clone());
        }
        Event::ReservationCancelled { id, .. } => {
            reservation_day.remove(id);
        }
    }
    ds.apply_event(event);
}

async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), StoreError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| StoreError::WalError(e.to_string()))
}

#[async_trait]
impl ReservationRepository for Engine {
    fn watch(&self, day: &DayKey) -> broadcast::Receiver<Event> {
        self.notify.subscribe(day)
    }

    async fn fetch_day(&self, day: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.day_reservations(day).await)
    }

    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        self.insert_reservation(new).await
    }

    async fn cancel(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.cancel_reservation(id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations_for_owner(owner_id).await)
    }
}
