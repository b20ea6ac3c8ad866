mod availability;
mod booking;
mod conflict;
mod error;
mod policy;
mod queries;
mod schedules;
mod store;

pub use availability::{Slots, compute_slots};
pub use booking::BookingRequest;
pub use conflict::{CalendarWriteGuard, ConflictGuard, SharedCalendar};
pub use error::EngineError;
pub use policy::{Action, Decision, Parties, next_status, policy};
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;

use tokio::sync::{Mutex, RwLock, RwLockReadGuard, mpsc, oneshot};
use tracing::info;

use crate::config::EngineConfig;
use crate::model::*;
use crate::observability;
use crate::ports::Ports;
use crate::wal::Wal;

use store::event_resource;

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

/// Background task that owns the WAL and batches appends for group commit.
/// Whatever appends are already queued when the first one arrives share a
/// single fsync. A non-append command ends the batch; the batch is committed
/// before the command runs.
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
        let mut trailing = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    trailing = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = trailing {
            handle_non_append(&mut wal, cmd);
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch.as_slice());
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// A failed batch leaves nothing behind: every caller gets the error, so none
/// of its events may replay.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err()
        && let Err(e) = wal.discard_unsynced()
    {
        tracing::error!("WAL rollback after failed flush also failed: {e}");
    }
    result
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
        WalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}

/// The scheduling engine: schedules, appointments and their durable log.
///
/// Every state change is made durable before it is applied. Appointment
/// writes hold their resource's calendar lock across the conflict check, the
/// WAL append and the in-memory apply.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) ports: Ports,
    /// Serializes schedule create/replace/delete.
    pub(super) schedule_writes: Mutex<()>,
    /// Writers hold this shared; compaction holds it exclusively so the
    /// snapshot it writes is not missing an acknowledged event.
    pub(super) gate: RwLock<()>,
}

impl Engine {
    /// Replay the log at `wal_path` and start the WAL writer.
    pub async fn new(wal_path: PathBuf, channel_capacity: usize, ports: Ports) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        let wal = Wal::open_after_replay(&wal_path, &replay)?;
        let (wal_tx, wal_rx) = mpsc::channel(channel_capacity.max(1));
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            ports,
            schedule_writes: Mutex::new(()),
            gate: RwLock::new(()),
        };

        for event in &replay.events {
            match event_resource(event) {
                Some(resource) => {
                    let mut cal = engine.store.calendars.lock(resource).await;
                    engine.store.apply_to_calendar(&mut cal, event);
                }
                None => engine.store.apply_schedule_event(event),
            }
        }
        info!(
            path = %wal_path.display(),
            events = replay.events.len(),
            appointments = engine.store.appointment_count(),
            "engine state recovered"
        );
        Ok(engine)
    }

    /// Open the engine under `config.data_dir`, compacting the log when it has
    /// grown past the configured threshold.
    pub async fn open(config: &EngineConfig, ports: Ports) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| EngineError::Wal(e.to_string()))?;
        let engine = Self::new(config.wal_path(), config.wal_channel_capacity, ports)
            .await
            .map_err(|e| EngineError::Wal(e.to_string()))?;
        let pending = engine.wal_appends_since_compact().await;
        if pending > config.compact_threshold {
            info!("compacting WAL: {pending} events > threshold {}", config.compact_threshold);
            engine.compact_wal().await?;
        }
        Ok(engine)
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Shared hold on the write gate. Taken before any calendar lock.
    pub(super) async fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    /// WAL-append then apply to the locked calendar.
    pub(super) async fn persist_and_apply(
        &self,
        cal: &mut ResourceCalendar,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_calendar(cal, event);
        Ok(())
    }

    /// WAL-append then apply a schedule event.
    pub(super) async fn persist_schedule(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_schedule_event(event);
        Ok(())
    }

    /// Rewrite the log as the minimal event sequence that rebuilds the
    /// current state: one `ScheduleSaved` per schedule and one
    /// `AppointmentCreated` per appointment, carrying its status and history.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.gate.write().await;

        let mut events: Vec<Event> = self
            .store
            .schedules()
            .into_iter()
            .map(|(owner, schedule)| Event::ScheduleSaved { owner, schedule })
            .collect();
        for cal in self.store.calendars.calendars() {
            let guard = cal.read().await;
            events.extend(guard.appointments.iter().map(|a| Event::AppointmentCreated {
                appointment: a.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))?;
        info!("WAL compacted to {count} events");
        Ok(())
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
