mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use conflict::conflicts;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;
pub type SharedFlightState = Arc<RwLock<FlightState>>;

/// Lock-free snapshot of every flight's current status. Conflict checks read
/// this while holding a resource write lock, so no resource→flight lock
/// nesting exists anywhere in the engine.
pub type StatusIndex = DashMap<Ulid, FlightStatus>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub resources: DashMap<Ulid, SharedResourceState>,
    pub flights: DashMap<Ulid, SharedFlightState>,
    /// Flight id → current status, maintained alongside `flights`.
    pub(super) statuses: StatusIndex,
    /// Flight id → resources on which it holds (or held) a booking.
    pub(super) flight_resources: DashMap<Ulid, Vec<Ulid>>,
    /// Seat reservation id → owning flight.
    pub(super) reservation_flights: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            resources: DashMap::new(),
            flights: DashMap::new(),
            statuses: DashMap::new(),
            flight_resources: DashMap::new(),
            reservation_flights: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context (e.g. lazy tenant creation).
        for event in &events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::ResourceCreated { id, kind, name } => {
                let rs = ResourceState::new(*id, *kind, name.clone());
                self.resources.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::ResourceDeleted { id } => {
                self.resources.remove(id);
            }
            Event::FlightScheduled { id, window, status } => {
                let fs = FlightState::new(*id, *window, *status);
                self.flights.insert(*id, Arc::new(RwLock::new(fs)));
                self.statuses.insert(*id, *status);
            }
            Event::FlightRemoved { id } => {
                self.detach_flight_replay(*id);
            }
            Event::FlightRescheduled { id, window } => {
                if let Some(entry) = self.flights.get(id) {
                    let fs = entry.value().clone();
                    fs.try_write().expect("replay: uncontended write").window = *window;
                }
                if let Some(rids) = self.flight_resources.get(id) {
                    for rid in rids.value() {
                        if let Some(entry) = self.resources.get(rid) {
                            let rs = entry.value().clone();
                            rs.try_write()
                                .expect("replay: uncontended write")
                                .reschedule_booking(*id, *window);
                        }
                    }
                }
            }
            Event::ResourceAssigned { resource_id, .. } | Event::ResourceReleased { resource_id, .. } => {
                if let Some(entry) = self.resources.get(resource_id) {
                    let rs = entry.value().clone();
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    self.apply_resource_event(&mut guard, event);
                }
            }
            Event::FlightStatusChanged { id, .. }
            | Event::SeatReserved { flight_id: id, .. }
            | Event::SeatCancelled { flight_id: id, .. } => {
                if let Some(entry) = self.flights.get(id) {
                    let fs = entry.value().clone();
                    let mut guard = fs.try_write().expect("replay: uncontended write");
                    self.apply_flight_event(&mut guard, event);
                }
            }
            Event::ResourceUpdated { id, .. } => {
                if let Some(entry) = self.resources.get(id) {
                    let rs = entry.value().clone();
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    self.apply_resource_event(&mut guard, event);
                }
            }
        }
    }

    /// Apply a resource-scoped event (no locking — caller holds the lock).
    pub(super) fn apply_resource_event(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::ResourceUpdated { name, .. } => {
                rs.name = name.clone();
            }
            Event::ResourceAssigned {
                resource_id,
                flight_id,
                window,
            } => {
                rs.put_booking(*flight_id, *window);
                let mut held = self.flight_resources.entry(*flight_id).or_default();
                if !held.contains(resource_id) {
                    held.push(*resource_id);
                }
            }
            Event::ResourceReleased { flight_id, .. } => {
                rs.release_booking(*flight_id);
            }
            _ => unreachable!("not a resource event"),
        }
    }

    /// Apply a flight-scoped event (no locking — caller holds the lock).
    pub(super) fn apply_flight_event(&self, fs: &mut FlightState, event: &Event) {
        match event {
            Event::FlightStatusChanged { id, status } => {
                fs.status = *status;
                self.statuses.insert(*id, *status);
            }
            Event::SeatReserved {
                id,
                flight_id,
                seat,
                passenger_id,
            } => {
                // Re-reserving a cancelled seat reuses the reservation id path:
                // a fresh id is always minted by the caller, so push is safe.
                fs.reservations.push(SeatReservation {
                    id: *id,
                    seat: seat.clone(),
                    passenger_id: *passenger_id,
                    cancelled: false,
                });
                self.reservation_flights.insert(*id, *flight_id);
            }
            Event::SeatCancelled { id, .. } => {
                if let Some(r) = fs.reservation_mut(*id) {
                    r.cancelled = true;
                }
            }
            _ => unreachable!("not a flight event"),
        }
    }

    /// Replay-only: release every booking the flight holds, then drop the
    /// flight and its reservation index entries. Runtime removal goes
    /// through `remove_flight`, which must await contended locks.
    fn detach_flight_replay(&self, flight_id: Ulid) {
        if let Some((_, rids)) = self.flight_resources.remove(&flight_id) {
            for rid in rids {
                if let Some(rs) = self.get_resource(&rid) {
                    rs.try_write()
                        .expect("replay: uncontended write")
                        .release_booking(flight_id);
                }
            }
        }
        if let Some(fs) = self.get_flight(&flight_id) {
            let guard = fs.try_read().expect("replay: uncontended read");
            self.unindex_flight(&guard);
        }
    }

    /// Remove the flight from every registry. The caller holds the flight's
    /// lock and has already released its bookings.
    pub(super) fn unindex_flight(&self, fs: &FlightState) {
        for r in &fs.reservations {
            self.reservation_flights.remove(&r.id);
        }
        self.statuses.remove(&fs.id);
        self.flights.remove(&fs.id);
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn get_flight(&self, id: &Ulid) -> Option<SharedFlightState> {
        self.flights.get(id).map(|e| e.value().clone())
    }

    pub fn flight_status(&self, id: &Ulid) -> Option<FlightStatus> {
        self.statuses.get(id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call, for resource-scoped events.
    pub(super) async fn persist_to_resource(
        &self,
        resource_id: Ulid,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_resource_event(rs, event);
        self.notify.send(resource_id, event);
        Ok(())
    }

    /// WAL-append + apply + notify in one call, for flight-scoped events.
    pub(super) async fn persist_to_flight(
        &self,
        flight_id: Ulid,
        fs: &mut FlightState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_flight_event(fs, event);
        self.notify.send(flight_id, event);
        Ok(())
    }

    /// Resolve a resource of the expected kind and take its write lock.
    pub(super) async fn resolve_resource_write(
        &self,
        id: Ulid,
        kind: ResourceKind,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write_owned().await;
        if guard.kind != kind {
            return Err(EngineError::KindMismatch(id));
        }
        Ok(guard)
    }
}
