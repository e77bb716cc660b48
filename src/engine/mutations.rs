use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{booking_blocks, check_no_conflict, now_ms, validate_window, verify_assignment};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_resource(
        &self,
        id: Ulid,
        kind: ResourceKind,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        if self.resources.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("resource name too long"));
            }
        if self.resources.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ResourceCreated { id, kind, name: name.clone() };
        self.wal_append(&event).await?;
        let rs = ResourceState::new(id, kind, name);
        self.resources.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_resource(
        &self,
        id: Ulid,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("resource name too long"));
            }
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::ResourceUpdated { id, name };
        self.wal_append(&event).await?;
        self.apply_resource_event(&mut guard, &event);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Deleting a resource is refused while any flight still blocks on it.
    /// Released/non-blocking history goes with the resource.
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;
        if guard
            .bookings
            .iter()
            .any(|b| booking_blocks(b, &self.statuses))
        {
            return Err(EngineError::InUse(id));
        }

        let event = Event::ResourceDeleted { id };
        self.wal_append(&event).await?;
        self.resources.remove(&id);
        self.notify.send(id, &event);
        Ok(())
    }

    // ── Flight lifecycle ─────────────────────────────────────

    pub async fn schedule_flight(
        &self,
        id: Ulid,
        departure: Ms,
        arrival: Ms,
        status: FlightStatus,
    ) -> Result<(), EngineError> {
        let window = validate_window(departure, arrival)?;
        if self.flights.len() >= MAX_FLIGHTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many flights"));
        }
        if self.flights.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::FlightScheduled { id, window, status };
        self.wal_append(&event).await?;
        let fs = FlightState::new(id, window, status);
        self.flights.insert(id, Arc::new(RwLock::new(fs)));
        self.statuses.insert(id, status);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Status is the single lever that turns a flight's bookings on and off:
    /// cancelling a flight makes every booking it holds non-blocking without
    /// touching the bookings themselves.
    pub async fn set_flight_status(
        &self,
        id: Ulid,
        status: FlightStatus,
    ) -> Result<(), EngineError> {
        let fs = self.get_flight(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = fs.write().await;
        let event = Event::FlightStatusChanged { id, status };
        self.persist_to_flight(id, &mut guard, &event).await
    }

    /// Move a flight to a new window. Every resource the flight holds is
    /// re-validated against the new window (excluding the flight itself)
    /// under write locks taken in sorted id order; all bookings move or
    /// none do.
    pub async fn reschedule_flight(
        &self,
        id: Ulid,
        departure: Ms,
        arrival: Ms,
    ) -> Result<(), EngineError> {
        let window = validate_window(departure, arrival)?;

        let mut held: Vec<Ulid> = self
            .flight_resources
            .get(&id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        held.sort();
        held.dedup();

        let mut guards = Vec::with_capacity(held.len());
        for rid in &held {
            if let Some(rs) = self.get_resource(rid) {
                guards.push(rs.write_owned().await);
            }
        }

        let fs = self.get_flight(&id).ok_or(EngineError::NotFound(id))?;
        let mut fguard = fs.write().await;

        for guard in &guards {
            let holds_active = guard.booking_for(id).is_some_and(|b| !b.released);
            if holds_active {
                check_no_conflict(guard, &window, Some(id), &self.statuses)?;
            }
        }

        let event = Event::FlightRescheduled { id, window };
        self.wal_append(&event).await?;
        fguard.window = window;
        for guard in guards.iter_mut() {
            if guard.reschedule_booking(id, window) {
                self.notify.send(guard.id, &event);
            }
        }
        self.notify.send(id, &event);
        Ok(())
    }

    /// Delete a flight: all its bookings are released (kept as history on
    /// their resources), the flight and its reservations disappear.
    pub async fn remove_flight(&self, id: Ulid) -> Result<(), EngineError> {
        let mut held: Vec<Ulid> = self
            .flight_resources
            .get(&id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        held.sort();
        held.dedup();

        let mut guards = Vec::with_capacity(held.len());
        for rid in &held {
            if let Some(rs) = self.get_resource(rid) {
                guards.push(rs.write_owned().await);
            }
        }

        let fs = self.get_flight(&id).ok_or(EngineError::NotFound(id))?;
        let fguard = fs.write().await;

        let event = Event::FlightRemoved { id };
        self.wal_append(&event).await?;
        self.flight_resources.remove(&id);
        for guard in guards.iter_mut() {
            if guard.release_booking(id) {
                self.notify.send(guard.id, &event);
            }
        }
        self.unindex_flight(&fguard);
        self.notify.send(id, &event);
        Ok(())
    }

    // ── Scheduling core ──────────────────────────────────────

    /// Assign a specific resource to a flight for the candidate window.
    ///
    /// The conflict re-check and the booking write happen under the
    /// resource's write lock, held across the WAL append: of two racing
    /// assigns for overlapping windows exactly one commits, the other gets
    /// `Conflict`. The flight's own booking is excluded so updating an
    /// existing assignment is allowed.
    pub async fn assign(
        &self,
        kind: ResourceKind,
        resource_id: Ulid,
        flight_id: Ulid,
        departure: Ms,
        arrival: Ms,
    ) -> Result<BookingInfo, EngineError> {
        let window = validate_window(departure, arrival)?;
        if !self.flights.contains_key(&flight_id) {
            return Err(EngineError::NotFound(flight_id));
        }
        let mut guard = self.resolve_resource_write(resource_id, kind).await?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }

        if let Err(e) = check_no_conflict(&guard, &window, Some(flight_id), &self.statuses) {
            metrics::counter!(crate::observability::SCHEDULING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::ResourceAssigned { resource_id, flight_id, window };
        self.persist_to_resource(resource_id, &mut guard, &event).await?;

        if let Some(other) = verify_assignment(&guard, flight_id, &self.statuses) {
            // Concurrency-control bug if ever hit. Surface loudly, never
            // auto-cancel a committed booking.
            tracing::error!(
                resource = %resource_id,
                flight = %flight_id,
                conflicting = %other,
                "double-booking invariant violated after commit"
            );
            metrics::counter!(crate::observability::INVARIANT_VIOLATIONS_TOTAL).increment(1);
        }

        Ok(BookingInfo {
            resource_id,
            flight_id,
            start: window.start,
            end: window.end,
            released: false,
        })
    }

    /// Release a flight's hold on a resource. Idempotent: a missing or
    /// already-released booking is a no-op, not an error.
    pub async fn release(
        &self,
        kind: ResourceKind,
        resource_id: Ulid,
        flight_id: Ulid,
    ) -> Result<(), EngineError> {
        let mut guard = self.resolve_resource_write(resource_id, kind).await?;
        let active = guard.booking_for(flight_id).is_some_and(|b| !b.released);
        if !active {
            return Ok(());
        }
        let event = Event::ResourceReleased { resource_id, flight_id };
        self.persist_to_resource(resource_id, &mut guard, &event).await
    }

    /// Move a flight's booking from one resource to another of the same
    /// kind. The new resource is validated first; on conflict the old
    /// booking is left untouched.
    pub async fn reassign(
        &self,
        kind: ResourceKind,
        flight_id: Ulid,
        old_resource_id: Ulid,
        new_resource_id: Ulid,
        departure: Ms,
        arrival: Ms,
    ) -> Result<BookingInfo, EngineError> {
        if old_resource_id == new_resource_id {
            return self
                .assign(kind, new_resource_id, flight_id, departure, arrival)
                .await;
        }
        let window = validate_window(departure, arrival)?;
        if !self.flights.contains_key(&flight_id) {
            return Err(EngineError::NotFound(flight_id));
        }

        // Write locks in sorted id order to prevent deadlocks.
        let (mut first, mut second) = if old_resource_id < new_resource_id {
            let a = self.resolve_resource_write(old_resource_id, kind).await?;
            let b = self.resolve_resource_write(new_resource_id, kind).await?;
            (a, b)
        } else {
            let b = self.resolve_resource_write(new_resource_id, kind).await?;
            let a = self.resolve_resource_write(old_resource_id, kind).await?;
            (b, a)
        };
        let (old_guard, new_guard) = if old_resource_id < new_resource_id {
            (&mut first, &mut second)
        } else {
            (&mut second, &mut first)
        };

        if new_guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        if let Err(e) = check_no_conflict(new_guard, &window, Some(flight_id), &self.statuses) {
            metrics::counter!(crate::observability::SCHEDULING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let assign_event = Event::ResourceAssigned {
            resource_id: new_resource_id,
            flight_id,
            window,
        };
        self.persist_to_resource(new_resource_id, new_guard, &assign_event)
            .await?;

        let release_event = Event::ResourceReleased {
            resource_id: old_resource_id,
            flight_id,
        };
        if old_guard.booking_for(flight_id).is_some_and(|b| !b.released) {
            self.persist_to_resource(old_resource_id, old_guard, &release_event)
                .await?;
        }

        Ok(BookingInfo {
            resource_id: new_resource_id,
            flight_id,
            start: window.start,
            end: window.end,
            released: false,
        })
    }

    // ── Seats ────────────────────────────────────────────────

    /// Reserve a seat on a flight. The implicit resource is
    /// `(flight_id, seat)`: the check for an existing active holder and the
    /// write happen under the flight's write lock.
    pub async fn reserve_seat(
        &self,
        id: Ulid,
        flight_id: Ulid,
        seat: String,
        passenger_id: Ulid,
    ) -> Result<ReservationInfo, EngineError> {
        if seat.is_empty() || seat.len() > MAX_SEAT_LEN {
            return Err(EngineError::LimitExceeded("bad seat label"));
        }
        let fs = self
            .get_flight(&flight_id)
            .ok_or(EngineError::NotFound(flight_id))?;
        let mut guard = fs.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_FLIGHT {
            return Err(EngineError::LimitExceeded("too many reservations on flight"));
        }
        if self.reservation_flights.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.active_reservation(&seat).is_some() {
            return Err(EngineError::SeatTaken { flight_id, seat });
        }

        let event = Event::SeatReserved {
            id,
            flight_id,
            seat: seat.clone(),
            passenger_id,
        };
        self.persist_to_flight(flight_id, &mut guard, &event).await?;

        Ok(ReservationInfo {
            id,
            flight_id,
            seat,
            passenger_id,
            cancelled: false,
        })
    }

    /// Cancel a seat reservation; the seat becomes available again.
    /// Idempotent like `release`: unknown or already-cancelled ids are
    /// no-ops.
    pub async fn cancel_seat(&self, id: Ulid) -> Result<(), EngineError> {
        let Some(flight_id) = self.reservation_flights.get(&id).map(|e| *e.value()) else {
            return Ok(());
        };
        let Some(fs) = self.get_flight(&flight_id) else {
            return Ok(());
        };
        let mut guard = fs.write().await;
        let active = guard
            .reservations
            .iter()
            .any(|r| r.id == id && !r.cancelled);
        if !active {
            return Ok(());
        }
        let event = Event::SeatCancelled { id, flight_id };
        self.persist_to_flight(flight_id, &mut guard, &event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Released bookings, cancelled
    /// reservations, and non-blocking flights whose windows ended more than
    /// `retention_ms` ago are dropped — that is where "history preserved"
    /// finally ends.
    pub async fn compact_wal(&self, retention_ms: Ms) -> Result<(), EngineError> {
        let cutoff = now_ms() - retention_ms;
        let mut events = Vec::new();

        let resource_ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        let flight_ids: Vec<Ulid> = self.flights.iter().map(|e| *e.key()).collect();

        // Which flights survive compaction.
        let mut kept_flights = std::collections::HashSet::new();
        for fid in &flight_ids {
            let Some(fs) = self.get_flight(fid) else { continue };
            let guard = fs.read().await;
            if guard.status.is_blocking() || guard.window.end >= cutoff {
                kept_flights.insert(*fid);
                events.push(Event::FlightScheduled {
                    id: guard.id,
                    window: guard.window,
                    status: guard.status,
                });
                for r in &guard.reservations {
                    if r.cancelled && guard.window.end < cutoff {
                        continue;
                    }
                    events.push(Event::SeatReserved {
                        id: r.id,
                        flight_id: guard.id,
                        seat: r.seat.clone(),
                        passenger_id: r.passenger_id,
                    });
                    if r.cancelled {
                        events.push(Event::SeatCancelled {
                            id: r.id,
                            flight_id: guard.id,
                        });
                    }
                }
            }
        }

        for rid in &resource_ids {
            let Some(rs) = self.get_resource(rid) else { continue };
            let guard = rs.read().await;
            events.push(Event::ResourceCreated {
                id: guard.id,
                kind: guard.kind,
                name: guard.name.clone(),
            });
            for b in &guard.bookings {
                if !kept_flights.contains(&b.flight_id) {
                    continue;
                }
                if b.released && b.window.end < cutoff {
                    continue;
                }
                events.push(Event::ResourceAssigned {
                    resource_id: guard.id,
                    flight_id: b.flight_id,
                    window: b.window,
                });
                if b.released {
                    events.push(Event::ResourceReleased {
                        resource_id: guard.id,
                        flight_id: b.flight_id,
                    });
                }
            }
        }

        // Flights must replay before the bookings that reference them.
        events.sort_by_key(|e| match e {
            Event::FlightScheduled { .. } => 0,
            Event::SeatReserved { .. } | Event::SeatCancelled { .. } => 1,
            Event::ResourceCreated { .. } => 2,
            _ => 3,
        });

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
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
