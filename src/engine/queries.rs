use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::{check_no_conflict, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// All resources of `kind` with no blocking booking conflicting with the
    /// candidate window. `exclude_flight` keeps a flight's own current
    /// booking out of the check so its held resource still shows as
    /// available when re-evaluating that flight.
    ///
    /// The result is advisory: another assign can commit the moment this
    /// returns, so callers must still treat `assign` as authoritative.
    /// Order follows store iteration and is unspecified.
    pub async fn query_available(
        &self,
        kind: ResourceKind,
        start: Ms,
        end: Ms,
        exclude_flight: Option<Ulid>,
    ) -> Result<Vec<ResourceInfo>, EngineError> {
        let window = validate_window(start, end)?;

        let candidates: Vec<_> = self
            .resources
            .iter()
            .map(|e| e.value().clone())
            .collect();

        let mut available = Vec::new();
        for rs in candidates {
            let guard = rs.read().await;
            if guard.kind != kind {
                continue;
            }
            if check_no_conflict(&guard, &window, exclude_flight, &self.statuses).is_ok() {
                available.push(ResourceInfo {
                    id: guard.id,
                    kind: guard.kind,
                    name: guard.name.clone(),
                });
            }
        }
        Ok(available)
    }

    /// The sub-windows of `[start, end)` in which the resource has no
    /// blocking booking.
    pub async fn resource_free_windows(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        if end.saturating_sub(start) > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        if start >= end {
            return Err(EngineError::InvalidWindow { start, end });
        }
        let rs = match self.get_resource(&resource_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        let query = TimeWindow::new(start, end);
        Ok(free_windows(&guard, &query, &self.statuses))
    }

    pub async fn list_resources(&self, kind: Option<ResourceKind>) -> Vec<ResourceInfo> {
        let candidates: Vec<_> = self
            .resources
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut out = Vec::with_capacity(candidates.len());
        for rs in candidates {
            let guard = rs.read().await;
            if kind.is_some_and(|k| guard.kind != k) {
                continue;
            }
            out.push(ResourceInfo {
                id: guard.id,
                kind: guard.kind,
                name: guard.name.clone(),
            });
        }
        out
    }

    pub async fn list_flights(&self) -> Vec<FlightInfo> {
        let candidates: Vec<_> = self.flights.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(candidates.len());
        for fs in candidates {
            let guard = fs.read().await;
            out.push(FlightInfo {
                id: guard.id,
                departure: guard.window.start,
                arrival: guard.window.end,
                status: guard.status,
            });
        }
        out
    }

    pub async fn resource_kind(&self, id: Ulid) -> Option<ResourceKind> {
        let rs = self.get_resource(&id)?;
        let guard = rs.read().await;
        Some(guard.kind)
    }

    pub async fn get_flight_info(&self, id: Ulid) -> Option<FlightInfo> {
        let fs = self.get_flight(&id)?;
        let guard = fs.read().await;
        Some(FlightInfo {
            id: guard.id,
            departure: guard.window.start,
            arrival: guard.window.end,
            status: guard.status,
        })
    }

    /// All bookings on a resource, released history included.
    pub async fn get_assignments(&self, resource_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = match self.get_resource(&resource_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                resource_id,
                flight_id: b.flight_id,
                start: b.window.start,
                end: b.window.end,
                released: b.released,
            })
            .collect())
    }

    /// All seat reservations on a flight, cancelled ones included.
    pub async fn get_reservations(&self, flight_id: Ulid) -> Result<Vec<ReservationInfo>, EngineError> {
        let fs = match self.get_flight(&flight_id) {
            Some(fs) => fs,
            None => return Ok(vec![]),
        };
        let guard = fs.read().await;
        Ok(guard
            .reservations
            .iter()
            .map(|r| ReservationInfo {
                id: r.id,
                flight_id,
                seat: r.seat.clone(),
                passenger_id: r.passenger_id,
                cancelled: r.cancelled,
            })
            .collect())
    }
}
