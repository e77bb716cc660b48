use ulid::Ulid;

use crate::model::*;

use super::{EngineError, StatusIndex};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate raw bounds into a `TimeWindow`. All engine entry points go
/// through here, so `TimeWindow::new`'s `start < end` invariant holds
/// everywhere downstream.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<TimeWindow, EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidWindow { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_WINDOW_DURATION_MS {
        return Err(EngineError::LimitExceeded("window too wide"));
    }
    Ok(TimeWindow::new(start, end))
}

/// Per-kind conflict rule between two booking windows.
///
/// Gates and airplanes are occupied for the flight's whole ground window:
/// strict half-open intersection, touching endpoints do not conflict. A
/// runway is only occupied around the departure instant: two departures
/// conflict when they are within `RUNWAY_SPACING_MS` of each other,
/// boundary inclusive.
pub fn conflicts(kind: ResourceKind, existing: &TimeWindow, candidate: &TimeWindow) -> bool {
    match kind {
        ResourceKind::Gate | ResourceKind::Airplane => existing.overlaps(candidate),
        ResourceKind::Runway => (existing.start - candidate.start).abs() <= RUNWAY_SPACING_MS,
    }
}

/// The window to scan for potential conflicts. For runways the probe is
/// widened around the candidate's departure so the sorted-scan prune in
/// `ResourceState::overlapping` still catches every departure within
/// spacing; the precise predicate decides from there.
fn probe_window(kind: ResourceKind, candidate: &TimeWindow) -> TimeWindow {
    match kind {
        ResourceKind::Gate | ResourceKind::Airplane => *candidate,
        ResourceKind::Runway => TimeWindow::new(
            candidate.start - RUNWAY_SPACING_MS,
            candidate.start + RUNWAY_SPACING_MS + 1,
        ),
    }
}

/// Whether a booking currently blocks: not released, and its flight's
/// status is in the blocking set. A booking whose flight is unknown to the
/// status index never blocks (its flight was removed).
pub(crate) fn booking_blocks(booking: &Booking, statuses: &StatusIndex) -> bool {
    if booking.released {
        return false;
    }
    statuses
        .get(&booking.flight_id)
        .is_some_and(|s| s.is_blocking())
}

/// The check half of check-then-write. Callers hold the resource's write
/// lock across this and the subsequent apply.
pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    candidate: &TimeWindow,
    exclude_flight: Option<Ulid>,
    statuses: &StatusIndex,
) -> Result<(), EngineError> {
    let probe = probe_window(rs.kind, candidate);
    for booking in rs.overlapping(&probe) {
        if Some(booking.flight_id) == exclude_flight {
            continue;
        }
        if !booking_blocks(booking, statuses) {
            continue;
        }
        if conflicts(rs.kind, &booking.window, candidate) {
            return Err(EngineError::Conflict {
                kind: rs.kind,
                resource_id: rs.id,
                flight_id: booking.flight_id,
            });
        }
    }
    Ok(())
}

/// Post-commit verification: the booking just written for `flight_id` must
/// not collide with any other blocking booking. Returns the offending
/// flight if the invariant is broken — a concurrency-control bug, never
/// expected in normal operation.
pub(crate) fn verify_assignment(
    rs: &ResourceState,
    flight_id: Ulid,
    statuses: &StatusIndex,
) -> Option<Ulid> {
    let window = rs.booking_for(flight_id)?.window;
    match check_no_conflict(rs, &window, Some(flight_id), statuses) {
        Err(EngineError::Conflict {
            flight_id: other, ..
        }) => Some(other),
        _ => None,
    }
}
