use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Minimum separation between two departures on the same runway.
pub const RUNWAY_SPACING_MS: Ms = 30 * 60_000;

/// Half-open interval `[start, end)`. For gates and airplanes this is the
/// flight's full ground window (departure to arrival); for runways only the
/// start (departure instant) participates in conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Ms,
    pub end: Ms,
}

impl TimeWindow {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// The three schedulable resource types. Each carries its own conflict rule,
/// see `engine::conflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Gate,
    Runway,
    Airplane,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Gate => "gate",
            ResourceKind::Runway => "runway",
            ResourceKind::Airplane => "airplane",
        }
    }

    pub fn parse(s: &str) -> Option<ResourceKind> {
        match s {
            "gate" | "gates" => Some(ResourceKind::Gate),
            "runway" | "runways" => Some(ResourceKind::Runway),
            "airplane" | "airplanes" => Some(ResourceKind::Airplane),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flight lifecycle. Which statuses block a resource is decided in exactly
/// one place: `is_blocking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightStatus {
    Scheduled,
    Boarding,
    Delayed,
    Cancelled,
    Arrived,
    Completed,
}

impl FlightStatus {
    /// A booking held by a flight in one of these statuses must be respected
    /// by every conflict check. Cancelled/arrived/completed flights no longer
    /// occupy anything.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            FlightStatus::Scheduled | FlightStatus::Boarding | FlightStatus::Delayed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Boarding => "boarding",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Arrived => "arrived",
            FlightStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<FlightStatus> {
        match s {
            "scheduled" => Some(FlightStatus::Scheduled),
            "boarding" => Some(FlightStatus::Boarding),
            "delayed" => Some(FlightStatus::Delayed),
            "cancelled" => Some(FlightStatus::Cancelled),
            "arrived" => Some(FlightStatus::Arrived),
            "completed" => Some(FlightStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flight's hold on one resource. Released bookings stay on the resource
/// as history; they never block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub flight_id: Ulid,
    pub window: TimeWindow,
    pub released: bool,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: Option<String>,
    /// All bookings (active + released), sorted by `window.start`.
    pub bookings: Vec<Booking>,
}

impl ResourceState {
    pub fn new(id: Ulid, kind: ResourceKind, name: Option<String>) -> Self {
        Self {
            id,
            kind,
            name,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by window.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.window.start, |b| b.window.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_for(&self, flight_id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.flight_id == flight_id)
    }

    /// Remove and return the booking held by `flight_id`, if any.
    pub fn take_booking(&mut self, flight_id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.flight_id == flight_id)?;
        Some(self.bookings.remove(pos))
    }

    /// Upsert: replace the flight's existing booking (re-assignment or
    /// un-release) or insert a fresh one.
    pub fn put_booking(&mut self, flight_id: Ulid, window: TimeWindow) {
        self.take_booking(flight_id);
        self.insert_booking(Booking {
            flight_id,
            window,
            released: false,
        });
    }

    /// Move an *active* booking to a new window (flight reschedule).
    /// Released bookings are history and keep their original window.
    pub fn reschedule_booking(&mut self, flight_id: Ulid, window: TimeWindow) -> bool {
        let Some(mut b) = self.take_booking(flight_id) else {
            return false;
        };
        let changed = !b.released;
        if changed {
            b.window = window;
        }
        self.insert_booking(b);
        changed
    }

    pub fn release_booking(&mut self, flight_id: Ulid) -> bool {
        if let Some(b) = self.bookings.iter_mut().find(|b| b.flight_id == flight_id) {
            let was_active = !b.released;
            b.released = true;
            was_active
        } else {
            false
        }
    }

    /// Bookings whose window overlaps the probe window, in start order.
    /// Binary search skips everything starting at or after `probe.end`.
    pub fn overlapping(&self, probe: &TimeWindow) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.window.start < probe.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.window.end > probe.start)
    }
}

/// A seat reservation on a flight. The implicit resource is
/// `(flight_id, seat)`; at most one non-cancelled holder per seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatReservation {
    pub id: Ulid,
    pub seat: String,
    pub passenger_id: Ulid,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct FlightState {
    pub id: Ulid,
    pub window: TimeWindow,
    pub status: FlightStatus,
    pub reservations: Vec<SeatReservation>,
}

impl FlightState {
    pub fn new(id: Ulid, window: TimeWindow, status: FlightStatus) -> Self {
        Self {
            id,
            window,
            status,
            reservations: Vec::new(),
        }
    }

    pub fn active_reservation(&self, seat: &str) -> Option<&SeatReservation> {
        self.reservations
            .iter()
            .find(|r| !r.cancelled && r.seat == seat)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut SeatReservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        kind: ResourceKind,
        name: Option<String>,
    },
    ResourceUpdated {
        id: Ulid,
        name: Option<String>,
    },
    ResourceDeleted {
        id: Ulid,
    },
    FlightScheduled {
        id: Ulid,
        window: TimeWindow,
        status: FlightStatus,
    },
    FlightRescheduled {
        id: Ulid,
        window: TimeWindow,
    },
    FlightStatusChanged {
        id: Ulid,
        status: FlightStatus,
    },
    FlightRemoved {
        id: Ulid,
    },
    ResourceAssigned {
        resource_id: Ulid,
        flight_id: Ulid,
        window: TimeWindow,
    },
    ResourceReleased {
        resource_id: Ulid,
        flight_id: Ulid,
    },
    SeatReserved {
        id: Ulid,
        flight_id: Ulid,
        seat: String,
        passenger_id: Ulid,
    },
    SeatCancelled {
        id: Ulid,
        flight_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightInfo {
    pub id: Ulid,
    pub departure: Ms,
    pub arrival: Ms,
    pub status: FlightStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub resource_id: Ulid,
    pub flight_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub flight_id: Ulid,
    pub seat: String,
    pub passenger_id: Ulid,
    pub cancelled: bool,
}
