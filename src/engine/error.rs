use ulid::Ulid;

use crate::model::{Ms, ResourceKind};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The candidate window collides with a blocking booking. Carries the
    /// flight currently holding the resource so callers can name it.
    Conflict {
        kind: ResourceKind,
        resource_id: Ulid,
        flight_id: Ulid,
    },
    /// An active reservation already holds this seat on this flight.
    SeatTaken {
        flight_id: Ulid,
        seat: String,
    },
    /// Resource exists but is not of the requested kind.
    KindMismatch(Ulid),
    /// Resource still has blocking bookings and cannot be deleted.
    InUse(Ulid),
    InvalidWindow {
        start: Ms,
        end: Ms,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict {
                kind,
                resource_id,
                flight_id,
            } => write!(
                f,
                "{kind} {resource_id} is held by flight {flight_id} in that window"
            ),
            EngineError::SeatTaken { flight_id, seat } => {
                write!(f, "seat {seat} on flight {flight_id} is already reserved")
            }
            EngineError::KindMismatch(id) => {
                write!(f, "resource {id} is not of the requested kind")
            }
            EngineError::InUse(id) => {
                write!(f, "cannot delete resource {id}: active bookings exist")
            }
            EngineError::InvalidWindow { start, end } => {
                write!(f, "invalid window: [{start}, {end})")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
