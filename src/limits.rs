//! Defensive caps. Everything here surfaces as `EngineError::LimitExceeded`.

use crate::model::Ms;

/// Earliest timestamp the engine accepts (1970-01-01).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest timestamp the engine accepts (year 2100).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest flight window: 48 hours covers any ground hold plus longhaul.
pub const MAX_WINDOW_DURATION_MS: Ms = 48 * 3_600_000;

/// Widest availability / free-window query: 31 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 31 * 24 * 3_600_000;

pub const MAX_RESOURCES_PER_TENANT: usize = 10_000;
pub const MAX_FLIGHTS_PER_TENANT: usize = 100_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 10_000;
pub const MAX_RESERVATIONS_PER_FLIGHT: usize = 1_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SEAT_LEN: usize = 8;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 256;
