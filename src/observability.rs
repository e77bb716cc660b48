use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "flightdeck_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "flightdeck_query_duration_seconds";

/// Counter: assignments rejected because the window conflicted.
pub const SCHEDULING_CONFLICTS_TOTAL: &str = "flightdeck_scheduling_conflicts_total";

/// Counter: post-commit double-booking detections. Always zero unless the
/// concurrency control is broken.
pub const INVARIANT_VIOLATIONS_TOTAL: &str = "flightdeck_invariant_violations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "flightdeck_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "flightdeck_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "flightdeck_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "flightdeck_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "flightdeck_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "flightdeck_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateResource { .. } => "create_resource",
        Command::UpdateResource { .. } => "update_resource",
        Command::DeleteResource { .. } => "delete_resource",
        Command::ScheduleFlight { .. } => "schedule_flight",
        Command::SetFlightStatus { .. } => "set_flight_status",
        Command::RescheduleFlight { .. } => "reschedule_flight",
        Command::RemoveFlight { .. } => "remove_flight",
        Command::AssignResource { .. } => "assign",
        Command::ReleaseResource { .. } => "release",
        Command::ReassignResource { .. } => "reassign",
        Command::ReserveSeat { .. } => "reserve_seat",
        Command::CancelSeat { .. } => "cancel_seat",
        Command::SelectAvailable { .. } => "select_available",
        Command::SelectFreeWindows { .. } => "select_free_windows",
        Command::SelectResources { .. } => "select_resources",
        Command::SelectFlights => "select_flights",
        Command::SelectAssignments { .. } => "select_assignments",
        Command::SelectReservations { .. } => "select_reservations",
        Command::Listen { .. } => "listen",
    }
}
