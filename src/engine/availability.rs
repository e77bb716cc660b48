use crate::model::*;

use super::conflict::booking_blocks;
use super::StatusIndex;

// ── Free-window algebra ──────────────────────────────────────────

/// Sub-windows of `query` in which the resource has no blocking booking.
///
/// For gates and airplanes the blocked time is the booking window itself.
/// For runways each departure blocks `[dep − spacing, dep + spacing]`
/// (inclusive at the boundary, hence the extra millisecond in the half-open
/// representation) — the instants at which a new departure could not be
/// scheduled.
pub fn free_windows(
    rs: &ResourceState,
    query: &TimeWindow,
    statuses: &StatusIndex,
) -> Vec<TimeWindow> {
    let probe = match rs.kind {
        ResourceKind::Gate | ResourceKind::Airplane => *query,
        ResourceKind::Runway => TimeWindow::new(
            query.start - RUNWAY_SPACING_MS,
            query.end + RUNWAY_SPACING_MS,
        ),
    };

    let mut blocked: Vec<TimeWindow> = Vec::new();
    for booking in rs.overlapping(&probe) {
        if !booking_blocks(booking, statuses) {
            continue;
        }
        let span = match rs.kind {
            ResourceKind::Gate | ResourceKind::Airplane => booking.window,
            ResourceKind::Runway => TimeWindow::new(
                booking.window.start - RUNWAY_SPACING_MS,
                booking.window.start + RUNWAY_SPACING_MS + 1,
            ),
        };
        if span.end <= query.start || span.start >= query.end {
            continue;
        }
        blocked.push(TimeWindow::new(
            span.start.max(query.start),
            span.end.min(query.end),
        ));
    }

    blocked.sort_by_key(|s| s.start);
    let merged = merge_overlapping(&blocked);
    subtract_intervals(&[*query], &merged)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut merged: Vec<TimeWindow> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[TimeWindow], to_remove: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeWindow::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeWindow::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn gate_with(bookings: Vec<(Ulid, Ms, Ms)>) -> (ResourceState, StatusIndex) {
        resource_with(ResourceKind::Gate, bookings)
    }

    fn resource_with(
        kind: ResourceKind,
        bookings: Vec<(Ulid, Ms, Ms)>,
    ) -> (ResourceState, StatusIndex) {
        let mut rs = ResourceState::new(Ulid::new(), kind, None);
        let statuses: StatusIndex = DashMap::new();
        for (fid, start, end) in bookings {
            rs.put_booking(fid, TimeWindow::new(start, end));
            statuses.insert(fid, FlightStatus::Scheduled);
        }
        (rs, statuses)
    }

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![TimeWindow::new(100, 200), TimeWindow::new(300, 400)];
        let remove = vec![TimeWindow::new(200, 300)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![TimeWindow::new(100, 200)];
        let remove = vec![TimeWindow::new(50, 250)];
        let result = subtract_intervals(&base, &remove);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![TimeWindow::new(100, 300)];
        let remove = vec![TimeWindow::new(150, 200)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(
            result,
            vec![TimeWindow::new(100, 150), TimeWindow::new(200, 300)]
        );
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![TimeWindow::new(0, 1000)];
        let remove = vec![
            TimeWindow::new(100, 200),
            TimeWindow::new(400, 500),
            TimeWindow::new(800, 900),
        ];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(
            result,
            vec![
                TimeWindow::new(0, 100),
                TimeWindow::new(200, 400),
                TimeWindow::new(500, 800),
                TimeWindow::new(900, 1000),
            ]
        );
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![
            TimeWindow::new(100, 300),
            TimeWindow::new(200, 400),
            TimeWindow::new(500, 600),
        ];
        let merged = merge_overlapping(&spans);
        assert_eq!(
            merged,
            vec![TimeWindow::new(100, 400), TimeWindow::new(500, 600)]
        );
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![TimeWindow::new(100, 200), TimeWindow::new(200, 300)];
        let merged = merge_overlapping(&spans);
        assert_eq!(merged, vec![TimeWindow::new(100, 300)]);
    }

    // ── free_windows ─────────────────────────────────────

    #[test]
    fn gate_free_windows_punch_out_bookings() {
        let (rs, statuses) = gate_with(vec![(Ulid::new(), 10 * H, 11 * H)]);
        let query = TimeWindow::new(9 * H, 12 * H);
        let free = free_windows(&rs, &query, &statuses);
        assert_eq!(
            free,
            vec![TimeWindow::new(9 * H, 10 * H), TimeWindow::new(11 * H, 12 * H)]
        );
    }

    #[test]
    fn gate_free_windows_empty_resource() {
        let (rs, statuses) = gate_with(vec![]);
        let query = TimeWindow::new(0, 24 * H);
        assert_eq!(free_windows(&rs, &query, &statuses), vec![query]);
    }

    #[test]
    fn released_booking_does_not_block() {
        let fid = Ulid::new();
        let (mut rs, statuses) = gate_with(vec![(fid, 10 * H, 11 * H)]);
        rs.release_booking(fid);
        let query = TimeWindow::new(9 * H, 12 * H);
        assert_eq!(free_windows(&rs, &query, &statuses), vec![query]);
    }

    #[test]
    fn cancelled_flight_does_not_block() {
        let fid = Ulid::new();
        let (rs, statuses) = gate_with(vec![(fid, 10 * H, 11 * H)]);
        statuses.insert(fid, FlightStatus::Cancelled);
        let query = TimeWindow::new(9 * H, 12 * H);
        assert_eq!(free_windows(&rs, &query, &statuses), vec![query]);
    }

    #[test]
    fn runway_blocks_spacing_around_departure() {
        // Departure at 10:00 blocks [09:30, 10:30] inclusive.
        let (rs, statuses) =
            resource_with(ResourceKind::Runway, vec![(Ulid::new(), 10 * H, 12 * H)]);
        let query = TimeWindow::new(9 * H, 11 * H);
        let free = free_windows(&rs, &query, &statuses);
        assert_eq!(free.len(), 2);
        assert_eq!(free[0], TimeWindow::new(9 * H, 10 * H - 30 * M));
        assert_eq!(free[1].start, 10 * H + 30 * M + 1);
        assert_eq!(free[1].end, 11 * H);
    }

    #[test]
    fn runway_departure_outside_query_still_blocks_edge() {
        // Departure at 08:50, query starts at 09:00: the tail of the
        // blocked span [08:20, 09:20] reaches into the query.
        let dep = 8 * H + 50 * M;
        let (rs, statuses) =
            resource_with(ResourceKind::Runway, vec![(Ulid::new(), dep, 12 * H)]);
        let query = TimeWindow::new(9 * H, 10 * H);
        let free = free_windows(&rs, &query, &statuses);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].start, dep + 30 * M + 1);
        assert_eq!(free[0].end, 10 * H);
    }

    #[test]
    fn adjacent_gate_bookings_merge_into_one_block() {
        let (rs, statuses) = gate_with(vec![
            (Ulid::new(), 10 * H, 11 * H),
            (Ulid::new(), 11 * H, 12 * H),
        ]);
        let query = TimeWindow::new(9 * H, 13 * H);
        let free = free_windows(&rs, &query, &statuses);
        assert_eq!(
            free,
            vec![TimeWindow::new(9 * H, 10 * H), TimeWindow::new(12 * H, 13 * H)]
        );
    }
}
