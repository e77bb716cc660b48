use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    CreateResource {
        kind: ResourceKind,
        id: Ulid,
        name: Option<String>,
    },
    UpdateResource {
        id: Ulid,
        name: Option<String>,
    },
    DeleteResource {
        id: Ulid,
    },
    ScheduleFlight {
        id: Ulid,
        departure: Ms,
        arrival: Ms,
        status: FlightStatus,
    },
    SetFlightStatus {
        id: Ulid,
        status: FlightStatus,
    },
    RescheduleFlight {
        id: Ulid,
        departure: Ms,
        arrival: Ms,
    },
    RemoveFlight {
        id: Ulid,
    },
    /// Window defaults to the flight's own when not given explicitly.
    AssignResource {
        resource_id: Ulid,
        flight_id: Ulid,
        window: Option<(Ms, Ms)>,
    },
    ReleaseResource {
        resource_id: Ulid,
        flight_id: Ulid,
    },
    ReassignResource {
        flight_id: Ulid,
        old_resource_id: Ulid,
        new_resource_id: Ulid,
    },
    ReserveSeat {
        id: Ulid,
        flight_id: Ulid,
        seat: String,
        passenger_id: Ulid,
    },
    CancelSeat {
        id: Ulid,
    },
    SelectAvailable {
        kind: ResourceKind,
        start: Ms,
        end: Ms,
        exclude_flight: Option<Ulid>,
    },
    SelectFreeWindows {
        resource_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectResources {
        kind: Option<ResourceKind>,
    },
    SelectFlights,
    SelectAssignments {
        resource_id: Ulid,
    },
    SelectReservations {
        flight_id: Ulid,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    if let Some(kind) = ResourceKind::parse(&table) {
        if values.is_empty() {
            return Err(SqlError::WrongArity(table_label(kind), 1, 0));
        }
        let id = parse_ulid(&values[0])?;
        let name = if values.len() >= 2 {
            parse_string_or_null(&values[1])?
        } else {
            None
        };
        return Ok(Command::CreateResource { kind, id, name });
    }

    match table.as_str() {
        "flights" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("flights", 3, values.len()));
            }
            let status = if values.len() >= 4 {
                parse_status(&values[3])?
            } else {
                FlightStatus::Scheduled
            };
            Ok(Command::ScheduleFlight {
                id: parse_ulid(&values[0])?,
                departure: parse_i64(&values[1])?,
                arrival: parse_i64(&values[2])?,
                status,
            })
        }
        "assignments" => {
            let window = match values.len() {
                2 => None,
                4 => Some((parse_i64(&values[2])?, parse_i64(&values[3])?)),
                n => return Err(SqlError::WrongArity("assignments", 2, n)),
            };
            Ok(Command::AssignResource {
                resource_id: parse_ulid(&values[0])?,
                flight_id: parse_ulid(&values[1])?,
                window,
            })
        }
        "reservations" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("reservations", 4, values.len()));
            }
            Ok(Command::ReserveSeat {
                id: parse_ulid(&values[0])?,
                flight_id: parse_ulid(&values[1])?,
                seat: parse_string(&values[2])?,
                passenger_id: parse_ulid(&values[3])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let filters = Filters::extract(selection)?;

    if ResourceKind::parse(&table).is_some() {
        let id = filters.require_ulid("id")?;
        let name = match assignments_lookup(assignments, "name") {
            Some(expr) => parse_string_or_null(expr)?,
            None => return Err(SqlError::Unsupported("only SET name on resources".into())),
        };
        return Ok(Command::UpdateResource { id, name });
    }

    match table.as_str() {
        "flights" => {
            let id = filters.require_ulid("id")?;
            let status = assignments_lookup(assignments, "status");
            let departure = assignments_lookup(assignments, "departure");
            let arrival = assignments_lookup(assignments, "arrival");
            match (status, departure, arrival) {
                (Some(s), None, None) => Ok(Command::SetFlightStatus {
                    id,
                    status: parse_status(s)?,
                }),
                (None, Some(d), Some(a)) => Ok(Command::RescheduleFlight {
                    id,
                    departure: parse_i64(d)?,
                    arrival: parse_i64(a)?,
                }),
                _ => Err(SqlError::Unsupported(
                    "flights: SET status, or SET departure + arrival".into(),
                )),
            }
        }
        "assignments" => {
            let flight_id = filters.require_ulid("flight_id")?;
            let old_resource_id = filters.require_ulid("resource_id")?;
            let new_resource_id = match assignments_lookup(assignments, "resource_id") {
                Some(expr) => parse_ulid(expr)?,
                None => {
                    return Err(SqlError::Unsupported(
                        "only SET resource_id on assignments".into(),
                    ))
                }
            };
            Ok(Command::ReassignResource {
                flight_id,
                old_resource_id,
                new_resource_id,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::extract(&delete.selection)?;

    if ResourceKind::parse(&table).is_some() {
        return Ok(Command::DeleteResource {
            id: filters.require_ulid("id")?,
        });
    }

    match table.as_str() {
        "flights" => Ok(Command::RemoveFlight {
            id: filters.require_ulid("id")?,
        }),
        "assignments" => Ok(Command::ReleaseResource {
            resource_id: filters.require_ulid("resource_id")?,
            flight_id: filters.require_ulid("flight_id")?,
        }),
        "reservations" => Ok(Command::CancelSeat {
            id: filters.require_ulid("id")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::extract(&select.selection)?;

    if table == "resources" {
        return Ok(Command::SelectResources { kind: None });
    }
    if let Some(kind) = ResourceKind::parse(&table) {
        return Ok(Command::SelectResources { kind: Some(kind) });
    }

    match table.as_str() {
        "flights" => Ok(Command::SelectFlights),
        "assignments" => Ok(Command::SelectAssignments {
            resource_id: filters.require_ulid("resource_id")?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            flight_id: filters.require_ulid("flight_id")?,
        }),
        "availability" => {
            let kind_str = filters.require_string("kind")?;
            let kind = ResourceKind::parse(&kind_str)
                .ok_or_else(|| SqlError::Parse(format!("bad kind: {kind_str}")))?;
            Ok(Command::SelectAvailable {
                kind,
                start: filters.start.ok_or(SqlError::MissingFilter("start"))?,
                end: filters.end.ok_or(SqlError::MissingFilter("end"))?,
                exclude_flight: filters.get_ulid("exclude_flight")?,
            })
        }
        "free_windows" => Ok(Command::SelectFreeWindows {
            resource_id: filters.require_ulid("resource_id")?,
            start: filters.start.ok_or(SqlError::MissingFilter("start"))?,
            end: filters.end.ok_or(SqlError::MissingFilter("end"))?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clause filters ──────────────────────────────────────

/// Equality filters plus the `start >= … AND "end" <= …` range shape used
/// by availability/free_windows queries.
struct Filters<'a> {
    eq: Vec<(String, &'a Expr)>,
    start: Option<Ms>,
    end: Option<Ms>,
}

impl<'a> Filters<'a> {
    fn extract(selection: &'a Option<Expr>) -> Result<Self, SqlError> {
        let mut f = Filters {
            eq: Vec::new(),
            start: None,
            end: None,
        };
        if let Some(expr) = selection {
            f.walk(expr)?;
        }
        Ok(f)
    }

    fn walk(&mut self, expr: &'a Expr) -> Result<(), SqlError> {
        if let Expr::BinaryOp { left, op, right } = expr {
            match op {
                ast::BinaryOperator::And => {
                    self.walk(left)?;
                    self.walk(right)?;
                }
                ast::BinaryOperator::Eq => {
                    if let Some(col) = expr_column_name(left) {
                        self.eq.push((col, right));
                    }
                }
                ast::BinaryOperator::GtEq => {
                    if expr_column_name(left).as_deref() == Some("start") {
                        self.start = Some(parse_i64(right)?);
                    }
                }
                ast::BinaryOperator::LtEq => {
                    if expr_column_name(left).as_deref() == Some("end") {
                        self.end = Some(parse_i64(right)?);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn find(&self, col: &str) -> Option<&'a Expr> {
        self.eq
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, e)| *e)
    }

    fn require_ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.find(col).ok_or(SqlError::MissingFilter(col))?)
    }

    fn get_ulid(&self, col: &'static str) -> Result<Option<Ulid>, SqlError> {
        self.find(col).map(parse_ulid).transpose()
    }

    fn require_string(&self, col: &'static str) -> Result<String, SqlError> {
        parse_string(self.find(col).ok_or(SqlError::MissingFilter(col))?)
    }
}

fn assignments_lookup<'a>(assignments: &'a [ast::Assignment], col: &str) -> Option<&'a Expr> {
    assignments.iter().find_map(|a| {
        let name = match &a.target {
            ast::AssignmentTarget::ColumnName(name) => object_name_last(name)?,
            _ => return None,
        };
        (name == col).then_some(&a.value)
    })
}

// ── Helpers ───────────────────────────────────────────────────

fn table_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Gate => "gates",
        ResourceKind::Runway => "runways",
        ResourceKind::Airplane => "airplanes",
    }
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_status(expr: &Expr) -> Result<FlightStatus, SqlError> {
    let s = parse_string(expr)?;
    FlightStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_gate() {
        let sql = format!("INSERT INTO gates (id, name) VALUES ('{U}', 'A1')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::CreateResource { kind, id, name } => {
                assert_eq!(kind, ResourceKind::Gate);
                assert_eq!(id.to_string(), U);
                assert_eq!(name.as_deref(), Some("A1"));
            }
            _ => panic!("expected CreateResource, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_runway_without_name() {
        let sql = format!("INSERT INTO runways (id) VALUES ('{U}')");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::CreateResource {
                kind: ResourceKind::Runway,
                name: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_insert_airplane_null_name() {
        let sql = format!("INSERT INTO airplanes (id, name) VALUES ('{U}', NULL)");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::CreateResource {
                kind: ResourceKind::Airplane,
                name: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_insert_flight_default_status() {
        let sql = format!("INSERT INTO flights (id, departure, arrival) VALUES ('{U}', 1000, 2000)");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::ScheduleFlight {
                departure,
                arrival,
                status,
                ..
            } => {
                assert_eq!(departure, 1000);
                assert_eq!(arrival, 2000);
                assert_eq!(status, FlightStatus::Scheduled);
            }
            _ => panic!("expected ScheduleFlight, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_flight_explicit_status() {
        let sql = format!(
            "INSERT INTO flights (id, departure, arrival, status) VALUES ('{U}', 1000, 2000, 'delayed')"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::ScheduleFlight {
                status: FlightStatus::Delayed,
                ..
            }
        ));
    }

    #[test]
    fn parse_insert_flight_bad_status() {
        let sql = format!(
            "INSERT INTO flights (id, departure, arrival, status) VALUES ('{U}', 1000, 2000, 'parked')"
        );
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_insert_assignment_without_window() {
        let sql = format!("INSERT INTO assignments (resource_id, flight_id) VALUES ('{U}', '{U}')");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::AssignResource { window: None, .. }
        ));
    }

    #[test]
    fn parse_insert_assignment_with_window() {
        let sql = format!(
            "INSERT INTO assignments (resource_id, flight_id, departure, arrival) VALUES ('{U}', '{U}', 1000, 2000)"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::AssignResource {
                window: Some((1000, 2000)),
                ..
            }
        ));
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, flight_id, seat, passenger_id) VALUES ('{U}', '{U}', 'A1', '{U}')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::ReserveSeat { seat, .. } => assert_eq!(seat, "A1"),
            _ => panic!("expected ReserveSeat, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_flight_status() {
        let sql = format!("UPDATE flights SET status = 'cancelled' WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::SetFlightStatus {
                status: FlightStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn parse_update_flight_window() {
        let sql = format!("UPDATE flights SET departure = 5000, arrival = 9000 WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::RescheduleFlight {
                departure: 5000,
                arrival: 9000,
                ..
            }
        ));
    }

    #[test]
    fn parse_update_flight_mixed_rejected() {
        let sql = format!("UPDATE flights SET status = 'delayed', departure = 5000 WHERE id = '{U}'");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_update_assignment_reassign() {
        let new = "01BX5ZZKBKACTAV9WEVGEMMVRZ";
        let sql = format!(
            "UPDATE assignments SET resource_id = '{new}' WHERE flight_id = '{U}' AND resource_id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::ReassignResource {
                old_resource_id,
                new_resource_id,
                ..
            } => {
                assert_eq!(old_resource_id.to_string(), U);
                assert_eq!(new_resource_id.to_string(), new);
            }
            _ => panic!("expected ReassignResource, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_gate_name() {
        let sql = format!("UPDATE gates SET name = 'B7' WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateResource { name, .. } => assert_eq!(name.as_deref(), Some("B7")),
            _ => panic!("expected UpdateResource, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_gate() {
        let sql = format!("DELETE FROM gates WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::DeleteResource { .. }));
    }

    #[test]
    fn parse_delete_flight() {
        let sql = format!("DELETE FROM flights WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::RemoveFlight { .. }));
    }

    #[test]
    fn parse_delete_assignment_release() {
        let sql = format!(
            "DELETE FROM assignments WHERE resource_id = '{U}' AND flight_id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::ReleaseResource { .. }));
    }

    #[test]
    fn parse_delete_assignment_missing_flight_errors() {
        let sql = format!("DELETE FROM assignments WHERE resource_id = '{U}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("flight_id"))
        ));
    }

    #[test]
    fn parse_delete_reservation() {
        let sql = format!("DELETE FROM reservations WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::CancelSeat { .. }));
    }

    #[test]
    fn parse_select_availability() {
        let sql =
            "SELECT * FROM availability WHERE kind = 'gate' AND start >= 1000 AND \"end\" <= 2000";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::SelectAvailable {
                kind,
                start,
                end,
                exclude_flight,
            } => {
                assert_eq!(kind, ResourceKind::Gate);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
                assert_eq!(exclude_flight, None);
            }
            _ => panic!("expected SelectAvailable, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_with_exclude() {
        let sql = format!(
            "SELECT * FROM availability WHERE kind = 'runway' AND start >= 1000 AND \"end\" <= 2000 AND exclude_flight = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailable { exclude_flight, .. } => {
                assert_eq!(exclude_flight.unwrap().to_string(), U);
            }
            _ => panic!("expected SelectAvailable, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_free_windows() {
        let sql = format!(
            "SELECT * FROM free_windows WHERE resource_id = '{U}' AND start >= 0 AND \"end\" <= 86400000"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(
            cmd,
            Command::SelectFreeWindows {
                start: 0,
                end: 86_400_000,
                ..
            }
        ));
    }

    #[test]
    fn parse_select_resources_and_kinds() {
        assert!(matches!(
            parse_sql("SELECT * FROM resources").unwrap(),
            Command::SelectResources { kind: None }
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM runways").unwrap(),
            Command::SelectResources {
                kind: Some(ResourceKind::Runway)
            }
        ));
    }

    #[test]
    fn parse_select_assignments() {
        let sql = format!("SELECT * FROM assignments WHERE resource_id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectAssignments { .. }));
    }

    #[test]
    fn parse_select_reservations() {
        let sql = format!("SELECT * FROM reservations WHERE flight_id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectReservations { .. }));
    }

    #[test]
    fn parse_listen() {
        let sql = format!("LISTEN resource_{U}");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::Listen { channel } => {
                assert_eq!(channel, format!("resource_{U}"));
            }
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO terminals (id) VALUES ('{U}')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
