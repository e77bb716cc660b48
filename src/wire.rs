use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::FlightDeckAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct FlightDeckHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<FlightDeckQueryParser>,
}

impl FlightDeckHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(FlightDeckQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Look up the resource's kind; unknown resources surface as NotFound
    /// before any scheduling is attempted.
    async fn require_kind(&self, engine: &Engine, resource_id: Ulid) -> PgWireResult<ResourceKind> {
        engine
            .resource_kind(resource_id)
            .await
            .ok_or_else(|| engine_err(EngineError::NotFound(resource_id)))
    }

    /// Default a missing assignment window to the flight's own.
    async fn assignment_window(
        &self,
        engine: &Engine,
        flight_id: Ulid,
        window: Option<(Ms, Ms)>,
    ) -> PgWireResult<(Ms, Ms)> {
        if let Some(w) = window {
            return Ok(w);
        }
        let info = engine
            .get_flight_info(flight_id)
            .await
            .ok_or_else(|| engine_err(EngineError::NotFound(flight_id)))?;
        Ok((info.departure, info.arrival))
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::CreateResource { kind, id, name } => {
                engine
                    .create_resource(id, kind, name)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateResource { id, name } => {
                engine.update_resource(id, name).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteResource { id } => {
                engine.delete_resource(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::ScheduleFlight {
                id,
                departure,
                arrival,
                status,
            } => {
                engine
                    .schedule_flight(id, departure, arrival, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetFlightStatus { id, status } => {
                engine
                    .set_flight_status(id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RescheduleFlight {
                id,
                departure,
                arrival,
            } => {
                engine
                    .reschedule_flight(id, departure, arrival)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RemoveFlight { id } => {
                engine.remove_flight(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::AssignResource {
                resource_id,
                flight_id,
                window,
            } => {
                let kind = self.require_kind(engine, resource_id).await?;
                let (departure, arrival) =
                    self.assignment_window(engine, flight_id, window).await?;
                engine
                    .assign(kind, resource_id, flight_id, departure, arrival)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ReleaseResource {
                resource_id,
                flight_id,
            } => {
                let kind = self.require_kind(engine, resource_id).await?;
                engine
                    .release(kind, resource_id, flight_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::ReassignResource {
                flight_id,
                old_resource_id,
                new_resource_id,
            } => {
                let kind = self.require_kind(engine, old_resource_id).await?;
                let (departure, arrival) =
                    self.assignment_window(engine, flight_id, None).await?;
                engine
                    .reassign(
                        kind,
                        flight_id,
                        old_resource_id,
                        new_resource_id,
                        departure,
                        arrival,
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::ReserveSeat {
                id,
                flight_id,
                seat,
                passenger_id,
            } => {
                engine
                    .reserve_seat(id, flight_id, seat, passenger_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::CancelSeat { id } => {
                engine.cancel_seat(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectAvailable {
                kind,
                start,
                end,
                exclude_flight,
            } => {
                let resources = engine
                    .query_available(kind, start, end, exclude_flight)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![resource_rows(resources, availability_schema())])
            }
            Command::SelectFreeWindows {
                resource_id,
                start,
                end,
            } => {
                let slots = engine
                    .resource_free_windows(resource_id, start, end)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(free_windows_schema());
                let rid_str = resource_id.to_string();
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&rid_str)?;
                        encoder.encode_field(&slot.start)?;
                        encoder.encode_field(&slot.end)?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectResources { kind } => {
                let resources = engine.list_resources(kind).await;
                Ok(vec![resource_rows(resources, resources_schema())])
            }
            Command::SelectFlights => {
                let flights = engine.list_flights().await;
                let schema = Arc::new(flights_schema());
                let rows: Vec<PgWireResult<_>> = flights
                    .into_iter()
                    .map(|f| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&f.id.to_string())?;
                        encoder.encode_field(&f.departure)?;
                        encoder.encode_field(&f.arrival)?;
                        encoder.encode_field(&f.status.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAssignments { resource_id } => {
                let bookings = engine
                    .get_assignments(resource_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(assignments_schema());
                let rows: Vec<PgWireResult<_>> = bookings
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.resource_id.to_string())?;
                        encoder.encode_field(&b.flight_id.to_string())?;
                        encoder.encode_field(&b.start)?;
                        encoder.encode_field(&b.end)?;
                        encoder.encode_field(&bool_text(b.released))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectReservations { flight_id } => {
                let reservations = engine
                    .get_reservations(flight_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.flight_id.to_string())?;
                        encoder.encode_field(&r.seat)?;
                        encoder.encode_field(&r.passenger_id.to_string())?;
                        encoder.encode_field(&bool_text(r.cancelled))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let id_str = channel
                    .strip_prefix("resource_")
                    .or_else(|| channel.strip_prefix("flight_"))
                    .ok_or_else(|| {
                        PgWireError::UserError(Box::new(ErrorInfo::new(
                            "ERROR".into(),
                            "42000".into(),
                            format!(
                                "invalid channel: {channel} (expected resource_{{id}} or flight_{{id}})"
                            ),
                        )))
                    })?;
                let _id = Ulid::from_string(id_str).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad ULID in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

fn resource_rows(resources: Vec<ResourceInfo>, schema: Vec<FieldInfo>) -> Response {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = resources
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.kind.as_str())?;
            encoder.encode_field(&r.name)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Postgres text format for booleans.
fn bool_text(b: bool) -> &'static str {
    if b { "t" } else { "f" }
}

fn varchar(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn boolean(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![varchar("resource_id"), varchar("kind"), varchar("name")]
}

fn resources_schema() -> Vec<FieldInfo> {
    vec![varchar("id"), varchar("kind"), varchar("name")]
}

fn free_windows_schema() -> Vec<FieldInfo> {
    vec![varchar("resource_id"), int8("start"), int8("end")]
}

fn flights_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        int8("departure"),
        int8("arrival"),
        varchar("status"),
    ]
}

fn assignments_schema() -> Vec<FieldInfo> {
    vec![
        varchar("resource_id"),
        varchar("flight_id"),
        int8("start"),
        int8("end"),
        boolean("released"),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("flight_id"),
        varchar("seat"),
        varchar("passenger_id"),
        boolean("cancelled"),
    ]
}

/// Result schema for a statement, detected from the table it reads.
fn statement_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("FREE_WINDOWS") {
        free_windows_schema()
    } else if upper.contains("FLIGHTS") {
        flights_schema()
    } else if upper.contains("ASSIGNMENTS") {
        assignments_schema()
    } else if upper.contains("RESERVATIONS") {
        reservations_schema()
    } else {
        resources_schema()
    }
}

#[async_trait]
impl SimpleQueryHandler for FlightDeckHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = crate::observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        metrics::histogram!(crate::observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            crate::observability::QUERIES_TOTAL,
            "command" => label,
            "status" => status
        )
        .increment(1);
        result
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct FlightDeckQueryParser;

#[async_trait]
impl QueryParser for FlightDeckQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for FlightDeckHandler {
    type Statement = String;
    type QueryParser = FlightDeckQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct FlightDeckFactory {
    handler: Arc<FlightDeckHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<FlightDeckAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl FlightDeckFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = FlightDeckAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(FlightDeckHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for FlightDeckFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection: pgwire handshake, auth, then the query loop.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> Result<(), std::io::Error> {
    let factory = FlightDeckFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    // Exclusion-violation SQLSTATE for scheduling conflicts so clients can
    // branch on it; everything else raises as a generic engine error.
    let code = match &e {
        EngineError::Conflict { .. } | EngineError::SeatTaken { .. } => "23P01",
        _ => "P0001",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
