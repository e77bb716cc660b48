use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use flightdeck::tenant::TenantManager;
use flightdeck::wire;

const HOUR: i64 = 3_600_000;
const MINUTE: i64 = 60_000;
const WEEK: i64 = 604_800_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("flightdeck_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, WEEK));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "flightdeck".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(format!("test_{}", Ulid::new()))
        .user("flightdeck")
        .password("flightdeck");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

fn data_rows(messages: &[SimpleQueryMessage]) -> Vec<&tokio_postgres::SimpleQueryRow> {
    messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_list_resources() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let runway = Ulid::new();
    client
        .batch_execute(&format!("INSERT INTO gates (id, name) VALUES ('{gate}', 'A1')"))
        .await
        .unwrap();
    client
        .batch_execute(&format!("INSERT INTO runways (id) VALUES ('{runway}')"))
        .await
        .unwrap();

    let rows = client.simple_query("SELECT * FROM resources").await.unwrap();
    assert_eq!(data_rows(&rows).len(), 2);

    let rows = client.simple_query("SELECT * FROM gates").await.unwrap();
    let gates = data_rows(&rows);
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].get("kind"), Some("gate"));
    assert_eq!(gates[0].get("name"), Some("A1"));
}

#[tokio::test]
async fn gate_assignment_conflict_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let f1 = Ulid::new();
    let f2 = Ulid::new();
    let ten = 10 * HOUR;
    let eleven = 11 * HOUR;

    client
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {ten}, {eleven})"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f2}', {}, {})",
            ten + 30 * MINUTE,
            ten + 45 * MINUTE
        ))
        .await
        .unwrap();

    // F1 takes the gate
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f1}')"
        ))
        .await
        .unwrap();

    // F2 overlaps: rejected with the exclusion-violation SQLSTATE
    let err = client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f2}')"
        ))
        .await
        .unwrap_err();
    let db_err = err.as_db_error().expect("expected database error");
    assert_eq!(db_err.code().code(), "23P01");
    assert!(db_err.message().contains(&f1.to_string()));

    // Exactly one active booking on the gate
    let rows = client
        .simple_query(&format!(
            "SELECT * FROM assignments WHERE resource_id = '{gate}'"
        ))
        .await
        .unwrap();
    let bookings = data_rows(&rows);
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].get("flight_id"), Some(f1.to_string().as_str()));
    assert_eq!(bookings[0].get("released"), Some("f"));
}

#[tokio::test]
async fn touching_windows_do_not_conflict() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let f1 = Ulid::new();
    let f3 = Ulid::new();

    client
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {}, {})",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f3}', {}, {})",
            11 * HOUR,
            12 * HOUR
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f1}')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f3}')"
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn availability_respects_bookings_and_exclusion() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let g1 = Ulid::new();
    let g2 = Ulid::new();
    let f1 = Ulid::new();

    for g in [g1, g2] {
        client
            .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{g}')"))
            .await
            .unwrap();
    }
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {}, {})",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{g1}', '{f1}')"
        ))
        .await
        .unwrap();

    // Only g2 is free in the overlapping window
    let rows = client
        .simple_query(&format!(
            "SELECT * FROM availability WHERE kind = 'gate' AND start >= {} AND \"end\" <= {}",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    let free = data_rows(&rows);
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].get("resource_id"), Some(g2.to_string().as_str()));

    // Excluding F1 brings its own gate back
    let rows = client
        .simple_query(&format!(
            "SELECT * FROM availability WHERE kind = 'gate' AND start >= {} AND \"end\" <= {} AND exclude_flight = '{f1}'",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    assert_eq!(data_rows(&rows).len(), 2);
}

#[tokio::test]
async fn free_windows_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let f1 = Ulid::new();

    client
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {}, {})",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f1}')"
        ))
        .await
        .unwrap();

    let rows = client
        .simple_query(&format!(
            "SELECT * FROM free_windows WHERE resource_id = '{gate}' AND start >= {} AND \"end\" <= {}",
            9 * HOUR,
            12 * HOUR
        ))
        .await
        .unwrap();
    let free = data_rows(&rows);
    assert_eq!(free.len(), 2);
    assert_eq!(free[0].get("start"), Some((9 * HOUR).to_string().as_str()));
    assert_eq!(free[0].get("end"), Some((10 * HOUR).to_string().as_str()));
    assert_eq!(free[1].get("start"), Some((11 * HOUR).to_string().as_str()));
    assert_eq!(free[1].get("end"), Some((12 * HOUR).to_string().as_str()));
}

#[tokio::test]
async fn release_then_reassign_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let f1 = Ulid::new();
    let f2 = Ulid::new();

    client
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();
    for f in [f1, f2] {
        client
            .batch_execute(&format!(
                "INSERT INTO flights (id, departure, arrival) VALUES ('{f}', {}, {})",
                10 * HOUR,
                11 * HOUR
            ))
            .await
            .unwrap();
    }

    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f1}')"
        ))
        .await
        .unwrap();

    // Release F1's hold, then F2 fits
    client
        .batch_execute(&format!(
            "DELETE FROM assignments WHERE resource_id = '{gate}' AND flight_id = '{f1}'"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f2}')"
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelling_flight_frees_gate_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let gate = Ulid::new();
    let f1 = Ulid::new();
    let f2 = Ulid::new();

    client
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();
    for f in [f1, f2] {
        client
            .batch_execute(&format!(
                "INSERT INTO flights (id, departure, arrival) VALUES ('{f}', {}, {})",
                10 * HOUR,
                11 * HOUR
            ))
            .await
            .unwrap();
    }
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f1}')"
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "UPDATE flights SET status = 'cancelled' WHERE id = '{f1}'"
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{gate}', '{f2}')"
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn reassign_via_update_statement() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let g1 = Ulid::new();
    let g2 = Ulid::new();
    let f1 = Ulid::new();

    for g in [g1, g2] {
        client
            .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{g}')"))
            .await
            .unwrap();
    }
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {}, {})",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO assignments (resource_id, flight_id) VALUES ('{g1}', '{f1}')"
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "UPDATE assignments SET resource_id = '{g2}' WHERE flight_id = '{f1}' AND resource_id = '{g1}'"
        ))
        .await
        .unwrap();

    let rows = client
        .simple_query(&format!("SELECT * FROM assignments WHERE resource_id = '{g2}'"))
        .await
        .unwrap();
    let bookings = data_rows(&rows);
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].get("released"), Some("f"));

    let rows = client
        .simple_query(&format!("SELECT * FROM assignments WHERE resource_id = '{g1}'"))
        .await
        .unwrap();
    assert_eq!(data_rows(&rows)[0].get("released"), Some("t"));
}

#[tokio::test]
async fn seat_reservation_flow_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let f1 = Ulid::new();
    let u1 = Ulid::new();
    let u2 = Ulid::new();
    let r1 = Ulid::new();
    let r2 = Ulid::new();

    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival) VALUES ('{f1}', {}, {})",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "INSERT INTO reservations (id, flight_id, seat, passenger_id) VALUES ('{r1}', '{f1}', 'A1', '{u1}')"
        ))
        .await
        .unwrap();

    // Same seat, different passenger: rejected
    let err = client
        .batch_execute(&format!(
            "INSERT INTO reservations (id, flight_id, seat, passenger_id) VALUES ('{r2}', '{f1}', 'A1', '{u2}')"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.as_db_error().unwrap().code().code(), "23P01");

    // Cancel, then the seat opens up
    client
        .batch_execute(&format!("DELETE FROM reservations WHERE id = '{r1}'"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO reservations (id, flight_id, seat, passenger_id) VALUES ('{r2}', '{f1}', 'A1', '{u2}')"
        ))
        .await
        .unwrap();

    let rows = client
        .simple_query(&format!(
            "SELECT * FROM reservations WHERE flight_id = '{f1}'"
        ))
        .await
        .unwrap();
    let reservations = data_rows(&rows);
    assert_eq!(reservations.len(), 2);
}

#[tokio::test]
async fn flights_listing_reflects_updates() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let f1 = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO flights (id, departure, arrival, status) VALUES ('{f1}', {}, {}, 'boarding')",
            10 * HOUR,
            11 * HOUR
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "UPDATE flights SET departure = {}, arrival = {} WHERE id = '{f1}'",
            12 * HOUR,
            13 * HOUR
        ))
        .await
        .unwrap();

    let rows = client.simple_query("SELECT * FROM flights").await.unwrap();
    let flights = data_rows(&rows);
    assert_eq!(flights.len(), 1);
    assert_eq!(flights[0].get("status"), Some("boarding"));
    assert_eq!(
        flights[0].get("departure"),
        Some((12 * HOUR).to_string().as_str())
    );
}

#[tokio::test]
async fn tenants_are_isolated_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client_a = connect(addr).await;
    let client_b = connect(addr).await;

    let gate = Ulid::new();
    client_a
        .batch_execute(&format!("INSERT INTO gates (id) VALUES ('{gate}')"))
        .await
        .unwrap();

    let rows = client_b.simple_query("SELECT * FROM gates").await.unwrap();
    assert!(data_rows(&rows).is_empty());
}
