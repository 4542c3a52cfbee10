//! Black-box coverage of the end-to-end scenarios: cold start, down
//! dampening, recovery, maintenance suppression, and webhook idempotency.
//! Each test stands up a real temporary sqlite database and, where a probe
//! is needed, a short-lived local TCP listener instead of hitting the
//! network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rusqlite::params;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use uptimecore::db::Db;
use uptimecore::models::{
    CheckResult, EventType, Monitor, MonitorState, MonitorStatus, NotificationChannel, OutageAction,
    WebhookChannelConfig,
};
use uptimecore::state_machine::{self, Thresholds};
use uptimecore::webhook::{dispatch_event, Event};
use uptimecore::{maintenance, probe, store};

struct TempDb {
    path: String,
    db: Db,
}

impl TempDb {
    fn new() -> Self {
        let path = format!("/tmp/uptimecore_test_{}.db", uuid::Uuid::new_v4());
        let db = Db::new(&path).unwrap();
        TempDb { path, db }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn thresholds() -> Thresholds {
    Thresholds {
        failures_to_down_from_up: 2,
        successes_to_up_from_down: 2,
    }
}

fn insert_monitor(db: &Db, target: &str, interval_sec: i64, timeout_ms: i64) -> i64 {
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO monitors (name, type, target, interval_sec, timeout_ms, http_method, is_active, created_at, updated_at) \
         VALUES ('probe target', 'tcp', ?1, ?2, ?3, 'GET', 1, 0, 0)",
        params![target, interval_sec, timeout_ms],
    )
    .unwrap();
    conn.last_insert_rowid()
}

fn load_monitor(db: &Db, id: i64) -> Monitor {
    store::get_monitor(db, id).unwrap()
}

/// Accept connections forever, just completing the handshake (simulates a
/// reachable TCP service).
async fn spawn_accepting_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });
    addr.to_string()
}

/// A minimal HTTP server that always answers 200 and counts hits, used as a
/// fake webhook receiver.
async fn spawn_webhook_receiver() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    (format!("http://{addr}/hook"), hits)
}

fn insert_channel(db: &Db, url: &str) -> i64 {
    let config = WebhookChannelConfig {
        url: url.to_string(),
        method: None,
        headers: None,
        timeout_ms: Some(2000),
        payload_type: Default::default(),
        message_template: None,
        payload_template: None,
        enabled_events: None,
        signing: None,
    };
    let config_json = serde_json::to_string(&config).unwrap();
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO notification_channels (name, config, is_active, created_at) VALUES ('hook', ?1, 1, 0)",
        params![config_json],
    )
    .unwrap();
    conn.last_insert_rowid()
}

fn monitor_down_event(monitor_id: i64, checked_at: i64) -> Event {
    let mut vars = HashMap::new();
    vars.insert("monitor.id".to_string(), monitor_id.to_string());
    Event {
        event_type: EventType::MonitorDown,
        event_key: format!("monitor:{monitor_id}:down:{checked_at}"),
        timestamp: checked_at,
        vars,
    }
}

#[tokio::test]
async fn cold_start_first_up_produces_no_outage_and_no_notification() {
    let temp = TempDb::new();
    let addr = spawn_accepting_listener().await;
    let monitor_id = insert_monitor(&temp.db, &addr, 60, 2000);
    let monitor = load_monitor(&temp.db, monitor_id);
    let client = reqwest::Client::new();

    let outcome = probe::probe(&client, &monitor).await;
    assert_eq!(outcome.status, uptimecore::models::CheckStatus::Up);

    let prev = MonitorState::unseen(monitor_id);
    let transition = state_machine::transition(&prev, &outcome, 60, &thresholds());
    assert_eq!(transition.next.status, MonitorStatus::Up);
    assert_eq!(transition.next.consecutive_successes, 1);
    assert_eq!(transition.outage_action, OutageAction::None);

    let check = CheckResult {
        id: None,
        monitor_id,
        checked_at: 60,
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        http_status: outcome.http_status,
        error: outcome.error.clone(),
        location: None,
        attempt: outcome.attempts,
    };
    store::persist_tick_result(&temp.db, &check, &transition.next, transition.outage_action).unwrap();

    assert!(store::open_outage(&temp.db, monitor_id).unwrap().is_none());
    let spans = store::check_spans(&temp.db, monitor_id, 0, 120).unwrap();
    assert_eq!(spans.len(), 1);
}

#[tokio::test]
async fn down_dampening_opens_outage_and_fires_webhook_on_second_failure() {
    let temp = TempDb::new();
    // Bind then immediately drop, so connections are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let monitor_id = insert_monitor(&temp.db, &addr, 60, 500);
    let monitor = load_monitor(&temp.db, monitor_id);
    let client = reqwest::Client::new();
    let (hook_url, hits) = spawn_webhook_receiver().await;
    let channel_id = insert_channel(&temp.db, &hook_url);
    let channel = store::active_channels(&temp.db).unwrap().into_iter().find(|c| c.id == Some(channel_id)).unwrap();

    let mut state = MonitorState {
        monitor_id,
        status: MonitorStatus::Up,
        last_checked_at: Some(0),
        last_changed_at: Some(0),
        last_latency_ms: Some(5),
        last_error: None,
        consecutive_failures: 0,
        consecutive_successes: 10,
    };

    // Tick 1: first failure, stays up.
    let outcome1 = probe::probe(&client, &monitor).await;
    let t1 = state_machine::transition(&state, &outcome1, 60, &thresholds());
    assert_eq!(t1.next.status, MonitorStatus::Up);
    assert_eq!(t1.outage_action, OutageAction::None);
    state = t1.next;

    // Tick 2: second failure, transitions to down and opens an outage.
    let outcome2 = probe::probe(&client, &monitor).await;
    let t2 = state_machine::transition(&state, &outcome2, 120, &thresholds());
    assert_eq!(t2.next.status, MonitorStatus::Down);
    assert_eq!(t2.outage_action, OutageAction::Open);

    let check2 = CheckResult {
        id: None,
        monitor_id,
        checked_at: 120,
        status: outcome2.status,
        latency_ms: outcome2.latency_ms,
        http_status: outcome2.http_status,
        error: outcome2.error.clone(),
        location: None,
        attempt: outcome2.attempts,
    };
    store::persist_tick_result(&temp.db, &check2, &t2.next, t2.outage_action).unwrap();
    assert!(store::open_outage(&temp.db, monitor_id).unwrap().is_some());

    let event = monitor_down_event(monitor_id, 120);
    dispatch_event(&temp.db, &client, std::slice::from_ref(&channel), &event).await.unwrap();

    // Give the receiver task a moment to record the hit.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(store::delivery_exists(&temp.db, channel_id, &event.event_key).unwrap());
}

#[tokio::test]
async fn maintenance_window_suppresses_notification_but_not_the_state_transition() {
    let temp = TempDb::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let monitor_id = insert_monitor(&temp.db, &addr, 60, 500);
    let monitor = load_monitor(&temp.db, monitor_id);
    let client = reqwest::Client::new();

    {
        let conn = temp.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO maintenance_windows (title, message, starts_at, ends_at, created_at) VALUES ('patch', NULL, 0, 1000, 0)",
            [],
        )
        .unwrap();
        let window_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO maintenance_window_monitors (maintenance_window_id, monitor_id) VALUES (?1, ?2)",
            params![window_id, monitor_id],
        )
        .unwrap();
    }

    let state = MonitorState {
        monitor_id,
        status: MonitorStatus::Up,
        last_checked_at: Some(0),
        last_changed_at: Some(0),
        last_latency_ms: Some(5),
        last_error: None,
        consecutive_failures: 1,
        consecutive_successes: 0,
    };

    let outcome = probe::probe(&client, &monitor).await;
    let transition = state_machine::transition(&state, &outcome, 120, &thresholds());
    assert_eq!(transition.next.status, MonitorStatus::Down);
    assert_eq!(transition.outage_action, OutageAction::Open);

    let suppressed = maintenance::suppressed_monitor_ids(&temp.db, &[monitor_id], 120).unwrap();
    assert!(suppressed.contains(&monitor_id));

    let check = CheckResult {
        id: None,
        monitor_id,
        checked_at: 120,
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        http_status: outcome.http_status,
        error: outcome.error.clone(),
        location: None,
        attempt: outcome.attempts,
    };
    store::persist_tick_result(&temp.db, &check, &transition.next, transition.outage_action).unwrap();
    assert!(store::open_outage(&temp.db, monitor_id).unwrap().is_some());
}

#[tokio::test]
async fn concurrent_webhook_dispatch_with_same_event_key_records_one_delivery() {
    let temp = TempDb::new();
    let client = reqwest::Client::new();
    let (hook_url, _hits) = spawn_webhook_receiver().await;
    let channel_id = insert_channel(&temp.db, &hook_url);
    let channels: Vec<NotificationChannel> = store::active_channels(&temp.db).unwrap();

    let event = monitor_down_event(1, 60);

    let (r1, r2) = tokio::join!(
        dispatch_event(&temp.db, &client, &channels, &event),
        dispatch_event(&temp.db, &client, &channels, &event),
    );
    r1.unwrap();
    r2.unwrap();

    let conn = temp.db.conn.lock().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM notification_deliveries WHERE channel_id = ?1 AND event_key = ?2",
            params![channel_id, event.event_key],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}
