//! Scheduler tick (§4.5): the orchestration entrypoint. Invoked once per
//! minute; acquires the tick lease, loads the due monitors, probes them
//! with bounded concurrency, persists each probe's write-set atomically,
//! fans out change events, and refreshes the public snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;

use crate::db::Db;
use crate::error::{LeaseError, StoreError};
use crate::maintenance;
use crate::models::{EventType, Monitor, MonitorStatus, OutageAction};
use crate::probe;
use crate::settings;
use crate::snapshot;
use crate::state_machine::{self, Thresholds};
use crate::store;
use crate::webhook::{self, Event};

const TICK_LEASE_NAME: &str = "scheduler:tick";
const MAINTENANCE_LOOKBACK_SECS: i64 = 600;
const PROBE_CONCURRENCY: usize = 5;

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs() as i64
}

/// Run one scheduler tick. Returns `Ok(false)` if the tick lease was not
/// acquired (another runner already holds it) — not an error, just a no-op.
pub async fn run_tick(db: &Db, client: &reqwest::Client, lease_seconds: i64) -> Result<bool, StoreError> {
    let now = unix_now();
    let checked_at = now - now.rem_euclid(60);

    match crate::lease::acquire_lease(db, TICK_LEASE_NAME, now, lease_seconds) {
        Ok(()) => {}
        Err(LeaseError::NotAcquired) => {
            println!("scheduler: lease '{TICK_LEASE_NAME}' not acquired, skipping tick");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    let channels = store::active_channels(db)?;
    let settings = settings::load(db)?;
    let due = store::due_monitors(db, checked_at)?;

    emit_maintenance_events(db, client, &channels, now).await;

    if due.is_empty() {
        snapshot::refresh(db, now)?;
        return Ok(true);
    }

    let due_ids: Vec<i64> = due.iter().map(|m| m.id).collect();
    let suppressed = maintenance::suppressed_monitor_ids(db, &due_ids, now)?;

    let outcomes = probe_all(client, due).await;

    let thresholds = Thresholds {
        failures_to_down_from_up: settings.state_failures_to_down_from_up,
        successes_to_up_from_down: settings.state_successes_to_up_from_down,
    };

    for (monitor, outcome) in outcomes {
        let prev_state = match store::get_state(db, monitor.id) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("scheduler: failed to load state for monitor {}: {e}", monitor.id);
                continue;
            }
        };

        let transition = state_machine::transition(&prev_state, &outcome, checked_at, &thresholds);

        let check = crate::models::CheckResult {
            id: None,
            monitor_id: monitor.id,
            checked_at,
            status: outcome.status,
            latency_ms: outcome.latency_ms,
            http_status: outcome.http_status,
            error: outcome.error.clone(),
            location: None,
            attempt: outcome.attempts,
        };

        if let Err(e) = store::persist_tick_result(db, &check, &transition.next, transition.outage_action) {
            eprintln!("scheduler: failed to persist result for monitor {}: {e}", monitor.id);
            continue;
        }

        let should_notify = transition.changed
            && !suppressed.contains(&monitor.id)
            && matches!(transition.outage_action, OutageAction::Open | OutageAction::Close);

        if should_notify {
            let event = monitor_event(&monitor, &transition.next, checked_at);
            if let Err(e) = webhook::dispatch_event(db, client, &channels, &event).await {
                eprintln!("scheduler: webhook dispatch failed for monitor {}: {e}", monitor.id);
            }
        }
    }

    snapshot::refresh(db, now)?;
    Ok(true)
}

async fn probe_all(client: &reqwest::Client, monitors: Vec<Monitor>) -> Vec<(Monitor, crate::models::CheckOutcome)> {
    let semaphore = Arc::new(Semaphore::new(PROBE_CONCURRENCY));
    let mut join_set = tokio::task::JoinSet::new();

    for monitor in monitors {
        let client = client.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let outcome = probe::probe(&client, &monitor).await;
            (monitor, outcome)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(pair) => results.push(pair),
            Err(e) => eprintln!("scheduler: probe task panicked: {e}"),
        }
    }
    results
}

fn monitor_event(monitor: &Monitor, state: &crate::models::MonitorState, checked_at: i64) -> Event {
    let (event_type, verb) = match state.status {
        MonitorStatus::Down => (EventType::MonitorDown, "down"),
        _ => (EventType::MonitorUp, "up"),
    };
    let event_key = format!("monitor:{}:{}:{}", monitor.id, verb, checked_at);

    let mut vars = HashMap::new();
    vars.insert("event".to_string(), event_type.as_str().to_string());
    vars.insert("monitor.id".to_string(), monitor.id.to_string());
    vars.insert("monitor.name".to_string(), monitor.name.clone());
    vars.insert("monitor.target".to_string(), monitor.target.clone());
    vars.insert("state.status".to_string(), state.status.as_str().to_string());
    vars.insert("timestamp".to_string(), checked_at.to_string());
    if let Some(ref error) = state.last_error {
        vars.insert("error".to_string(), error.clone());
    }

    Event {
        event_type,
        event_key,
        timestamp: checked_at,
        vars,
    }
}

async fn emit_maintenance_events(
    db: &Db,
    client: &reqwest::Client,
    channels: &[crate::models::NotificationChannel],
    now: i64,
) {
    let window_start = now - MAINTENANCE_LOOKBACK_SECS;

    match maintenance::windows_starting_in(db, window_start, now) {
        Ok(windows) => {
            for window in windows {
                let event = maintenance_event(&window, EventType::MaintenanceStarted, "started", window.starts_at);
                if let Err(e) = webhook::dispatch_event(db, client, channels, &event).await {
                    eprintln!("scheduler: maintenance.started dispatch failed: {e}");
                }
            }
        }
        Err(e) => eprintln!("scheduler: failed to query starting maintenance windows: {e}"),
    }

    match maintenance::windows_ending_in(db, window_start, now) {
        Ok(windows) => {
            for window in windows {
                let event = maintenance_event(&window, EventType::MaintenanceEnded, "ended", window.ends_at);
                if let Err(e) = webhook::dispatch_event(db, client, channels, &event).await {
                    eprintln!("scheduler: maintenance.ended dispatch failed: {e}");
                }
            }
        }
        Err(e) => eprintln!("scheduler: failed to query ending maintenance windows: {e}"),
    }
}

fn maintenance_event(
    window: &crate::models::MaintenanceWindow,
    event_type: EventType,
    verb: &str,
    epoch: i64,
) -> Event {
    let id = window.id.expect("persisted window always has an id");
    let event_key = format!("maintenance:{id}:{verb}:{epoch}");

    let mut vars = HashMap::new();
    vars.insert("event".to_string(), event_type.as_str().to_string());
    vars.insert("maintenance.id".to_string(), id.to_string());
    vars.insert("maintenance.title".to_string(), window.title.clone());
    if let Some(ref message) = window.message {
        vars.insert("maintenance.message".to_string(), message.clone());
    }
    vars.insert("timestamp".to_string(), epoch.to_string());

    Event {
        event_type,
        event_key,
        timestamp: epoch,
        vars,
    }
}
