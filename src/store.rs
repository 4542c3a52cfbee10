//! Persistence adapter (§3, §4.5, §4.6): typed reads/writes against the
//! relational store. Dynamic JSON columns are decoded here and a malformed
//! column surfaces as `StoreError::ParseError` rather than a silent default
//! (§9).

use rusqlite::{params, OptionalExtension, Row};

use crate::db::Db;
use crate::error::StoreError;
use crate::models::{
    CheckResult, CheckStatus, ExpectedStatus, Incident, IncidentId, IncidentImpact,
    IncidentStatus, IncidentUpdate, Monitor, MonitorDailyRollup, MonitorId, MonitorState,
    MonitorStatus, MonitorType, NotificationChannel, NotificationDelivery, Outage, OutageAction,
    WebhookChannelConfig,
};

fn decode_monitor(row: &Row) -> rusqlite::Result<(Monitor, Option<StoreError>)> {
    let headers_json: Option<String> = row.get("http_headers")?;
    let expected_json: Option<String> = row.get("expected_status")?;
    let type_str: String = row.get("type")?;

    let mut parse_err = None;
    let http_headers = match headers_json {
        None => None,
        Some(s) => match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                parse_err = Some(StoreError::from(e));
                None
            }
        },
    };
    let expected_status: Option<ExpectedStatus> = match expected_json {
        None => None,
        Some(s) => match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                parse_err = parse_err.or_else(|| Some(StoreError::from(e)));
                None
            }
        },
    };
    let monitor_type = MonitorType::parse_str(&type_str).unwrap_or(MonitorType::Http);

    let monitor = Monitor {
        id: row.get("id")?,
        name: row.get("name")?,
        monitor_type,
        target: row.get("target")?,
        interval_sec: row.get("interval_sec")?,
        timeout_ms: row.get("timeout_ms")?,
        http_method: row.get("http_method")?,
        http_headers,
        http_body: row.get("http_body")?,
        expected_status,
        response_keyword: row.get("response_keyword")?,
        response_forbidden_keyword: row.get("response_forbidden_keyword")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    Ok((monitor, parse_err))
}

impl MonitorType {
    fn parse_str(s: &str) -> Option<Self> {
        match s {
            "http" => Some(MonitorType::Http),
            "tcp" => Some(MonitorType::Tcp),
            _ => None,
        }
    }
}

const MONITOR_COLUMNS: &str = "id, name, type, target, interval_sec, timeout_ms, http_method, \
     http_headers, http_body, expected_status, response_keyword, response_forbidden_keyword, \
     is_active, created_at, updated_at";

/// Monitors due for a probe per §4.6: active, not paused, and either never
/// checked or stale relative to `interval_sec`. Ordered by id.
pub fn due_monitors(db: &Db, checked_at: i64) -> Result<Vec<Monitor>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!(
        "SELECT m.{cols} FROM monitors m
         LEFT JOIN monitor_state s ON s.monitor_id = m.id
         WHERE m.is_active = 1
           AND (s.status IS NULL OR s.status != 'paused')
           AND (s.last_checked_at IS NULL OR s.last_checked_at <= ?1 - m.interval_sec)
         ORDER BY m.id ASC",
        cols = MONITOR_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![checked_at], decode_monitor)?;

    let mut out = Vec::new();
    for row in rows {
        let (monitor, parse_err) = row?;
        if let Some(e) = parse_err {
            eprintln!(
                "store: monitor {} has a malformed JSON column, skipping: {e}",
                monitor.id
            );
            continue;
        }
        out.push(monitor);
    }
    Ok(out)
}

pub fn get_monitor(db: &Db, monitor_id: MonitorId) -> Result<Monitor, StoreError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!("SELECT {cols} FROM monitors WHERE id = ?1", cols = MONITOR_COLUMNS);
    let (monitor, parse_err) = conn.query_row(&sql, params![monitor_id], decode_monitor)?;
    if let Some(e) = parse_err {
        return Err(e);
    }
    Ok(monitor)
}

pub fn get_state(db: &Db, monitor_id: MonitorId) -> Result<MonitorState, StoreError> {
    let conn = db.conn.lock().unwrap();
    let state = conn
        .query_row(
            "SELECT monitor_id, status, last_checked_at, last_changed_at, last_latency_ms, \
             last_error, consecutive_failures, consecutive_successes \
             FROM monitor_state WHERE monitor_id = ?1",
            params![monitor_id],
            |row| {
                let status_str: String = row.get(1)?;
                Ok(MonitorState {
                    monitor_id: row.get(0)?,
                    status: MonitorStatus::parse(&status_str).unwrap_or(MonitorStatus::Unknown),
                    last_checked_at: row.get(2)?,
                    last_changed_at: row.get(3)?,
                    last_latency_ms: row.get(4)?,
                    last_error: row.get(5)?,
                    consecutive_failures: row.get(6)?,
                    consecutive_successes: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(state.unwrap_or_else(|| MonitorState::unseen(monitor_id)))
}

/// Persist one probe's full write-set atomically: the check result, the
/// upserted monitor state, and the outage bracket action (§4.5 step 7,
/// §5 ordering guarantee (i)).
pub fn persist_tick_result(
    db: &Db,
    check: &CheckResult,
    next_state: &MonitorState,
    outage_action: OutageAction,
) -> Result<(), StoreError> {
    let mut conn = db.conn.lock().unwrap();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO check_results (monitor_id, checked_at, status, latency_ms, http_status, error, location, attempt) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            check.monitor_id,
            check.checked_at,
            check.status.as_str(),
            check.latency_ms,
            check.http_status,
            check.error,
            check.location,
            check.attempt,
        ],
    )?;

    tx.execute(
        "INSERT INTO monitor_state (monitor_id, status, last_checked_at, last_changed_at, last_latency_ms, \
         last_error, consecutive_failures, consecutive_successes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(monitor_id) DO UPDATE SET \
             status = excluded.status, last_checked_at = excluded.last_checked_at, \
             last_changed_at = excluded.last_changed_at, last_latency_ms = excluded.last_latency_ms, \
             last_error = excluded.last_error, consecutive_failures = excluded.consecutive_failures, \
             consecutive_successes = excluded.consecutive_successes",
        params![
            next_state.monitor_id,
            next_state.status.as_str(),
            next_state.last_checked_at,
            next_state.last_changed_at,
            next_state.last_latency_ms,
            next_state.last_error,
            next_state.consecutive_failures,
            next_state.consecutive_successes,
        ],
    )?;

    match outage_action {
        OutageAction::Open => {
            tx.execute(
                "INSERT INTO outages (monitor_id, started_at, ended_at, initial_error, last_error) \
                 SELECT ?1, ?2, NULL, ?3, ?3 \
                 WHERE NOT EXISTS (SELECT 1 FROM outages WHERE monitor_id = ?1 AND ended_at IS NULL)",
                params![check.monitor_id, check.checked_at, check.error],
            )?;
        }
        OutageAction::Close => {
            tx.execute(
                "UPDATE outages SET ended_at = ?2 WHERE monitor_id = ?1 AND ended_at IS NULL",
                params![check.monitor_id, check.checked_at],
            )?;
        }
        OutageAction::Update => {
            tx.execute(
                "UPDATE outages SET last_error = ?2 WHERE monitor_id = ?1 AND ended_at IS NULL",
                params![check.monitor_id, check.error],
            )?;
        }
        OutageAction::None => {}
    }

    tx.commit()?;
    Ok(())
}

pub fn open_outage(db: &Db, monitor_id: MonitorId) -> Result<Option<Outage>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let outage = conn
        .query_row(
            "SELECT id, monitor_id, started_at, ended_at, initial_error, last_error \
             FROM outages WHERE monitor_id = ?1 AND ended_at IS NULL",
            params![monitor_id],
            |row| {
                Ok(Outage {
                    id: row.get(0)?,
                    monitor_id: row.get(1)?,
                    started_at: row.get(2)?,
                    ended_at: row.get(3)?,
                    initial_error: row.get(4)?,
                    last_error: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(outage)
}

fn decode_channel(row: &Row) -> rusqlite::Result<(NotificationChannel, Option<StoreError>)> {
    let config_json: String = row.get("config")?;
    let (config, err): (Option<WebhookChannelConfig>, Option<StoreError>) =
        match serde_json::from_str(&config_json) {
            Ok(c) => (Some(c), None),
            Err(e) => (None, Some(StoreError::from(e))),
        };
    let channel = NotificationChannel {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        config: config.unwrap_or(WebhookChannelConfig {
            url: String::new(),
            method: None,
            headers: None,
            timeout_ms: None,
            payload_type: Default::default(),
            message_template: None,
            payload_template: None,
            enabled_events: None,
            signing: None,
        }),
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
    };
    Ok((channel, err))
}

/// Active webhook channels (§4.5 step 3).
pub fn active_channels(db: &Db) -> Result<Vec<NotificationChannel>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, name, config, is_active, created_at FROM notification_channels WHERE is_active = 1",
    )?;
    let rows = stmt.query_map([], decode_channel)?;
    let mut out = Vec::new();
    for row in rows {
        let (channel, err) = row?;
        if let Some(e) = err {
            eprintln!(
                "store: channel {:?} has malformed config, skipping: {e}",
                channel.id
            );
            continue;
        }
        out.push(channel);
    }
    Ok(out)
}

pub fn delivery_exists(db: &Db, channel_id: i64, event_key: &str) -> Result<bool, StoreError> {
    let conn = db.conn.lock().unwrap();
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notification_deliveries WHERE channel_id = ?1 AND event_key = ?2",
        params![channel_id, event_key],
        |row| row.get(0),
    )?;
    Ok(exists > 0)
}

/// Record a delivery outcome. Returns `true` if this call recorded the row,
/// `false` if a racing writer already recorded it first (§4.4, §8 scenario 5).
pub fn record_delivery(db: &Db, delivery: &NotificationDelivery) -> Result<bool, StoreError> {
    let conn = db.conn.lock().unwrap();
    let inserted = conn.execute(
        "INSERT INTO notification_deliveries (channel_id, event_key, status, http_status, error, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(channel_id, event_key) DO NOTHING",
        params![
            delivery.channel_id,
            delivery.event_key,
            delivery.status.as_str(),
            delivery.http_status,
            delivery.error,
            delivery.created_at,
        ],
    )?;
    Ok(inserted > 0)
}

#[derive(Debug, Clone, Copy)]
pub struct CheckSpan {
    pub checked_at: i64,
    pub status: CheckStatus,
}

/// All check results for a monitor within `[start, end)`, ordered ascending,
/// used by the daily rollup (§4.9).
pub fn check_spans(db: &Db, monitor_id: MonitorId, start: i64, end: i64) -> Result<Vec<CheckSpan>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT checked_at, status FROM check_results \
         WHERE monitor_id = ?1 AND checked_at >= ?2 AND checked_at < ?3 ORDER BY checked_at ASC",
    )?;
    let rows = stmt.query_map(params![monitor_id, start, end], |row| {
        let status_str: String = row.get(1)?;
        Ok(CheckSpan {
            checked_at: row.get(0)?,
            status: CheckStatus::parse(&status_str).unwrap_or(CheckStatus::Unknown),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// The most recent check strictly before `t`, used to seed the rollup span
/// covering `[day_start, first in-day check)` (§4.9).
pub fn last_check_before(db: &Db, monitor_id: MonitorId, t: i64) -> Result<Option<CheckSpan>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let row = conn
        .query_row(
            "SELECT checked_at, status FROM check_results \
             WHERE monitor_id = ?1 AND checked_at < ?2 ORDER BY checked_at DESC LIMIT 1",
            params![monitor_id, t],
            |row| {
                let status_str: String = row.get(1)?;
                Ok(CheckSpan {
                    checked_at: row.get(0)?,
                    status: CheckStatus::parse(&status_str).unwrap_or(CheckStatus::Unknown),
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn all_monitor_ids(db: &Db) -> Result<Vec<MonitorId>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare("SELECT id FROM monitors ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn decode_check_result(row: &Row) -> rusqlite::Result<CheckResult> {
    let status_str: String = row.get("status")?;
    Ok(CheckResult {
        id: row.get("id")?,
        monitor_id: row.get("monitor_id")?,
        checked_at: row.get("checked_at")?,
        status: CheckStatus::parse(&status_str).unwrap_or(CheckStatus::Unknown),
        latency_ms: row.get("latency_ms")?,
        http_status: row.get("http_status")?,
        error: row.get("error")?,
        location: row.get("location")?,
        attempt: row.get("attempt")?,
    })
}

/// The last `limit` heartbeats for a monitor, newest first (§4.8 step 3).
pub fn recent_heartbeats(db: &Db, monitor_id: MonitorId, limit: i64) -> Result<Vec<CheckResult>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, monitor_id, checked_at, status, latency_ms, http_status, error, location, attempt \
         FROM check_results WHERE monitor_id = ?1 ORDER BY checked_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![monitor_id, limit], decode_check_result)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Daily rollups for a monitor with `day_start_at >= since`, ascending (§4.8 step 4).
pub fn rollups_since(db: &Db, monitor_id: MonitorId, since: i64) -> Result<Vec<MonitorDailyRollup>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec \
         FROM monitor_daily_rollups WHERE monitor_id = ?1 AND day_start_at >= ?2 ORDER BY day_start_at ASC",
    )?;
    let rows = stmt.query_map(params![monitor_id, since], |row| {
        Ok(MonitorDailyRollup {
            monitor_id: row.get(0)?,
            day_start_at: row.get(1)?,
            total_sec: row.get(2)?,
            downtime_sec: row.get(3)?,
            unknown_sec: row.get(4)?,
            uptime_sec: row.get(5)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Upsert one day's rollup (§4.9 step 1).
pub fn upsert_rollup(db: &Db, rollup: &MonitorDailyRollup) -> Result<(), StoreError> {
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO monitor_daily_rollups (monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(monitor_id, day_start_at) DO UPDATE SET \
             total_sec = excluded.total_sec, downtime_sec = excluded.downtime_sec, \
             unknown_sec = excluded.unknown_sec, uptime_sec = excluded.uptime_sec",
        params![
            rollup.monitor_id,
            rollup.day_start_at,
            rollup.total_sec,
            rollup.downtime_sec,
            rollup.unknown_sec,
            rollup.uptime_sec,
        ],
    )?;
    Ok(())
}

/// Delete `check_results` older than `cutoff` (§4.9 step 2). Returns rows deleted.
pub fn delete_check_results_older_than(db: &Db, cutoff: i64) -> Result<usize, StoreError> {
    let conn = db.conn.lock().unwrap();
    Ok(conn.execute("DELETE FROM check_results WHERE checked_at < ?1", params![cutoff])?)
}

/// Delete resolved outages older than `cutoff` (§4.9 step 3). Returns rows deleted.
pub fn delete_resolved_outages_older_than(db: &Db, cutoff: i64) -> Result<usize, StoreError> {
    let conn = db.conn.lock().unwrap();
    Ok(conn.execute(
        "DELETE FROM outages WHERE ended_at IS NOT NULL AND ended_at < ?1",
        params![cutoff],
    )?)
}

fn decode_incident_status(s: &str) -> IncidentStatus {
    IncidentStatus::parse(s).unwrap_or(IncidentStatus::Investigating)
}

fn decode_incident_impact(s: &str) -> IncidentImpact {
    IncidentImpact::parse(s).unwrap_or(IncidentImpact::Minor)
}

fn load_incident_children(conn: &rusqlite::Connection, incident: &mut Incident) -> rusqlite::Result<()> {
    let id = incident.id.expect("row always has an id");
    let mut upd_stmt = conn.prepare(
        "SELECT id, incident_id, message, status, created_at FROM incident_updates \
         WHERE incident_id = ?1 ORDER BY created_at ASC",
    )?;
    incident.updates = upd_stmt
        .query_map(params![id], |row| {
            let status_str: String = row.get(3)?;
            Ok(IncidentUpdate {
                id: row.get(0)?,
                incident_id: row.get(1)?,
                message: row.get(2)?,
                status: decode_incident_status(&status_str),
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    let mut mon_stmt = conn.prepare("SELECT monitor_id FROM incident_monitors WHERE incident_id = ?1")?;
    incident.monitor_ids = mon_stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(())
}

/// Incidents not yet resolved, newest first (§4.8 step 8).
pub fn active_incidents(db: &Db) -> Result<Vec<Incident>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, title, status, impact, message, started_at, resolved_at \
         FROM incidents WHERE status != 'resolved' ORDER BY started_at DESC",
    )?;
    let mut incidents: Vec<Incident> = stmt
        .query_map([], |row| {
            let status_str: String = row.get(2)?;
            let impact_str: String = row.get(3)?;
            Ok(Incident {
                id: row.get(0)?,
                title: row.get(1)?,
                status: decode_incident_status(&status_str),
                impact: decode_incident_impact(&impact_str),
                message: row.get(4)?,
                started_at: row.get(5)?,
                resolved_at: row.get(6)?,
                monitor_ids: Vec::new(),
                updates: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    for incident in &mut incidents {
        load_incident_children(&conn, incident)?;
    }
    Ok(incidents)
}

pub fn get_incident(db: &Db, incident_id: IncidentId) -> Result<Option<Incident>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let incident = conn
        .query_row(
            "SELECT id, title, status, impact, message, started_at, resolved_at FROM incidents WHERE id = ?1",
            params![incident_id],
            |row| {
                let status_str: String = row.get(2)?;
                let impact_str: String = row.get(3)?;
                Ok(Incident {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: decode_incident_status(&status_str),
                    impact: decode_incident_impact(&impact_str),
                    message: row.get(4)?,
                    started_at: row.get(5)?,
                    resolved_at: row.get(6)?,
                    monitor_ids: Vec::new(),
                    updates: Vec::new(),
                })
            },
        )
        .optional()?;
    match incident {
        None => Ok(None),
        Some(mut incident) => {
            load_incident_children(&conn, &mut incident)?;
            Ok(Some(incident))
        }
    }
}

/// Read the cached snapshot body for `key`, if present.
pub fn read_snapshot(db: &Db, key: &str) -> Result<Option<String>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let value: Option<String> = conn
        .query_row("SELECT value FROM snapshots WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

/// Overwrite the cached snapshot body for `key` (§4.8, §9 "overwrite-on-write").
pub fn write_snapshot(db: &Db, key: &str, value: &str, generated_at: i64) -> Result<(), StoreError> {
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO snapshots (key, value, generated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, generated_at = excluded.generated_at",
        params![key, value, generated_at],
    )?;
    Ok(())
}
