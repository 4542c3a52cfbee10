//! Public status composer (§4.8): assembles the read-only status payload
//! from live monitor state, recent heartbeats, and pre-rolled daily
//! aggregates, honoring the maintenance overlay and staleness mapping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::error::StoreError;
use crate::maintenance;
use crate::models::{
    CheckResult, Incident, IncidentImpact, MaintenanceWindow, Monitor, MonitorId, MonitorStatus,
    MonitorType, Settings, UnixSeconds,
};
use crate::store;

const HEARTBEAT_WINDOW: i64 = 60;
const ROLLUP_WINDOW_DAYS: i64 = 30;
const DAY_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerStatus {
    Operational,
    PartialOutage,
    MajorOutage,
    Maintenance,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerSource {
    Incident,
    Maintenance,
    Monitors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallBanner {
    pub source: BannerSource,
    pub status: BannerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uptime30d {
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMonitor {
    pub id: MonitorId,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub effective_status: MonitorStatus,
    pub is_stale: bool,
    pub last_checked_at: Option<UnixSeconds>,
    pub last_changed_at: Option<UnixSeconds>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub heartbeats: Vec<CheckResult>,
    pub uptime_30d: Uptime30d,
    pub uptime_rating_level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSection {
    pub active: Vec<MaintenanceWindow>,
    pub upcoming: Vec<MaintenanceWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub generated_at: UnixSeconds,
    pub overall: OverallBanner,
    pub monitors: Vec<StatusMonitor>,
    pub counts: HashMap<String, i64>,
    pub incidents: Vec<Incident>,
    pub maintenance: MaintenanceSection,
}

/// Assemble the full public status payload as of `now` (§4.8).
pub fn compose(db: &Db, now: i64) -> Result<StatusResponse, StoreError> {
    let settings = crate::settings::load(db)?;
    let monitor_ids = store::all_monitor_ids(db)?;
    let active_maintenance = maintenance::active_windows(db, now)?;
    let upcoming_maintenance = maintenance::upcoming_windows(db, now, 10)?;

    let mut monitors_under_maintenance: std::collections::HashSet<MonitorId> = std::collections::HashSet::new();
    for window in &active_maintenance {
        for id in &window.monitor_ids {
            monitors_under_maintenance.insert(*id);
        }
    }

    let mut status_monitors = Vec::with_capacity(monitor_ids.len());
    let mut counts: HashMap<String, i64> = HashMap::new();

    for monitor_id in &monitor_ids {
        let monitor = store::get_monitor(db, *monitor_id)?;
        let state = store::get_state(db, *monitor_id)?;
        let in_maintenance = monitors_under_maintenance.contains(monitor_id);

        let (effective_status, is_stale) = effective_status(&monitor, &state, in_maintenance, now);
        *counts.entry(effective_status.as_str().to_string()).or_insert(0) += 1;

        let heartbeats = store::recent_heartbeats(db, *monitor_id, HEARTBEAT_WINDOW)?;
        let since = now - ROLLUP_WINDOW_DAYS * DAY_SECONDS;
        let rollups = store::rollups_since(db, *monitor_id, since)?;
        let uptime_30d = summarize_rollups(&rollups);

        status_monitors.push(StatusMonitor {
            id: monitor.id,
            name: monitor.name,
            monitor_type: monitor.monitor_type,
            effective_status,
            is_stale,
            last_checked_at: state.last_checked_at,
            last_changed_at: state.last_changed_at,
            last_latency_ms: state.last_latency_ms,
            last_error: state.last_error,
            heartbeats,
            uptime_30d,
            uptime_rating_level: settings.uptime_rating_level,
        });
    }

    let incidents = store::active_incidents(db)?;
    let overall = overall_banner(&incidents, &active_maintenance, &status_monitors);

    Ok(StatusResponse {
        generated_at: now,
        overall,
        monitors: status_monitors,
        counts,
        incidents,
        maintenance: MaintenanceSection {
            active: active_maintenance,
            upcoming: upcoming_maintenance,
        },
    })
}

fn effective_status(
    monitor: &Monitor,
    state: &crate::models::MonitorState,
    in_maintenance: bool,
    now: i64,
) -> (MonitorStatus, bool) {
    if in_maintenance && state.status != MonitorStatus::Paused {
        return (MonitorStatus::Maintenance, false);
    }

    let stale = matches!(state.status, MonitorStatus::Up | MonitorStatus::Down)
        && state
            .last_checked_at
            .map(|t| now - t > 3 * monitor.interval_sec)
            .unwrap_or(false);

    if stale {
        (MonitorStatus::Unknown, true)
    } else {
        (state.status, false)
    }
}

fn summarize_rollups(rollups: &[crate::models::MonitorDailyRollup]) -> Uptime30d {
    let mut total_sec = 0;
    let mut downtime_sec = 0;
    let mut unknown_sec = 0;
    let mut uptime_sec = 0;
    for r in rollups {
        total_sec += r.total_sec;
        downtime_sec += r.downtime_sec;
        unknown_sec += r.unknown_sec;
        uptime_sec += r.uptime_sec;
    }
    let denom = (total_sec - unknown_sec).max(1);
    let uptime_pct = if rollups.is_empty() {
        None
    } else {
        Some(uptime_sec as f64 / denom as f64 * 100.0)
    };
    Uptime30d {
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
        uptime_pct,
    }
}

fn overall_banner(
    incidents: &[Incident],
    active_maintenance: &[MaintenanceWindow],
    monitors: &[StatusMonitor],
) -> OverallBanner {
    if !incidents.is_empty() {
        let max_impact = incidents.iter().map(|i| i.impact).max().unwrap_or(IncidentImpact::None);
        let status = match max_impact {
            IncidentImpact::Critical | IncidentImpact::Major => BannerStatus::MajorOutage,
            IncidentImpact::Minor => BannerStatus::PartialOutage,
            IncidentImpact::None => BannerStatus::Operational,
        };
        return OverallBanner {
            source: BannerSource::Incident,
            status,
        };
    }

    if !active_maintenance.is_empty() {
        return OverallBanner {
            source: BannerSource::Maintenance,
            status: BannerStatus::Maintenance,
        };
    }

    let total = monitors.len();
    let down = monitors
        .iter()
        .filter(|m| m.effective_status == MonitorStatus::Down)
        .count();
    let all_unknown = total > 0
        && monitors
            .iter()
            .all(|m| m.effective_status == MonitorStatus::Unknown);

    let status = if all_unknown {
        BannerStatus::Unknown
    } else {
        let down_ratio = down as f64 / total.max(1) as f64;
        if down_ratio >= 0.5 {
            BannerStatus::MajorOutage
        } else if down > 0 {
            BannerStatus::PartialOutage
        } else {
            BannerStatus::Operational
        }
    };

    OverallBanner {
        source: BannerSource::Monitors,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use rusqlite::params;

    fn seed_monitor(db: &Db, name: &str, interval_sec: i64, created_at: i64) -> MonitorId {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO monitors (name, type, target, interval_sec, timeout_ms, http_method, is_active, created_at, updated_at) \
             VALUES (?1, 'http', 'http://e/ok', ?2, 5000, 'GET', 1, ?3, ?3)",
            params![name, interval_sec, created_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_state(db: &Db, monitor_id: MonitorId, status: &str, last_checked_at: i64) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO monitor_state (monitor_id, status, last_checked_at, last_changed_at, consecutive_failures, consecutive_successes) \
             VALUES (?1, ?2, ?3, ?3, 0, 1)",
            params![monitor_id, status, last_checked_at],
        )
        .unwrap();
    }

    #[test]
    fn stale_up_monitor_displays_unknown() {
        let db = Db::new(":memory:").unwrap();
        let id = seed_monitor(&db, "api", 60, 0);
        seed_state(&db, id, "up", 0);

        let response = compose(&db, 300).unwrap();
        let m = &response.monitors[0];
        assert_eq!(m.effective_status, MonitorStatus::Unknown);
        assert!(m.is_stale);
    }

    #[test]
    fn fresh_up_monitor_with_no_incidents_is_operational() {
        let db = Db::new(":memory:").unwrap();
        let id = seed_monitor(&db, "api", 60, 0);
        seed_state(&db, id, "up", 100);

        let response = compose(&db, 110).unwrap();
        assert_eq!(response.overall.status, BannerStatus::Operational);
        assert_eq!(response.overall.source, BannerSource::Monitors);
    }

    #[test]
    fn active_maintenance_overrides_down_state() {
        let db = Db::new(":memory:").unwrap();
        let id = seed_monitor(&db, "api", 60, 0);
        seed_state(&db, id, "down", 100);
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO maintenance_windows (title, message, starts_at, ends_at, created_at) VALUES ('patch', NULL, 0, 1000, 0)",
                [],
            )
            .unwrap();
            let window_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO maintenance_window_monitors (maintenance_window_id, monitor_id) VALUES (?1, ?2)",
                params![window_id, id],
            )
            .unwrap();
        }

        let response = compose(&db, 200).unwrap();
        assert_eq!(response.monitors[0].effective_status, MonitorStatus::Maintenance);
        assert_eq!(response.overall.source, BannerSource::Maintenance);
    }

    #[test]
    fn majority_down_triggers_major_outage() {
        let db = Db::new(":memory:").unwrap();
        let a = seed_monitor(&db, "a", 60, 0);
        let b = seed_monitor(&db, "b", 60, 0);
        seed_state(&db, a, "down", 100);
        seed_state(&db, b, "down", 100);

        let response = compose(&db, 110).unwrap();
        assert_eq!(response.overall.status, BannerStatus::MajorOutage);
    }
}
