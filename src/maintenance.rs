//! Maintenance window lookups (§4.7): suppression of due monitors and
//! range-based emission of `maintenance.started`/`maintenance.ended` events.

use std::collections::HashSet;

use rusqlite::params;

use crate::db::Db;
use crate::error::StoreError;
use crate::models::{MaintenanceWindow, MonitorId};

/// The subset of `monitor_ids` currently covered by an active maintenance
/// window at time `t` (`starts_at <= t < ends_at`).
pub fn suppressed_monitor_ids(
    db: &Db,
    monitor_ids: &[MonitorId],
    t: i64,
) -> Result<HashSet<MonitorId>, StoreError> {
    if monitor_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let conn = db.conn.lock().unwrap();
    let placeholders = monitor_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT DISTINCT mwm.monitor_id FROM maintenance_window_monitors mwm
         JOIN maintenance_windows mw ON mw.id = mwm.maintenance_window_id
         WHERE mwm.monitor_id IN ({placeholders}) AND mw.starts_at <= ?{next} AND mw.ends_at > ?{next}",
        next = monitor_ids.len() + 1
    );
    let mut params: Vec<&dyn rusqlite::ToSql> = monitor_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    params.push(&t);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, MonitorId>(0))?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row?);
    }
    Ok(out)
}

/// Maintenance windows whose `starts_at` falls in `[a, b]` (for
/// `maintenance.started` emission).
pub fn windows_starting_in(db: &Db, a: i64, b: i64) -> Result<Vec<MaintenanceWindow>, StoreError> {
    windows_in_range(db, "starts_at", a, b)
}

/// Maintenance windows whose `ends_at` falls in `[a, b]` (for
/// `maintenance.ended` emission).
pub fn windows_ending_in(db: &Db, a: i64, b: i64) -> Result<Vec<MaintenanceWindow>, StoreError> {
    windows_in_range(db, "ends_at", a, b)
}

fn windows_in_range(db: &Db, column: &str, a: i64, b: i64) -> Result<Vec<MaintenanceWindow>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!(
        "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows \
         WHERE {column} >= ?1 AND {column} <= ?2 ORDER BY {column} ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut windows: Vec<MaintenanceWindow> = stmt
        .query_map(params![a, b], |row| {
            Ok(MaintenanceWindow {
                id: row.get(0)?,
                title: row.get(1)?,
                message: row.get(2)?,
                starts_at: row.get(3)?,
                ends_at: row.get(4)?,
                created_at: row.get(5)?,
                monitor_ids: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;

    for window in &mut windows {
        let id = window.id.expect("row always has an id");
        let mut mon_stmt = conn.prepare(
            "SELECT monitor_id FROM maintenance_window_monitors WHERE maintenance_window_id = ?1",
        )?;
        window.monitor_ids = mon_stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
    }
    Ok(windows)
}

/// Maintenance intervals for one monitor overlapping `[range_start, range_end)`,
/// clipped to that range and merged into a sorted, non-overlapping list. Used
/// by the daily rollup to reclassify maintenance time as `unknown_sec` (§4.9,
/// §4.2's "maintenance is a read-time overlay" rule).
pub fn overlapping_intervals(
    db: &Db,
    monitor_id: MonitorId,
    range_start: i64,
    range_end: i64,
) -> Result<Vec<(i64, i64)>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT mw.starts_at, mw.ends_at FROM maintenance_windows mw
         JOIN maintenance_window_monitors mwm ON mwm.maintenance_window_id = mw.id
         WHERE mwm.monitor_id = ?1 AND mw.starts_at < ?3 AND mw.ends_at > ?2
         ORDER BY mw.starts_at ASC",
    )?;
    let raw: Vec<(i64, i64)> = stmt
        .query_map(params![monitor_id, range_start, range_end], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<_, _>>()?;

    let mut merged: Vec<(i64, i64)> = Vec::new();
    for (s, e) in raw {
        let s = s.max(range_start);
        let e = e.min(range_end);
        if e <= s {
            continue;
        }
        match merged.last_mut() {
            Some((_, last_end)) if s <= *last_end => {
                *last_end = (*last_end).max(e);
            }
            _ => merged.push((s, e)),
        }
    }
    Ok(merged)
}

/// Windows active right now (`starts_at <= now < ends_at`), for the public
/// status composer (§4.8).
pub fn active_windows(db: &Db, now: i64) -> Result<Vec<MaintenanceWindow>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows \
         WHERE starts_at <= ?1 AND ends_at > ?1 ORDER BY starts_at ASC",
    )?;
    let mut windows: Vec<MaintenanceWindow> = stmt
        .query_map(params![now], |row| {
            Ok(MaintenanceWindow {
                id: row.get(0)?,
                title: row.get(1)?,
                message: row.get(2)?,
                starts_at: row.get(3)?,
                ends_at: row.get(4)?,
                created_at: row.get(5)?,
                monitor_ids: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    for window in &mut windows {
        let id = window.id.expect("row always has an id");
        let mut mon_stmt = conn.prepare(
            "SELECT monitor_id FROM maintenance_window_monitors WHERE maintenance_window_id = ?1",
        )?;
        window.monitor_ids = mon_stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
    }
    Ok(windows)
}

/// Upcoming windows (`starts_at > now`), ascending, truncated to `limit`
/// (§4.8 step 8).
pub fn upcoming_windows(db: &Db, now: i64, limit: usize) -> Result<Vec<MaintenanceWindow>, StoreError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows \
         WHERE starts_at > ?1 ORDER BY starts_at ASC LIMIT ?2",
    )?;
    let mut windows: Vec<MaintenanceWindow> = stmt
        .query_map(params![now, limit as i64], |row| {
            Ok(MaintenanceWindow {
                id: row.get(0)?,
                title: row.get(1)?,
                message: row.get(2)?,
                starts_at: row.get(3)?,
                ends_at: row.get(4)?,
                created_at: row.get(5)?,
                monitor_ids: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    for window in &mut windows {
        let id = window.id.expect("row always has an id");
        let mut mon_stmt = conn.prepare(
            "SELECT monitor_id FROM maintenance_window_monitors WHERE maintenance_window_id = ?1",
        )?;
        window.monitor_ids = mon_stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn seed_window(db: &Db, title: &str, starts_at: i64, ends_at: i64, monitor_ids: &[i64]) -> i64 {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO maintenance_windows (title, message, starts_at, ends_at, created_at) VALUES (?1, NULL, ?2, ?3, ?4)",
            params![title, starts_at, ends_at, starts_at],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        for mid in monitor_ids {
            conn.execute(
                "INSERT INTO maintenance_window_monitors (maintenance_window_id, monitor_id) VALUES (?1, ?2)",
                params![id, mid],
            )
            .unwrap();
        }
        id
    }

    #[test]
    fn suppresses_only_monitors_in_active_window() {
        let db = Db::new(":memory:").unwrap();
        seed_window(&db, "patch", 100, 200, &[1, 2]);

        let suppressed = suppressed_monitor_ids(&db, &[1, 2, 3], 150).unwrap();
        assert!(suppressed.contains(&1));
        assert!(suppressed.contains(&2));
        assert!(!suppressed.contains(&3));

        let none = suppressed_monitor_ids(&db, &[1, 2, 3], 250).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn range_queries_find_boundary_events() {
        let db = Db::new(":memory:").unwrap();
        seed_window(&db, "patch", 500, 600, &[1]);

        let starting = windows_starting_in(&db, 400, 500).unwrap();
        assert_eq!(starting.len(), 1);
        let ending = windows_ending_in(&db, 600, 700).unwrap();
        assert_eq!(ending.len(), 1);
        let none = windows_starting_in(&db, 0, 100).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn overlapping_intervals_are_clipped_and_merged() {
        let db = Db::new(":memory:").unwrap();
        seed_window(&db, "a", 50, 150, &[1]);
        seed_window(&db, "b", 140, 300, &[1]);
        seed_window(&db, "c", 900, 1000, &[1]);

        let merged = overlapping_intervals(&db, 1, 0, 400).unwrap();
        assert_eq!(merged, vec![(50, 300)]);
    }
}
