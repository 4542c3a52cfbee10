//! Daily rollup & retention (§4.9): bucket the previous UTC day's check
//! results into a per-monitor aggregate, then prune old raw data.

use crate::db::Db;
use crate::error::{LeaseError, RollupError};
use crate::lease;
use crate::maintenance;
use crate::models::{CheckStatus, MonitorDailyRollup};
use crate::store;

const DAY_SECONDS: i64 = 86_400;
const ROLLUP_LEASE_NAME: &str = "rollup:daily";
const RESOLVED_OUTAGE_RETENTION_DAYS: i64 = 365;

/// Run the nightly batch for the UTC day immediately preceding `now`.
/// Returns `Ok(None)` if the lease was not acquired (another runner holds it).
pub async fn run(db: &Db, now: i64, lease_seconds: i64, retention_days: i64) -> Result<Option<RollupSummary>, RollupError> {
    match lease::acquire_lease(db, ROLLUP_LEASE_NAME, now, lease_seconds) {
        Ok(()) => {}
        Err(LeaseError::NotAcquired) => {
            println!("rollup: lease '{ROLLUP_LEASE_NAME}' not acquired, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let today_start = floor_to_day(now);
    let day_start = today_start - DAY_SECONDS;
    let day_end = today_start;

    let mut monitors_rolled = 0;
    for monitor_id in store::all_monitor_ids(db)? {
        let rollup = rollup_one_day(db, monitor_id, day_start, day_end)?;
        store::upsert_rollup(db, &rollup)?;
        monitors_rolled += 1;
    }

    let check_results_cutoff = now - retention_days * DAY_SECONDS;
    let deleted_checks = store::delete_check_results_older_than(db, check_results_cutoff)?;

    let outage_cutoff = now - RESOLVED_OUTAGE_RETENTION_DAYS * DAY_SECONDS;
    let deleted_outages = store::delete_resolved_outages_older_than(db, outage_cutoff)?;

    println!(
        "rollup: day_start={day_start} monitors={monitors_rolled} deleted_check_results={deleted_checks} deleted_outages={deleted_outages}"
    );

    Ok(Some(RollupSummary {
        day_start,
        monitors_rolled,
        deleted_check_results: deleted_checks,
        deleted_outages,
    }))
}

#[derive(Debug, Clone, Copy)]
pub struct RollupSummary {
    pub day_start: i64,
    pub monitors_rolled: usize,
    pub deleted_check_results: usize,
    pub deleted_outages: usize,
}

fn floor_to_day(t: i64) -> i64 {
    t - t.rem_euclid(DAY_SECONDS)
}

fn rollup_one_day(db: &Db, monitor_id: i64, day_start: i64, day_end: i64) -> Result<MonitorDailyRollup, RollupError> {
    let mut spans = store::check_spans(db, monitor_id, day_start, day_end)?;

    if let Some(before) = store::last_check_before(db, monitor_id, day_start)? {
        spans.insert(0, store::CheckSpan { checked_at: day_start, status: before.status });
    }

    // Maintenance is never the stored check status (§4.2); reclassify any
    // second that falls inside an active window as unknown regardless of
    // the probe's literal outcome (§9 open question resolution).
    let maintenance_intervals = maintenance::overlapping_intervals(db, monitor_id, day_start, day_end)?;

    let mut downtime_sec = 0i64;
    let mut unknown_sec = 0i64;
    let mut uptime_sec = 0i64;

    for i in 0..spans.len() {
        let start = spans[i].checked_at.max(day_start);
        let end = if i + 1 < spans.len() {
            spans[i + 1].checked_at.min(day_end)
        } else {
            day_end
        };
        if end <= start {
            continue;
        }

        let (in_maintenance_sec, outside_sec) = split_against_maintenance(start, end, &maintenance_intervals);
        unknown_sec += in_maintenance_sec;
        if outside_sec > 0 {
            match spans[i].status {
                CheckStatus::Down => downtime_sec += outside_sec,
                CheckStatus::Unknown | CheckStatus::Maintenance => unknown_sec += outside_sec,
                CheckStatus::Up => uptime_sec += outside_sec,
            }
        }
    }

    let total_sec = downtime_sec + unknown_sec + uptime_sec;

    Ok(MonitorDailyRollup {
        monitor_id,
        day_start_at: day_start,
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
    })
}

/// Split `[start, end)` into seconds covered by `intervals` (sorted, merged,
/// non-overlapping) and seconds outside them.
fn split_against_maintenance(start: i64, end: i64, intervals: &[(i64, i64)]) -> (i64, i64) {
    let mut in_maintenance = 0i64;
    let mut cursor = start;
    for &(ms, me) in intervals {
        if me <= cursor {
            continue;
        }
        if ms >= end {
            break;
        }
        let seg_start = ms.max(cursor);
        let seg_end = me.min(end);
        if seg_end > seg_start {
            in_maintenance += seg_end - seg_start;
            cursor = seg_end;
        }
    }
    let total = end - start;
    (in_maintenance, total - in_maintenance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use rusqlite::params;

    fn seed_monitor(db: &Db) -> i64 {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO monitors (name, type, target, interval_sec, timeout_ms, http_method, is_active, created_at, updated_at) \
             VALUES ('api', 'http', 'http://e/ok', 60, 5000, 'GET', 1, 0, 0)",
            [],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_check(db: &Db, monitor_id: i64, checked_at: i64, status: &str) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO check_results (monitor_id, checked_at, status, attempt) VALUES (?1, ?2, ?3, 1)",
            params![monitor_id, checked_at, status],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn full_day_of_up_checks_yields_full_uptime() {
        let db = Db::new(":memory:").unwrap();
        let monitor_id = seed_monitor(&db);
        // Previous UTC day is [0, 86400). Seed one check at the start.
        seed_check(&db, monitor_id, 0, "up");

        run(&db, DAY_SECONDS + 10, 600, 90).await.unwrap();

        let rollups = store::rollups_since(&db, monitor_id, 0).unwrap();
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].uptime_sec, DAY_SECONDS);
        assert_eq!(rollups[0].downtime_sec, 0);
    }

    #[tokio::test]
    async fn down_span_is_attributed_to_downtime() {
        let db = Db::new(":memory:").unwrap();
        let monitor_id = seed_monitor(&db);
        seed_check(&db, monitor_id, 0, "up");
        seed_check(&db, monitor_id, 43_200, "down");

        run(&db, DAY_SECONDS + 10, 600, 90).await.unwrap();

        let rollups = store::rollups_since(&db, monitor_id, 0).unwrap();
        assert_eq!(rollups[0].uptime_sec, 43_200);
        assert_eq!(rollups[0].downtime_sec, 43_200);
        assert_eq!(rollups[0].total_sec, DAY_SECONDS);
    }

    #[tokio::test]
    async fn retention_deletes_old_check_results() {
        let db = Db::new(":memory:").unwrap();
        let monitor_id = seed_monitor(&db);
        seed_check(&db, monitor_id, 0, "up");

        let far_future = 200 * DAY_SECONDS;
        run(&db, far_future, 600, 90).await.unwrap();

        let spans = store::check_spans(&db, monitor_id, -1, far_future).unwrap();
        assert!(spans.is_empty());
    }

    #[tokio::test]
    async fn second_run_within_lease_window_is_skipped() {
        let db = Db::new(":memory:").unwrap();
        let first = run(&db, DAY_SECONDS + 10, 600, 90).await.unwrap();
        assert!(first.is_some());
        let second = run(&db, DAY_SECONDS + 20, 600, 90).await.unwrap();
        assert!(second.is_none());
    }
}
