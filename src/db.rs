use rusqlite::{Connection, Result};
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'http',
                target TEXT NOT NULL,
                interval_sec INTEGER NOT NULL DEFAULT 60,
                timeout_ms INTEGER NOT NULL DEFAULT 10000,
                http_method TEXT NOT NULL DEFAULT 'GET',
                http_headers TEXT,
                http_body TEXT,
                expected_status TEXT,
                response_keyword TEXT,
                response_forbidden_keyword TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_monitors_active ON monitors(is_active);

            CREATE TABLE IF NOT EXISTS monitor_state (
                monitor_id INTEGER PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'unknown',
                last_checked_at INTEGER,
                last_changed_at INTEGER,
                last_latency_ms INTEGER,
                last_error TEXT,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_successes INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS check_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                checked_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                latency_ms INTEGER,
                http_status INTEGER,
                error TEXT,
                location TEXT,
                attempt INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_check_results_monitor_time
                ON check_results(monitor_id, checked_at DESC);

            CREATE TABLE IF NOT EXISTS outages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                initial_error TEXT,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_outages_monitor_open
                ON outages(monitor_id, ended_at);

            CREATE TABLE IF NOT EXISTS monitor_daily_rollups (
                monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                day_start_at INTEGER NOT NULL,
                total_sec INTEGER NOT NULL DEFAULT 0,
                downtime_sec INTEGER NOT NULL DEFAULT 0,
                unknown_sec INTEGER NOT NULL DEFAULT 0,
                uptime_sec INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (monitor_id, day_start_at)
            );

            CREATE TABLE IF NOT EXISTS maintenance_windows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                message TEXT,
                starts_at INTEGER NOT NULL,
                ends_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_maintenance_active
                ON maintenance_windows(starts_at, ends_at);

            CREATE TABLE IF NOT EXISTS maintenance_window_monitors (
                maintenance_window_id INTEGER NOT NULL REFERENCES maintenance_windows(id) ON DELETE CASCADE,
                monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                PRIMARY KEY (maintenance_window_id, monitor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_mwm_monitor ON maintenance_window_monitors(monitor_id);

            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'investigating',
                impact TEXT NOT NULL DEFAULT 'minor',
                message TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                resolved_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_started ON incidents(started_at DESC);

            CREATE TABLE IF NOT EXISTS incident_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_incident_updates_incident
                ON incident_updates(incident_id, created_at ASC);

            CREATE TABLE IF NOT EXISTS incident_monitors (
                incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                PRIMARY KEY (incident_id, monitor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_im_monitor ON incident_monitors(monitor_id);

            CREATE TABLE IF NOT EXISTS notification_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                config TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notification_deliveries (
                channel_id INTEGER NOT NULL REFERENCES notification_channels(id) ON DELETE CASCADE,
                event_key TEXT NOT NULL,
                status TEXT NOT NULL,
                http_status INTEGER,
                error TEXT,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (channel_id, event_key)
            );

            CREATE TABLE IF NOT EXISTS leases (
                name TEXT PRIMARY KEY,
                owner TEXT,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                generated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;

        // response_forbidden_keyword/expected_status predate the initial bundled CREATE in
        // earlier schema revisions; harmless if the column already exists.
        conn.execute_batch(
            "ALTER TABLE monitors ADD COLUMN response_forbidden_keyword TEXT;",
        )
        .ok();

        Ok(())
    }
}
