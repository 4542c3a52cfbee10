//! Settings singleton (§3, §10.1): core-semantics configuration
//! (dampening thresholds, retention days, uptime rating level) lives in the
//! `settings` table, not the environment, and is loaded fresh at the top of
//! each tick/rollup run.

use rusqlite::OptionalExtension;

use crate::db::Db;
use crate::error::StoreError;
use crate::models::Settings;

const SETTINGS_KEY: &str = "settings";

pub fn load(db: &Db) -> Result<Settings, StoreError> {
    let conn = db.conn.lock().unwrap();
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            rusqlite::params![SETTINGS_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Settings::default()),
    }
}

pub fn save(db: &Db, settings: &Settings, now: i64) -> Result<(), StoreError> {
    let conn = db.conn.lock().unwrap();
    let json = serde_json::to_string(settings)?;
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![SETTINGS_KEY, json, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_yields_defaults() {
        let db = Db::new(":memory:").unwrap();
        let settings = load(&db).unwrap();
        assert_eq!(settings.state_failures_to_down_from_up, 2);
    }

    #[test]
    fn round_trips_through_save() {
        let db = Db::new(":memory:").unwrap();
        let mut settings = Settings::default();
        settings.site_title = "Acme Status".to_string();
        settings.retention_check_results_days = 30;
        save(&db, &settings, 1000).unwrap();

        let loaded = load(&db).unwrap();
        assert_eq!(loaded.site_title, "Acme Status");
        assert_eq!(loaded.retention_check_results_days, 30);
    }
}
