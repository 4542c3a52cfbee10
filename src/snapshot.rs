//! Snapshot cache (§4.8, §9): a single persisted row holding the last
//! composed public status payload. Overwrite-on-refresh, last-writer-wins —
//! no invalidation protocol, per the design notes.

use crate::db::Db;
use crate::error::StoreError;
use crate::status::{self, StatusResponse};
use crate::store;

const SNAPSHOT_KEY: &str = "public_status";

/// Recompose the public status payload and overwrite the cached row.
pub fn refresh(db: &Db, now: i64) -> Result<StatusResponse, StoreError> {
    let response = status::compose(db, now)?;
    let json = serde_json::to_string(&response)?;
    store::write_snapshot(db, SNAPSHOT_KEY, &json, now)?;
    Ok(response)
}

/// Read the cached payload, recomposing on the spot if the cache is empty
/// (cold start — before the first tick has ever refreshed it).
pub fn read_or_compose(db: &Db, now: i64) -> Result<StatusResponse, StoreError> {
    match store::read_snapshot(db, SNAPSHOT_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => refresh(db, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[test]
    fn cold_cache_composes_on_demand() {
        let db = Db::new(":memory:").unwrap();
        let response = read_or_compose(&db, 1000).unwrap();
        assert_eq!(response.generated_at, 1000);
    }

    #[test]
    fn refresh_overwrites_the_cached_row() {
        let db = Db::new(":memory:").unwrap();
        refresh(&db, 1000).unwrap();
        refresh(&db, 2000).unwrap();
        let response = read_or_compose(&db, 9999).unwrap();
        assert_eq!(response.generated_at, 2000);
    }
}
