//! Durable snapshot cache and last-visit marker.
//!
//! Persistence here only speeds things up. Every storage error is logged and
//! swallowed, and the pipeline behaves as on a cold start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::db::DbPool;
use crate::types::snapshot::Snapshot;

pub const CACHE_KEY: &str = "cache";
pub const VISIT_KEY: &str = "visit";

/// String key-value storage holding JSON documents.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// `KvStore` over the `kv` table.
pub struct SqliteKvStore {
    pool: DbPool,
}

impl SqliteKvStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        match conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            [key, value],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Process-local `KvStore`, used when the database cannot be opened.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache {
    pub snapshot: Snapshot,
    pub saved_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitMarker {
    pub snapshot: Snapshot,
    pub visit_at: u64,
}

pub struct SnapshotStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    min_gap: Duration,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl: Duration, min_gap: Duration) -> Self {
        Self {
            kv,
            clock,
            ttl,
            min_gap,
        }
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    pub fn save(&self, snapshot: &Snapshot) {
        let entry = PersistedCache {
            snapshot: snapshot.clone(),
            saved_at: self.clock.now_ms(),
        };
        self.write(CACHE_KEY, &entry);
    }

    /// The cached snapshot if it is at most `ttl` old. An expired entry is
    /// deleted and `None` returned.
    pub fn load(&self) -> Option<Snapshot> {
        let entry: PersistedCache = self.read(CACHE_KEY)?;
        let age = self.clock.now_ms().saturating_sub(entry.saved_at);
        if age > self.ttl.as_millis() as u64 {
            debug!(age_ms = age, "Cached snapshot expired");
            if let Err(e) = self.kv.remove(CACHE_KEY) {
                warn!(key = CACHE_KEY, error = %e, "Failed to drop expired snapshot");
            }
            return None;
        }
        Some(entry.snapshot)
    }

    /// Record `snapshot` as the comparison baseline unless the current marker
    /// is younger than `min_gap`. Returns whether a marker was written.
    pub fn save_visit_marker(&self, snapshot: &Snapshot) -> bool {
        let now = self.clock.now_ms();
        if let Some(marker) = self.load_visit_marker() {
            let age = now.saturating_sub(marker.visit_at);
            if age <= self.min_gap.as_millis() as u64 {
                debug!(age_ms = age, "Visit marker too recent, keeping baseline");
                return false;
            }
        }
        let marker = VisitMarker {
            snapshot: snapshot.clone(),
            visit_at: now,
        };
        self.write(VISIT_KEY, &marker)
    }

    pub fn load_visit_marker(&self) -> Option<VisitMarker> {
        self.read(VISIT_KEY)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Storage read failed");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!(key, error = %e, "Discarding undecodable stored entry"))
            .ok()
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode entry");
                return false;
            }
        };
        match self.kv.set(key, &json) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Storage write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    struct BrokenKvStore;

    impl KvStore for BrokenKvStore {
        fn get(&self, _key: &str) -> Result<Option<String>, String> {
            Err("storage disabled".to_string())
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), String> {
            Err("quota exceeded".to_string())
        }
        fn remove(&self, _key: &str) -> Result<(), String> {
            Err("storage disabled".to_string())
        }
    }

    fn store_with(kv: Arc<dyn KvStore>) -> (SnapshotStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = SnapshotStore::new(kv, clock.clone(), 4 * HOUR, HOUR);
        (store, clock)
    }

    fn sample(bakers: u64) -> Snapshot {
        Snapshot {
            total_bakers: bakers,
            ..Snapshot::default()
        }
    }

    #[test]
    fn load_returns_fresh_snapshot() {
        let (store, clock) = store_with(Arc::new(MemoryKvStore::new()));
        store.save(&sample(350));
        clock.advance(4 * HOUR);
        assert_eq!(store.load(), Some(sample(350)));
    }

    #[test]
    fn load_discards_expired_snapshot() {
        let kv = Arc::new(MemoryKvStore::new());
        let (store, clock) = store_with(kv.clone());
        store.save(&sample(350));
        clock.advance(4 * HOUR + Duration::from_millis(1));
        assert_eq!(store.load(), None);
        assert_eq!(kv.get(CACHE_KEY).unwrap(), None);
    }

    #[test]
    fn load_ignores_garbage() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(CACHE_KEY, "{not json").unwrap();
        let (store, _clock) = store_with(kv);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn visit_marker_respects_min_gap() {
        let (store, clock) = store_with(Arc::new(MemoryKvStore::new()));
        assert!(store.save_visit_marker(&sample(1)));

        clock.advance(Duration::from_secs(60));
        assert!(!store.save_visit_marker(&sample(2)));
        assert_eq!(store.load_visit_marker().unwrap().snapshot, sample(1));

        clock.advance(HOUR);
        assert!(store.save_visit_marker(&sample(3)));
        let marker = store.load_visit_marker().unwrap();
        assert_eq!(marker.snapshot, sample(3));
        assert_eq!(marker.visit_at, clock.now_ms());
    }

    #[test]
    fn broken_storage_is_ignored() {
        let (store, _clock) = store_with(Arc::new(BrokenKvStore));
        store.save(&sample(350));
        assert_eq!(store.load(), None);
        assert!(!store.save_visit_marker(&sample(350)));
        assert_eq!(store.load_visit_marker(), None);
    }

    #[test]
    fn persisted_layout_is_camel_case() {
        let kv = Arc::new(MemoryKvStore::new());
        let (store, clock) = store_with(kv.clone());
        store.save(&sample(7));
        store.save_visit_marker(&sample(7));

        let cache: serde_json::Value =
            serde_json::from_str(&kv.get(CACHE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(cache["savedAt"], clock.now_ms());
        assert_eq!(cache["snapshot"]["totalBakers"], 7);
        let visit: serde_json::Value =
            serde_json::from_str(&kv.get(VISIT_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(visit["visitAt"], clock.now_ms());
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        {
            let pool = db::create_pool(&db_path).unwrap();
            db::init_db(&pool).unwrap();
            let kv = SqliteKvStore::new(pool);
            kv.set(VISIT_KEY, "first").unwrap();
            kv.set(VISIT_KEY, "second").unwrap();
            kv.set(CACHE_KEY, "gone").unwrap();
            kv.remove(CACHE_KEY).unwrap();
        }
        let pool = db::create_pool(&db_path).unwrap();
        let kv = SqliteKvStore::new(pool);
        assert_eq!(kv.get(VISIT_KEY).unwrap(), Some("second".to_string()));
        assert_eq!(kv.get(CACHE_KEY).unwrap(), None);
    }
}
