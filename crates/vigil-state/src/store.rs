//! StateStore: redb-backed snapshot persistence for vigil.
//!
//! The store supports both on-disk and in-memory backends (the latter for
//! testing and as the fallback when the database file cannot be opened).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HEALTH).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Replace the stored snapshot with `snapshot` in one transaction.
    ///
    /// Records for names not present in `snapshot` are removed.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> StateResult<()> {
        let mut encoded = Vec::with_capacity(snapshot.records.len());
        for (name, record) in &snapshot.records {
            let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
            encoded.push((name.as_str(), value));
        }
        let suppression =
            serde_json::to_vec(&snapshot.suppression).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HEALTH).map_err(map_err!(Table))?;
            let stale: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    (!snapshot.records.contains_key(&k)).then_some(k)
                })
                .collect();
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for (name, value) in &encoded {
                table
                    .insert(*name, value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            meta.insert(SUPPRESSION_KEY, suppression.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(records = snapshot.records.len(), "snapshot stored");
        Ok(())
    }

    /// Load the stored snapshot.
    ///
    /// A record that fails to decode, or that violates the streak invariant,
    /// is skipped with a warning so the target starts fresh.
    pub fn load_snapshot(&self) -> StateResult<Snapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALTH).map_err(map_err!(Table))?;

        let mut snapshot = Snapshot::default();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let name = key.value().to_string();
            match serde_json::from_slice::<HealthRecord>(value.value()) {
                Ok(record) if record.is_consistent() => {
                    snapshot.records.insert(name, record);
                }
                Ok(_) => warn!(target_name = %name, "inconsistent health record ignored"),
                Err(e) => warn!(target_name = %name, error = %e, "corrupt health record ignored"),
            }
        }

        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        if let Some(guard) = meta.get(SUPPRESSION_KEY).map_err(map_err!(Read))? {
            match serde_json::from_slice::<SuppressionState>(guard.value()) {
                Ok(s) => snapshot.suppression = s,
                Err(e) => warn!(error = %e, "corrupt suppression state ignored"),
            }
        }

        Ok(snapshot)
    }

    /// Get a single record by target name.
    pub fn get_record(&self, name: &str) -> StateResult<Option<HealthRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALTH).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: HealthRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Write raw bytes for a record. Only used to simulate corruption in tests.
    #[cfg(test)]
    fn put_raw_record(&self, name: &str, bytes: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HEALTH).map_err(map_err!(Table))?;
            table.insert(name, bytes).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down_record(fail_streak: u32, last_alert_at: u64) -> HealthRecord {
        HealthRecord {
            status: HealthStatus::Down,
            fail_streak,
            ok_streak: 0,
            last_alert_at,
            last_reminder_at: last_alert_at,
        }
    }

    fn snapshot_of(records: &[(&str, HealthRecord)]) -> Snapshot {
        Snapshot {
            records: records
                .iter()
                .map(|(name, r)| (name.to_string(), r.clone()))
                .collect(),
            suppression: SuppressionState::default(),
        }
    }

    #[test]
    fn empty_store_loads_empty_snapshot() {
        let store = StateStore::open_in_memory().unwrap();
        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn snapshot_save_and_load() {
        let store = StateStore::open_in_memory().unwrap();
        let mut snapshot = snapshot_of(&[
            ("core-switch", down_record(4, 1000)),
            ("nvr", HealthRecord::default()),
        ]);
        snapshot.suppression = SuppressionState {
            storm_until: 1900,
            global_suppress_until: 1600,
        };

        store.save_snapshot(&snapshot).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), snapshot);
        assert_eq!(
            store.get_record("core-switch").unwrap(),
            Some(down_record(4, 1000))
        );
    }

    #[test]
    fn save_drops_targets_no_longer_configured() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .save_snapshot(&snapshot_of(&[
                ("a", HealthRecord::default()),
                ("b", HealthRecord::default()),
            ]))
            .unwrap();
        store
            .save_snapshot(&snapshot_of(&[("a", down_record(3, 50))]))
            .unwrap();

        let loaded = store.load_snapshot().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(store.get_record("b").unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .save_snapshot(&snapshot_of(&[("good", down_record(3, 10))]))
            .unwrap();
        store.put_raw_record("bad", b"{not json").unwrap();

        let loaded = store.load_snapshot().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(loaded.records.contains_key("good"));
        assert!(matches!(
            store.get_record("bad"),
            Err(StateError::Deserialize(_))
        ));
    }

    #[test]
    fn inconsistent_record_is_skipped() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_raw_record(
                "odd",
                br#"{"status":"up","fail_streak":2,"ok_streak":2,"last_alert_at":0,"last_reminder_at":0}"#,
            )
            .unwrap();
        assert!(store.load_snapshot().unwrap().records.is_empty());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.redb");

        let snapshot = snapshot_of(&[("core-switch", down_record(5, 777))]);
        {
            let store = StateStore::open(&path).unwrap();
            store.save_snapshot(&snapshot).unwrap();
        }

        let reopened = StateStore::open(&path).unwrap();
        assert_eq!(reopened.load_snapshot().unwrap(), snapshot);
    }
}
