//! StateStore: redb-backed local cluster-state cache.
//!
//! Provides typed CRUD operations over instances, owned workloads, pods and
//! events. All values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use brokerop_core::labels;
use brokerop_core::{
    ClusterError, ClusterResult, Event, EventRecorder, EventType, Instance, Labels, Pod,
    ResourceReader, StatusWriter, Workload,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

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
    /// Disambiguates events recorded within the same second.
    event_seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_db(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            event_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(STATEFUL_SETS).map_err(map_err!(Table))?;
        txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
        txn.open_table(PODS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan_json<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or replace an instance. Returns the stored resource version.
    pub fn put_instance(&self, instance: &Instance) -> StateResult<u64> {
        let key = instance.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let version;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let stored: Option<Instance> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };
            version = stored.map_or(0, |s| s.meta.resource_version) + 1;

            let mut next = instance.clone();
            next.meta.resource_version = version;
            let bytes = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version, "instance stored");
        Ok(version)
    }

    /// Get an instance by `{namespace}/{name}` key.
    pub fn get_instance(&self, key: &str) -> StateResult<Option<Instance>> {
        self.get_json(INSTANCES, key)
    }

    /// List all instances.
    pub fn list_instances(&self) -> StateResult<Vec<Instance>> {
        self.scan_json(INSTANCES, "")
    }

    /// Delete an instance and its events. Returns true if it existed.
    pub fn delete_instance(&self, key: &str) -> StateResult<bool> {
        let existed = self.remove(INSTANCES, key)?;
        let events = self.event_keys(&format!("{key}:"))?;
        for event_key in &events {
            self.remove(EVENTS, event_key)?;
        }
        debug!(%key, existed, events = events.len(), "instance deleted");
        Ok(existed)
    }

    /// Replace only the status of a stored instance.
    ///
    /// The caller's `resource_version` must match the stored one; the stored
    /// version is bumped on success.
    pub fn write_status(&self, instance: &Instance) -> StateResult<u64> {
        let key = instance.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let version;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut stored: Instance = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key)),
            };

            if stored.meta.resource_version != instance.meta.resource_version {
                return Err(StateError::Conflict {
                    key,
                    stored: stored.meta.resource_version,
                    seen: instance.meta.resource_version,
                });
            }

            stored.status = instance.status.clone();
            stored.meta.resource_version += 1;
            version = stored.meta.resource_version;
            let bytes = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version, "instance status written");
        Ok(version)
    }

    // ── Owned workloads ────────────────────────────────────────────

    /// Insert or update a stateful set.
    pub fn put_stateful_set(&self, workload: &Workload) -> StateResult<()> {
        self.put_json(STATEFUL_SETS, &workload.meta.table_key(), workload)
    }

    /// Insert or update a replica set.
    pub fn put_replica_set(&self, workload: &Workload) -> StateResult<()> {
        self.put_json(REPLICA_SETS, &workload.meta.table_key(), workload)
    }

    pub fn delete_stateful_set(&self, key: &str) -> StateResult<bool> {
        self.remove(STATEFUL_SETS, key)
    }

    pub fn delete_replica_set(&self, key: &str) -> StateResult<bool> {
        self.remove(REPLICA_SETS, key)
    }

    fn select_workloads(
        &self,
        table: Table,
        namespace: &str,
        selector: &Labels,
    ) -> StateResult<Vec<Workload>> {
        let all: Vec<Workload> = self.scan_json(table, &format!("{namespace}/"))?;
        Ok(all
            .into_iter()
            .filter(|w| labels::matches(selector, &w.meta.labels))
            .collect())
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or update a pod.
    pub fn put_pod(&self, pod: &Pod) -> StateResult<()> {
        self.put_json(PODS, &pod.meta.table_key(), pod)
    }

    /// Get a pod by `{namespace}/{name}` key.
    pub fn get_pod(&self, key: &str) -> StateResult<Option<Pod>> {
        self.get_json(PODS, key)
    }

    /// Delete a pod by key. Returns true if it existed.
    pub fn delete_pod(&self, key: &str) -> StateResult<bool> {
        self.remove(PODS, key)
    }

    fn select_pods(&self, namespace: &str, selector: &Labels) -> StateResult<Vec<Pod>> {
        let all: Vec<Pod> = self.scan_json(PODS, &format!("{namespace}/"))?;
        Ok(all
            .into_iter()
            .filter(|p| labels::matches(selector, &p.meta.labels))
            .collect())
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Record an event. A repeat of an event already stored for the same
    /// instance (same type, reason and message) bumps that event's count and
    /// last timestamp instead of adding a row.
    pub fn put_event(&self, event: &Event) -> StateResult<()> {
        let prefix = format!("{}/{}:", event.namespace, event.involved);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;

            let mut repeated: Option<(String, Event)> = None;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if !key.value().starts_with(&prefix) {
                    continue;
                }
                let stored: Event =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if stored.repeats(event) {
                    repeated = Some((key.value().to_string(), stored));
                    break;
                }
            }

            let (key, next) = match repeated {
                Some((key, mut stored)) => {
                    stored.count = stored.count.saturating_add(event.count.max(1));
                    stored.last_timestamp = stored.last_timestamp.max(event.timestamp);
                    (key, stored)
                }
                None => {
                    let seq = self.event_seq.fetch_add(1, Ordering::Relaxed);
                    let key = format!("{prefix}{:020}:{:010}", event.timestamp, seq);
                    let mut fresh = event.clone();
                    fresh.count = fresh.count.max(1);
                    fresh.last_timestamp = fresh.last_timestamp.max(fresh.timestamp);
                    (key, fresh)
                }
            };

            let bytes = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Events recorded against an instance, oldest first.
    pub fn list_events_for_instance(&self, key: &str) -> StateResult<Vec<Event>> {
        self.scan_json(EVENTS, &format!("{key}:"))
    }

    fn event_keys(&self, prefix: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let keys = table
            .iter()
            .map_err(map_err!(Read))?
            .filter_map(|entry| {
                let (key, _) = entry.ok()?;
                let k = key.value().to_string();
                k.starts_with(prefix).then_some(k)
            })
            .collect();
        Ok(keys)
    }
}

// ── Collaborator implementations ───────────────────────────────────

impl ResourceReader for StateStore {
    fn list_stateful_sets(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> ClusterResult<Vec<Workload>> {
        self.select_workloads(STATEFUL_SETS, namespace, selector)
            .map_err(|e| e.into_list_error("stateful sets"))
    }

    fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> ClusterResult<Vec<Workload>> {
        self.select_workloads(REPLICA_SETS, namespace, selector)
            .map_err(|e| e.into_list_error("replica sets"))
    }

    fn list_pods(&self, namespace: &str, selector: &Labels) -> ClusterResult<Vec<Pod>> {
        self.select_pods(namespace, selector)
            .map_err(|e| e.into_list_error("pods"))
    }
}

impl StatusWriter for StateStore {
    fn update_status(&self, instance: &Instance) -> ClusterResult<()> {
        self.write_status(instance)
            .map(|_| ())
            .map_err(ClusterError::from)
    }
}

impl EventRecorder for StateStore {
    fn record(&self, instance: &Instance, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => {
                info!(instance = %instance.table_key(), %reason, %message, "event")
            }
            EventType::Warning => {
                warn!(instance = %instance.table_key(), %reason, %message, "event")
            }
        }

        let now = epoch_secs();
        let event = Event {
            namespace: instance.meta.namespace.clone(),
            involved: instance.meta.name.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: now,
            count: 1,
            last_timestamp: now,
        };
        if let Err(e) = self.put_event(&event) {
            warn!(instance = %instance.table_key(), error = %e, "failed to store event");
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
