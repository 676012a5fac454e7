//! StateStore — redb-backed state persistence for ScaleGrid.
//!
//! Provides typed operations over registered services, metric samples,
//! instance counts and the action log. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use scalegrid_core::{ActionRecord, ServiceConfig};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Map a JSON decode failure to `StateError::Corrupt` for `table`.
fn corrupt(table: &'static str) -> impl Fn(serde_json::Error) -> StateError {
    move |e| StateError::Corrupt {
        table,
        reason: e.to_string(),
    }
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

    /// Create an ephemeral in-memory state store (for testing).
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
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert or replace a service config.
    pub fn put_service(&self, config: &ServiceConfig) -> StateResult<()> {
        let value = serde_json::to_vec(config).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(config.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service = %config.name, "service config stored");
        Ok(())
    }

    pub fn get_service(&self, name: &str) -> StateResult<Option<ServiceConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let config: ServiceConfig =
                    serde_json::from_slice(guard.value()).map_err(corrupt("services"))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// List all stored service configs, ordered by name.
    pub fn list_services(&self) -> StateResult<Vec<ServiceConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let config: ServiceConfig =
                serde_json::from_slice(value.value()).map_err(corrupt("services"))?;
            results.push(config);
        }
        Ok(results)
    }

    /// Delete a service config. Returns true if it existed.
    pub fn delete_service(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service = %name, existed, "service config deleted");
        Ok(existed)
    }

    // ── Samples ────────────────────────────────────────────────────

    /// Insert a metric sample. A second sample for the same service and
    /// second replaces the first.
    pub fn put_sample(&self, sample: &MetricSample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Samples for a service with `from <= timestamp <= to`, oldest first.
    pub fn list_samples(&self, service: &str, from: u64, to: u64) -> StateResult<Vec<MetricSample>> {
        let lo = sample_key(service, from);
        let hi = sample_key(service, to);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(lo.as_str()..=hi.as_str()).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: MetricSample =
                serde_json::from_slice(value.value()).map_err(corrupt("samples"))?;
            results.push(sample);
        }
        Ok(results)
    }

    /// Delete every sample older than `cutoff`. Returns number deleted.
    pub fn prune_samples(&self, cutoff: u64) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    let ts = k.rsplit_once(':')?.1.parse::<u64>().ok()?;
                    (ts < cutoff).then_some(k)
                })
                .collect()
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if count > 0 {
            debug!(count, cutoff, "pruned metric samples");
        }
        Ok(count)
    }

    // ── Instances ──────────────────────────────────────────────────

    pub fn put_instance_count(&self, count: &InstanceCount) -> StateResult<()> {
        let value = serde_json::to_vec(count).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(count.service_name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_instance_count(&self, service: &str) -> StateResult<Option<InstanceCount>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(service).map_err(map_err!(Read))? {
            Some(guard) => {
                let count: InstanceCount =
                    serde_json::from_slice(guard.value()).map_err(corrupt("instances"))?;
                Ok(Some(count))
            }
            None => Ok(None),
        }
    }

    // ── Action log ─────────────────────────────────────────────────

    /// Append an action record, then drop the oldest records until at most
    /// `retention` remain.
    pub fn append_action(&self, record: &ActionRecord, retention: usize) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut dropped = 0u32;
        {
            let mut table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
            let next = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => key
                    .value()
                    .checked_add(1)
                    .ok_or(StateError::SequenceExhausted)?,
                None => 0,
            };
            table
                .insert(next, value.as_slice())
                .map_err(map_err!(Write))?;
            while table.len().map_err(map_err!(Read))? > retention as u64 {
                if table.pop_first().map_err(map_err!(Write))?.is_none() {
                    break;
                }
                dropped += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service = %record.service_name, dropped, "action recorded");
        Ok(())
    }

    /// The most recent `limit` action records, newest first.
    pub fn list_actions(&self, limit: usize) -> StateResult<Vec<ActionRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ActionRecord =
                serde_json::from_slice(value.value()).map_err(corrupt("actions"))?;
            results.push(record);
        }
        Ok(results)
    }
}
