//! In-process coverage runtime registry.
//!
//! A host application that embeds the coverage agent publishes its runtime
//! here under [`RUNTIME_OBJECT_NAME`]; local providers look it up by name.
//! Objects are stored type-erased, the lookup checks the concrete type.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::{CoverageError, Result};
use crate::execdata::{encode, ExecutionDataStore, ExecutionRecord, SessionInfo};

/// Name under which the agent runtime is registered by default.
pub const RUNTIME_OBJECT_NAME: &str = "jacoco:type=Runtime";

/// Operations a co-located agent runtime offers.
pub trait CoverageRuntime: Send + Sync {
    /// Serialized execution data; clears probes afterwards when `reset` is set.
    fn execution_data(&self, reset: bool) -> Result<Vec<u8>>;

    fn reset(&self) -> Result<()>;
}

pub type RegisteredObject = Arc<dyn Any + Send + Sync>;

static REGISTRY: Lazy<DashMap<String, RegisteredObject>> = Lazy::new(DashMap::new);

/// Registers `object` under `name`, returning the object it replaced.
pub fn register_object(name: impl Into<String>, object: RegisteredObject) -> Option<RegisteredObject> {
    let name = name.into();
    debug!("Registering object [{}]", name);
    REGISTRY.insert(name, object)
}

pub fn unregister_object(name: &str) -> Option<RegisteredObject> {
    REGISTRY.remove(name).map(|(_, object)| object)
}

pub fn lookup_object(name: &str) -> Option<RegisteredObject> {
    REGISTRY.get(name).map(|entry| entry.value().clone())
}

/// Publishes `runtime` under `name` in the form local providers expect.
pub fn register_runtime(name: impl Into<String>, runtime: Arc<dyn CoverageRuntime>) {
    let name = name.into();
    info!("Coverage runtime registered as [{}]", name);
    register_object(name, Arc::new(runtime));
}

/// Resolves the runtime registered under `name`.
pub fn resolve_runtime(name: &str) -> Result<Arc<dyn CoverageRuntime>> {
    let object = lookup_object(name).ok_or_else(|| {
        CoverageError::InvalidState(format!("No coverage runtime registered under '{name}'"))
    })?;

    object
        .downcast_ref::<Arc<dyn CoverageRuntime>>()
        .cloned()
        .ok_or_else(|| {
            CoverageError::InvalidState(format!(
                "Object registered under '{name}' is not a coverage runtime"
            ))
        })
}

/// Runtime keeping probe data in memory.
///
/// Suitable for hosts that record probes themselves, and for tests.
pub struct InMemoryRuntime {
    session_id: String,
    started: i64,
    store: Mutex<ExecutionDataStore>,
}

impl InMemoryRuntime {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started: now_millis(),
            store: Mutex::new(ExecutionDataStore::new()),
        }
    }

    /// Adds (or merges) probe data for one class.
    pub fn record(&self, record: ExecutionRecord) -> Result<()> {
        self.lock().put(record)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExecutionDataStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CoverageRuntime for InMemoryRuntime {
    fn execution_data(&self, reset: bool) -> Result<Vec<u8>> {
        let mut store = self.lock();

        let mut snapshot = ExecutionDataStore::new();
        snapshot.add_session(SessionInfo {
            id: self.session_id.clone(),
            start: self.started,
            dump: now_millis(),
        });
        for record in store.records() {
            snapshot.put(record.clone())?;
        }

        let bytes = encode(&snapshot)
            .map_err(|e| CoverageError::InvalidState(format!("Cannot serialize execution data: {e}")))?;
        if reset {
            store.reset_probes();
        }
        Ok(bytes)
    }

    fn reset(&self) -> Result<()> {
        self.lock().reset_probes();
        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execdata::decode;

    #[test]
    fn test_resolve_registered_runtime() {
        let runtime = Arc::new(InMemoryRuntime::new("s1"));
        runtime
            .record(ExecutionRecord::new(7, "a/A", vec![true, false]))
            .unwrap();
        register_runtime("test:type=Registered", runtime);

        let resolved = resolve_runtime("test:type=Registered").unwrap();
        let store = decode(&resolved.execution_data(false).unwrap()).unwrap();
        assert_eq!(store.get(7).unwrap().hit_count(), 1);
        assert_eq!(store.sessions()[0].id, "s1");
        unregister_object("test:type=Registered");
    }

    #[test]
    fn test_wrong_type_is_invalid_state() {
        register_object("test:type=NotARuntime", Arc::new(42u32));
        let err = resolve_runtime("test:type=NotARuntime").err().unwrap();
        assert!(matches!(err, CoverageError::InvalidState(_)));
        unregister_object("test:type=NotARuntime");
    }

    #[test]
    fn test_dump_with_reset_clears_probes() {
        let runtime = InMemoryRuntime::new("s");
        runtime
            .record(ExecutionRecord::new(1, "a/A", vec![true, true]))
            .unwrap();

        let first = decode(&runtime.execution_data(true).unwrap()).unwrap();
        assert_eq!(first.get(1).unwrap().hit_count(), 2);

        let second = decode(&runtime.execution_data(false).unwrap()).unwrap();
        assert_eq!(second.get(1).unwrap().hit_count(), 0);
        assert_eq!(second.get(1).unwrap().probes().len(), 2);
    }
}
