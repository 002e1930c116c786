//! Run-Scoped Namespaced Blackboard
//!
//! The blackboard is the only channel stages use to talk to each other. It is
//! created per orchestration run and split into:
//!
//! - a **global** namespace holding request parameters, writable only until
//!   the coordinator [seals](Blackboard::seal) it at fan-out, and
//! - one **unit** namespace per unit of work, each backed by its own inner map.
//!
//! Isolation is structural: a [`NamespaceHandle`] owns a pointer to exactly one
//! inner map, so a pipeline holding it has no way to address a sibling's keys.
//! A namespace is allocated once per run and never reused.
//!
//! Unit keys and request parameters never shadow each other. [`StateRead::resolve`]
//! only sees the unit namespace; request parameters are read through
//! [`StateRead::resolve_global`].
//!
//! ```ignore
//! let board = Arc::new(Blackboard::new());
//! board.set_global("run_type", json!("Pre-Market"))?;
//! board.seal();
//!
//! let nasdaq = board.allocate(&UnitId::new("NASDAQ"))?;
//! nasdaq.set("exchange", json!("NASDAQ"))?;
//! assert_eq!(nasdaq.resolve("run_type"), None);
//! assert_eq!(nasdaq.resolve_global("run_type"), Some(json!("Pre-Market")));
//! ```

use crate::types::{AppError, Result};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Key/value entries of one namespace.
pub type Entries = HashMap<String, Value>;

/// Identifier of one unit of work (e.g. an exchange code). Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Arc<str>);

impl UnitId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a partition of the blackboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    Global,
    Unit(UnitId),
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Global => f.write_str("global"),
            Namespace::Unit(unit) => write!(f, "unit:{}", unit),
        }
    }
}

/// Read access shared by live namespace handles and frozen snapshots.
pub trait StateRead: Send + Sync {
    /// Name of the namespace being read, used in error messages
    fn namespace(&self) -> String;

    /// Look a key up in the unit namespace
    fn resolve(&self, key: &str) -> Option<Value>;

    /// Look a request parameter up in the global namespace
    fn resolve_global(&self, key: &str) -> Option<Value>;

    /// Resolve a dotted path such as `exchange_details.market_proxy`
    fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut value = self.resolve(head)?;
        for segment in segments {
            value = match value {
                Value::Object(mut map) => map.remove(segment)?,
                Value::Array(mut items) => {
                    let index: usize = segment.parse().ok()?;
                    if index >= items.len() {
                        return None;
                    }
                    items.swap_remove(index)
                }
                _ => return None,
            };
        }
        Some(value)
    }
}

/// Storage behind one unit namespace, shared by every clone of its handle.
#[derive(Default)]
struct UnitStore {
    entries: RwLock<Entries>,
    released: AtomicBool,
}

enum Slot {
    Live(Arc<UnitStore>),
    Released,
}

/// Namespaced key/value store scoped to one orchestration run.
pub struct Blackboard {
    run_id: Uuid,
    global: Arc<RwLock<Entries>>,
    sealed: AtomicBool,
    namespaces: Mutex<HashMap<UnitId, Slot>>,
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blackboard")
            .field("run_id", &self.run_id)
            .field("sealed", &self.is_sealed())
            .field("live_namespaces", &self.live_namespaces())
            .finish()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            global: Arc::new(RwLock::new(Entries::new())),
            sealed: AtomicBool::new(false),
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Write a request parameter into the global namespace. Fails once sealed.
    pub fn set_global(&self, key: impl Into<String>, value: Value) -> Result<()> {
        if self.is_sealed() {
            return Err(AppError::Namespace(
                "global namespace is sealed after fan-out".to_string(),
            ));
        }
        self.global.write().insert(key.into(), value);
        Ok(())
    }

    pub fn get_global(&self, key: &str) -> Option<Value> {
        self.global.read().get(key).cloned()
    }

    /// Freeze the global namespace. Called by the coordinator before fan-out.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Allocate the exclusive namespace of `unit`.
    ///
    /// Each unit gets a namespace at most once per run; a second allocation,
    /// even after release, is rejected.
    pub fn allocate(&self, unit: &UnitId) -> Result<NamespaceHandle> {
        let mut namespaces = self.namespaces.lock();
        if namespaces.contains_key(unit) {
            return Err(AppError::Namespace(format!(
                "namespace for unit '{}' was already allocated in run {}",
                unit, self.run_id
            )));
        }

        let store = Arc::new(UnitStore::default());
        namespaces.insert(unit.clone(), Slot::Live(Arc::clone(&store)));
        tracing::debug!(run_id = %self.run_id, unit = %unit, "Allocated namespace");

        Ok(NamespaceHandle {
            unit: unit.clone(),
            store,
            global: Arc::clone(&self.global),
        })
    }

    /// Discard the namespace of `unit`, returning its final entries.
    ///
    /// Handles still held for the unit keep reading the final entries, but
    /// every later write through them fails with [`AppError::Namespace`].
    pub fn release(&self, unit: &UnitId) -> Option<Entries> {
        let mut namespaces = self.namespaces.lock();
        match namespaces.insert(unit.clone(), Slot::Released) {
            Some(Slot::Live(store)) => {
                tracing::debug!(run_id = %self.run_id, unit = %unit, "Released namespace");
                // Flip the flag under the write lock so no set lands after the copy.
                let entries = store.entries.write();
                store.released.store(true, Ordering::SeqCst);
                Some(entries.clone())
            }
            Some(Slot::Released) => None,
            None => {
                // Never allocated; don't leave a tombstone behind.
                namespaces.remove(unit);
                None
            }
        }
    }

    fn live_store(&self, unit: &UnitId) -> Option<Arc<UnitStore>> {
        match self.namespaces.lock().get(unit) {
            Some(Slot::Live(store)) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    /// Write `value` under `(namespace, key)`. Last writer wins.
    pub fn set(&self, namespace: &Namespace, key: impl Into<String>, value: Value) -> Result<()> {
        match namespace {
            Namespace::Global => self.set_global(key, value),
            Namespace::Unit(unit) => {
                let store = self.live_store(unit).ok_or_else(|| {
                    AppError::Namespace(format!("namespace for unit '{}' is not live", unit))
                })?;
                store.entries.write().insert(key.into(), value);
                Ok(())
            }
        }
    }

    /// Read `(namespace, key)`. Absent keys and dead namespaces read as `None`.
    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<Value> {
        match namespace {
            Namespace::Global => self.get_global(key),
            Namespace::Unit(unit) => self
                .live_store(unit)
                .and_then(|store| store.entries.read().get(key).cloned()),
        }
    }

    pub fn live_namespaces(&self) -> usize {
        self.namespaces
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }
}

/// Exclusive access to one unit's namespace (plus read-only global parameters).
#[derive(Clone)]
pub struct NamespaceHandle {
    unit: UnitId,
    store: Arc<UnitStore>,
    global: Arc<RwLock<Entries>>,
}

impl fmt::Debug for NamespaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceHandle")
            .field("unit", &self.unit)
            .field("keys", &self.keys())
            .finish()
    }
}

impl NamespaceHandle {
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.entries.read().get(key).cloned()
    }

    /// Read and deserialize a key. `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                AppError::Internal(format!(
                    "value under '{}' in namespace '{}' has an unexpected shape: {}",
                    key, self.unit, e
                ))
            }),
            None => Ok(None),
        }
    }

    /// Write `value` under `key`. Fails once the namespace has been released.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let mut entries = self.store.entries.write();
        if self.store.released.load(Ordering::SeqCst) {
            return Err(AppError::Namespace(format!(
                "namespace for unit '{}' was released, dropping write to '{}'",
                self.unit, key
            )));
        }
        tracing::trace!(unit = %self.unit, key = %key, "Blackboard write");
        entries.insert(key, value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.store.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        self.global.read().get(key).cloned()
    }

    /// Freeze the current namespace contents for concurrent readers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            unit: self.unit.clone(),
            entries: self.store.entries.read().clone(),
            global: self.global.read().clone(),
        }
    }
}

impl StateRead for NamespaceHandle {
    fn namespace(&self) -> String {
        self.unit.to_string()
    }

    fn resolve(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    fn resolve_global(&self, key: &str) -> Option<Value> {
        self.global(key)
    }
}

/// Immutable copy of a namespace taken at a point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    unit: UnitId,
    entries: Entries,
    global: Entries,
}

impl Snapshot {
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }
}

impl StateRead for Snapshot {
    fn namespace(&self) -> String {
        self.unit.to_string()
    }

    fn resolve(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn resolve_global(&self, key: &str) -> Option<Value> {
        self.global.get(key).cloned()
    }
}
