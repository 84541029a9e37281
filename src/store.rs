//! Key-value preference store
//!
//! Every piece of gate state lives here: the monitored target sets, the
//! per-target session flags and the selected challenge presentation. The
//! store is constructed once by the process entry point and shared as an
//! `Arc<dyn KeyValueStore>`.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::common::{atomic_write, ensure_directory_exists};

/// Preference namespace shared by every gate component
pub const NAMESPACE: &str = "AppSelections";

/// Current store file version
const STORE_VERSION: &str = "1.0";

/// Handle returned by [`KeyValueStore::subscribe`]
pub type SubscriptionId = u64;

/// Callback invoked with the key of every mutation
pub type ChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read preferences file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write preferences file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock preferences file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse preferences file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize preferences: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Preference store lock poisoned")]
    Poisoned,
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PreferenceValue {
    Bool(bool),
    String(String),
    StringSet(BTreeSet<String>),
}

/// One write in a batch passed to [`KeyValueStore::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutBool(String, bool),
    PutString(String, String),
    PutStringSet(String, BTreeSet<String>),
    Remove(String),
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::PutBool(key, _)
            | Mutation::PutString(key, _)
            | Mutation::PutStringSet(key, _)
            | Mutation::Remove(key) => key,
        }
    }
}

/// Durable string-keyed store with change notification
///
/// Reads of a missing key (or a key holding a different value type) return the
/// supplied default. Errors are reserved for the backing medium failing.
pub trait KeyValueStore: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError>;

    /// Read several booleans from one consistent snapshot
    fn get_bools(&self, keys: &[&str], default: bool) -> Result<Vec<bool>, StoreError>;

    fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError>;

    fn get_string_set(&self, key: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Keys currently stored that start with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Apply a batch of mutations atomically
    ///
    /// Either every mutation becomes visible (and durable) or none does.
    /// Subscribers are notified once per mutated key after the batch commits.
    fn apply(&self, mutations: Vec<Mutation>) -> Result<(), StoreError>;

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

    /// Returns false if the handle was not subscribed
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Remove every stored key
    fn clear_all(&self) -> Result<(), StoreError>;

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.apply(vec![Mutation::PutBool(key.to_string(), value)])
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(vec![Mutation::PutString(key.to_string(), value.to_string())])
    }

    fn put_string_set(&self, key: &str, value: BTreeSet<String>) -> Result<(), StoreError> {
        self.apply(vec![Mutation::PutStringSet(key.to_string(), value)])
    }
}

/// On-disk representation of the store
#[derive(Debug, Deserialize, Serialize)]
struct StoreFile {
    version: String,
    namespace: String,
    values: BTreeMap<String, PreferenceValue>,
}

/// Modification time and length of the backing file when it was last loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Default)]
struct Cached {
    values: BTreeMap<String, PreferenceValue>,
    stamp: Option<FileStamp>,
}

/// The default [`KeyValueStore`]: an in-memory map, optionally mirrored to a JSON file
///
/// A file-backed store may share its file with other processes (the `apps`
/// command writes while `run` is running). Writes are a read-modify-write of
/// the file under an exclusive lock on a sidecar `.lock` file, and reads
/// reload the file whenever its stamp changes.
pub struct PreferenceStore {
    path: Option<PathBuf>,
    cache: RwLock<Cached>,
    listeners: Mutex<BTreeMap<SubscriptionId, ChangeListener>>,
    next_subscription: AtomicU64,
}

impl PreferenceStore {
    /// Create a store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::with_cache(None, Cached::default())
    }

    /// Open (or create) a file-backed store
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let cache = match file_stamp(path)? {
            Some(_) => {
                let _lock = lock_file(path, LockMode::Shared)?;
                Cached {
                    values: Self::read_file(path)?,
                    stamp: file_stamp(path)?,
                }
            }
            None => {
                debug!("Preferences file {} does not exist yet", path.display());
                Cached::default()
            }
        };

        Ok(Self::with_cache(Some(path.to_path_buf()), cache))
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_cache(path: Option<PathBuf>, cache: Cached) -> Self {
        Self {
            path,
            cache: RwLock::new(cache),
            listeners: Mutex::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, PreferenceValue>, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file: StoreFile = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if file.version != STORE_VERSION {
            warn!(
                "Preferences file version mismatch (expected {}, got {}). Starting empty.",
                STORE_VERSION, file.version
            );
            return Ok(BTreeMap::new());
        }

        if file.namespace != NAMESPACE {
            warn!(
                "Preferences file namespace is '{}', expected '{}'",
                file.namespace, NAMESPACE
            );
        }

        Ok(file.values)
    }

    fn read_file_or_empty(path: &Path) -> Result<BTreeMap<String, PreferenceValue>, StoreError> {
        if path.exists() {
            Self::read_file(path)
        } else {
            Ok(BTreeMap::new())
        }
    }

    fn persist(path: &Path, values: &BTreeMap<String, PreferenceValue>) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION.to_string(),
            namespace: NAMESPACE.to_string(),
            values: values.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        atomic_write(path, content.as_bytes()).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reload the file if another writer replaced it since we last looked
    fn refresh(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let current = file_stamp(path)?;
        {
            let cache = self.cache.read().map_err(|_| StoreError::Poisoned)?;
            if cache.stamp == current {
                return Ok(());
            }
        }

        let changed = {
            let _lock = lock_file(path, LockMode::Shared)?;
            let values = Self::read_file_or_empty(path)?;
            let stamp = file_stamp(path)?;

            let mut cache = self.cache.write().map_err(|_| StoreError::Poisoned)?;
            let changed = changed_keys(&cache.values, &values);
            cache.values = values;
            cache.stamp = stamp;
            changed
        };

        if !changed.is_empty() {
            debug!("Reloaded preferences changed elsewhere: {:?}", changed);
            self.notify(&changed);
        }
        Ok(())
    }

    /// Read-modify-write of the whole map
    ///
    /// For a file-backed store the file is re-read under an exclusive lock, so
    /// writes from other processes are merged rather than overwritten. Returns
    /// the keys to notify: those changed elsewhere first, then the keys `mutate` touched.
    fn update(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, PreferenceValue>) -> Vec<String>,
    ) -> Result<Vec<String>, StoreError> {
        // File lock before cache lock, same order as refresh
        let _lock = match &self.path {
            Some(path) => Some(lock_file(path, LockMode::Exclusive)?),
            None => None,
        };

        let mut cache = self.cache.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = match &self.path {
            Some(path) => Self::read_file_or_empty(path)?,
            None => cache.values.clone(),
        };
        let mut changed = changed_keys(&cache.values, &next);

        let touched = mutate(&mut next);
        changed.retain(|key| !touched.contains(key));
        changed.extend(touched);

        // Disk first: a failed write must leave memory untouched
        if let Some(path) = &self.path {
            Self::persist(path, &next)?;
            cache.stamp = file_stamp(path)?;
        }
        cache.values = next;

        Ok(changed)
    }

    fn read_value<T>(
        &self,
        key: &str,
        extract: impl FnOnce(&PreferenceValue) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        self.refresh()?;
        let cache = self.cache.read().map_err(|_| StoreError::Poisoned)?;
        Ok(cache.values.get(key).and_then(|value| {
            let extracted = extract(value);
            if extracted.is_none() {
                warn!("Preference '{}' holds an unexpected value type", key);
            }
            extracted
        }))
    }

    fn notify(&self, keys: &[String]) {
        let listeners: Vec<ChangeListener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => {
                warn!("Listener registry poisoned; skipping change notification");
                return;
            }
        };

        for key in keys {
            for listener in &listeners {
                listener(key);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Take a cross-process lock on `<path>.lock`; released when the file drops
fn lock_file(path: &Path, mode: LockMode) -> Result<File, StoreError> {
    let lock_path = path.with_extension("lock");
    let lock_error = |source: std::io::Error| StoreError::Lock {
        path: lock_path.clone(),
        source,
    };

    if let Some(parent) = lock_path.parent() {
        ensure_directory_exists(parent).map_err(lock_error)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(lock_error)?;

    let locked = match mode {
        LockMode::Shared => FileExt::lock_shared(&file),
        LockMode::Exclusive => FileExt::lock_exclusive(&file),
    };
    locked.map_err(lock_error)?;

    Ok(file)
}

fn file_stamp(path: &Path) -> Result<Option<FileStamp>, StoreError> {
    let read_error = |source: std::io::Error| StoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    match std::fs::metadata(path) {
        Ok(metadata) => Ok(Some(FileStamp {
            modified: metadata.modified().map_err(read_error)?,
            len: metadata.len(),
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(read_error(e)),
    }
}

/// Keys added, removed or changed between two snapshots
fn changed_keys(
    before: &BTreeMap<String, PreferenceValue>,
    after: &BTreeMap<String, PreferenceValue>,
) -> Vec<String> {
    let mut keys: Vec<String> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    keys.extend(before.keys().filter(|key| !after.contains_key(*key)).cloned());
    keys
}

impl KeyValueStore for PreferenceStore {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        Ok(self
            .read_value(key, |value| match value {
                PreferenceValue::Bool(b) => Some(*b),
                _ => None,
            })?
            .unwrap_or(default))
    }

    fn get_bools(&self, keys: &[&str], default: bool) -> Result<Vec<bool>, StoreError> {
        self.refresh()?;
        let cache = self.cache.read().map_err(|_| StoreError::Poisoned)?;
        Ok(keys
            .iter()
            .map(|key| match cache.values.get(*key) {
                Some(PreferenceValue::Bool(b)) => *b,
                _ => default,
            })
            .collect())
    }

    fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self
            .read_value(key, |value| match value {
                PreferenceValue::String(s) => Some(s.clone()),
                _ => None,
            })?
            .unwrap_or_else(|| default.to_string()))
    }

    fn get_string_set(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .read_value(key, |value| match value {
                PreferenceValue::StringSet(set) => Some(set.clone()),
                _ => None,
            })?
            .unwrap_or_default())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.refresh()?;
        let cache = self.cache.read().map_err(|_| StoreError::Poisoned)?;
        Ok(cache
            .values
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn apply(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        if mutations.is_empty() {
            return Ok(());
        }

        let changed = self.update(|values| {
            let mut touched = Vec::with_capacity(mutations.len());
            for mutation in mutations {
                touched.push(mutation.key().to_string());
                match mutation {
                    Mutation::PutBool(key, value) => {
                        values.insert(key, PreferenceValue::Bool(value));
                    }
                    Mutation::PutString(key, value) => {
                        values.insert(key, PreferenceValue::String(value));
                    }
                    Mutation::PutStringSet(key, value) => {
                        values.insert(key, PreferenceValue::StringSet(value));
                    }
                    Mutation::Remove(key) => {
                        values.remove(&key);
                    }
                }
            }
            touched
        })?;

        debug!("Applied preference changes: {:?}", changed);
        self.notify(&changed);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(id, listener);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, listener);
            }
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        }
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let changed = self.update(|values| {
            let removed = values.keys().cloned().collect();
            values.clear();
            removed
        })?;

        self.notify(&changed);
        Ok(())
    }
}
