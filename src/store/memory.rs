//! In-memory key database.
//!
//! Keys of the `user` namespace are kept per identity, so switching the
//! acting user changes what `user/…` resolves to. All other namespaces are
//! shared. A commit replaces a whole subtree under a single lock, so a
//! concurrent reader never sees half of a commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{Key, KeySet, KeyStore, Session};
use crate::error::{Error, Result, StoreError};
use crate::keyname::is_below_or_same;

/// Persistent content of a key database, shared with [`super::FileStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredKeys", into = "StoredKeys")]
pub(crate) struct StoreState {
    shared: BTreeMap<String, Key>,
    users: BTreeMap<String, BTreeMap<String, Key>>,
}

/// On-disk layout of [`StoreState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredKeys {
    #[serde(default)]
    keys: Vec<Key>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    users: BTreeMap<String, Vec<Key>>,
}

impl From<StoredKeys> for StoreState {
    fn from(stored: StoredKeys) -> Self {
        let index = |keys: Vec<Key>| {
            keys.into_iter()
                .map(|key| (key.name().to_string(), key))
                .collect::<BTreeMap<_, _>>()
        };
        StoreState {
            shared: index(stored.keys),
            users: stored
                .users
                .into_iter()
                .map(|(user, keys)| (user, index(keys)))
                .collect(),
        }
    }
}

impl From<StoreState> for StoredKeys {
    fn from(state: StoreState) -> Self {
        StoredKeys {
            keys: state.shared.into_values().collect(),
            users: state
                .users
                .into_iter()
                .filter(|(_, keys)| !keys.is_empty())
                .map(|(user, keys)| (user, keys.into_values().collect()))
                .collect(),
        }
    }
}

fn is_user_key(name: &str) -> bool {
    name == "user" || name.starts_with("user/")
}

impl StoreState {
    fn user_keys(&self, user: Option<&str>) -> Option<&BTreeMap<String, Key>> {
        self.users.get(user.unwrap_or_default())
    }

    /// Copy every key at or below `root` visible to `user` into `keys`.
    pub(crate) fn collect(&self, root: &str, user: Option<&str>, keys: &mut KeySet) {
        let user_keys = self.user_keys(user).into_iter().flat_map(|m| m.values());
        for key in self.shared.values().chain(user_keys) {
            if is_below_or_same(key.name(), root) {
                keys.insert(key.clone());
            }
        }
    }

    /// Replace the subtree at `root` visible to `user` with the keys of
    /// `keys` below `root`.
    pub(crate) fn replace(&mut self, root: &str, user: Option<&str>, keys: &KeySet) {
        self.shared.retain(|name, _| !is_below_or_same(name, root));
        let user_map = self
            .users
            .entry(user.unwrap_or_default().to_string())
            .or_default();
        user_map.retain(|name, _| !is_below_or_same(name, root));

        for key in keys.below(root) {
            if is_user_key(key.name()) {
                user_map.insert(key.name().to_string(), key.clone());
            } else {
                self.shared.insert(key.name().to_string(), key.clone());
            }
        }
    }

    pub(crate) fn insert(&mut self, user: Option<&str>, key: Key) {
        if is_user_key(key.name()) {
            self.users
                .entry(user.unwrap_or_default().to_string())
                .or_default()
                .insert(key.name().to_string(), key);
        } else {
            self.shared.insert(key.name().to_string(), key);
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: StoreState,
    user: Option<String>,
    fail_next_set: Option<StoreError>,
    commits: usize,
    open_sessions: usize,
}

/// A key database living entirely in memory.
///
/// Clones share the same underlying database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database pre-populated with `keys` for the invoking user.
    pub fn with_keys<I: IntoIterator<Item = Key>>(keys: I) -> Result<Self> {
        let store = Self::new();
        for key in keys {
            store.insert_key(key)?;
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned {
            context: "memory key database".to_string(),
        })
    }

    /// Store a key directly, bypassing sessions, as the current user.
    pub fn insert_key(&self, key: Key) -> Result<()> {
        let mut inner = self.lock()?;
        let user = inner.user.clone();
        inner.state.insert(user.as_deref(), key);
        Ok(())
    }

    /// Every key visible to the current user.
    pub fn snapshot(&self) -> Result<KeySet> {
        let inner = self.lock()?;
        let mut keys = KeySet::new();
        inner.state.collect("/", inner.user.as_deref(), &mut keys);
        Ok(keys)
    }

    /// Make the next commit fail with `error`.
    pub fn fail_next_set(&self, error: StoreError) -> Result<()> {
        self.lock()?.fail_next_set = Some(error);
        Ok(())
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> Result<usize> {
        Ok(self.lock()?.commits)
    }

    /// Number of sessions opened and not yet closed.
    pub fn open_sessions(&self) -> Result<usize> {
        Ok(self.lock()?.open_sessions)
    }
}

impl KeyStore for MemoryStore {
    fn open(&self) -> Result<Box<dyn Session + '_>> {
        self.lock()?.open_sessions += 1;
        Ok(Box::new(MemorySession {
            store: self,
            open: true,
        }))
    }

    fn current_user(&self) -> Result<Option<String>> {
        Ok(self.lock()?.user.clone())
    }

    fn switch_user(&self, user: Option<&str>) -> Result<()> {
        self.lock()?.user = user.map(str::to_string);
        Ok(())
    }
}

struct MemorySession<'a> {
    store: &'a MemoryStore,
    open: bool,
}

impl Session for MemorySession<'_> {
    fn get(&mut self, keys: &mut KeySet, root: &str) -> Result<()> {
        let inner = self.store.lock()?;
        inner.state.collect(root, inner.user.as_deref(), keys);
        Ok(())
    }

    fn set(&mut self, keys: &KeySet, root: &str) -> Result<()> {
        let mut inner = self.store.lock()?;
        if let Some(error) = inner.fail_next_set.take() {
            return Err(Error::Store(error));
        }
        let user = inner.user.clone();
        inner.state.replace(root, user.as_deref(), keys);
        inner.commits += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let mut inner = self.store.lock()?;
            inner.open_sessions = inner.open_sessions.saturating_sub(1);
        }
        Ok(())
    }
}
