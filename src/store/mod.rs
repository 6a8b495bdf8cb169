//! # Key Database Access
//!
//! This module defines the narrow interface through which the reconcilers
//! talk to the hierarchical key database, plus two implementations.
//!
//! ## Key Components
//!
//! - **`Key`** and **`KeySet`**: in-memory keys (name, value, metadata) and an
//!   ordered set of them, loaded from and committed back to the database.
//! - **`KeyStore`** / **`Session`**: the database itself. A session loads a
//!   subtree (`get`), the caller mutates the `KeySet` in memory, and the
//!   session commits the subtree back (`set`).
//! - **`with_session`**: the only sanctioned way to use a session. Every
//!   resource opens its own session scoped to the narrowest subtree it can
//!   affect, and the session is closed on every exit path.
//! - **`as_user`**: runs a closure while the store acts as another user,
//!   restoring the previous identity afterwards, even on failure.
//!
//! Two resources are never reconciled under one transaction. The database
//! may be changed by other writers between sessions, so a failure halfway
//! through a manifest leaves earlier resources committed.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keyname::{is_below_or_same, Namespace};

pub use file::FileStore;
pub use memory::MemoryStore;

/// A single key: name, value and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, String>,
}

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn get_meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    pub fn has_meta(&self, name: &str) -> bool {
        self.meta.contains_key(name)
    }

    pub fn set_meta(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(name.into(), value.into());
    }

    pub fn del_meta(&mut self, name: &str) -> Option<String> {
        self.meta.remove(name)
    }

    /// All metadata entries, ordered by name.
    pub fn meta(&self) -> impl Iterator<Item = (&str, &str)> {
        self.meta.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Names of all metadata entries, ordered.
    pub fn meta_names(&self) -> Vec<String> {
        self.meta.keys().cloned().collect()
    }
}

/// An ordered set of keys, indexed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: BTreeMap<String, Key>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add a key, replacing any key with the same name.
    pub fn insert(&mut self, key: Key) -> Option<Key> {
        self.keys.insert(key.name.clone(), key)
    }

    /// Resolve a name to the name of a stored key.
    ///
    /// Namespaced names resolve to themselves. Cascading names (`/…`) are
    /// looked up in `proc`, `dir`, `user` and `system`, first match wins.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if name.starts_with('/') {
            Namespace::LOOKUP_ORDER
                .iter()
                .map(|ns| format!("{}{}", ns.as_str(), name))
                .find(|candidate| self.keys.contains_key(candidate))
        } else if self.keys.contains_key(name) {
            Some(name.to_string())
        } else {
            None
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Key> {
        self.resolve(name).and_then(|resolved| self.keys.get(&resolved))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Key> {
        let resolved = self.resolve(name)?;
        self.keys.get_mut(&resolved)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Remove a key by (possibly cascading) name.
    pub fn delete(&mut self, name: &str) -> Option<Key> {
        let resolved = self.resolve(name)?;
        self.keys.remove(&resolved)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.values()
    }

    /// Keys equal to or below `root`, in name order.
    pub fn below<'a>(&'a self, root: &'a str) -> impl Iterator<Item = &'a Key> + 'a {
        self.keys
            .values()
            .filter(move |key| is_below_or_same(&key.name, root))
    }

    /// Names of all keys equal to or below `root`.
    pub fn names_below(&self, root: &str) -> Vec<String> {
        self.below(root).map(|key| key.name.clone()).collect()
    }

    /// Remove and return the subtree at `root`.
    pub fn cut(&mut self, root: &str) -> KeySet {
        let names = self.names_below(root);
        let mut cut = KeySet::new();
        for name in names {
            if let Some(key) = self.keys.remove(&name) {
                cut.insert(key);
            }
        }
        cut
    }

    /// Move every key of `other` into this set.
    pub fn append(&mut self, other: KeySet) {
        self.keys.extend(other.keys);
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// A connection to the key database.
pub trait KeyStore {
    /// Open a new session.
    fn open(&self) -> Result<Box<dyn Session + '_>>;

    /// Identity the store currently acts as (`None` for the invoking user).
    fn current_user(&self) -> Result<Option<String>>;

    /// Act as another identity for subsequent sessions.
    fn switch_user(&self, user: Option<&str>) -> Result<()>;
}

/// An open session on a key database.
pub trait Session {
    /// Load every key at or below `root` into `keys`.
    fn get(&mut self, keys: &mut KeySet, root: &str) -> Result<()>;

    /// Commit the subtree at `root`: stored keys below `root` are replaced
    /// by the keys of `keys` below `root`.
    fn set(&mut self, keys: &KeySet, root: &str) -> Result<()>;

    /// Release the session.
    fn close(&mut self) -> Result<()>;
}

/// Whether a session commits its changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

struct SessionGuard<'a> {
    session: Box<dyn Session + 'a>,
    closed: bool,
}

impl SessionGuard<'_> {
    fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.close()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.session.close() {
                warn!("failed to close key database session: {}", e);
            }
        }
    }
}

/// Open a session, load `root`, run `f` on the loaded keys and commit them
/// back when `access` is [`Access::ReadWrite`].
///
/// The session is closed on every path. If `f` fails nothing is committed.
pub fn with_session<S, T, F>(store: &S, root: &str, access: Access, f: F) -> Result<T>
where
    S: KeyStore + ?Sized,
    F: FnOnce(&mut KeySet) -> Result<T>,
{
    with_changes(store, root, access == Access::ReadOnly, |keys| {
        f(keys).map(|result| (result, true))
    })
}

/// Like [`with_session`], but `f` reports whether it changed anything.
///
/// The subtree is committed only when `f` reports a change and `dry_run`
/// is off.
pub fn with_changes<S, T, F>(store: &S, root: &str, dry_run: bool, f: F) -> Result<T>
where
    S: KeyStore + ?Sized,
    F: FnOnce(&mut KeySet) -> Result<(T, bool)>,
{
    debug!("opening session on {} (dry run: {})", root, dry_run);
    let mut guard = SessionGuard {
        session: store.open()?,
        closed: false,
    };

    let mut keys = KeySet::new();
    guard.session.get(&mut keys, root)?;
    let (result, changed) = f(&mut keys)?;
    if changed && !dry_run {
        guard.session.set(&keys, root)?;
        debug!("committed {} key(s) below {}", keys.below(root).count(), root);
    }
    guard.close()?;
    Ok(result)
}

struct UserGuard<'a, S: KeyStore + ?Sized> {
    store: &'a S,
    previous: Option<Option<String>>,
}

impl<S: KeyStore + ?Sized> UserGuard<'_, S> {
    fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.store.switch_user(previous.as_deref()),
            None => Ok(()),
        }
    }
}

impl<S: KeyStore + ?Sized> Drop for UserGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.store.switch_user(previous.as_deref()) {
                warn!("failed to restore user context: {}", e);
            }
        }
    }
}

/// Run `f` while `store` acts as `user`; `None` runs `f` unchanged.
///
/// The previous identity is restored afterwards, whether `f` succeeds or not.
pub fn as_user<S, T, F>(store: &S, user: Option<&str>, f: F) -> Result<T>
where
    S: KeyStore + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let Some(user) = user else {
        return f();
    };

    let previous = store.current_user()?;
    store.switch_user(Some(user))?;
    debug!("acting as user {}", user);
    let guard = UserGuard {
        store,
        previous: Some(previous),
    };

    let result = f();
    let restored = guard.restore();
    let value = result?;
    restored?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StoreError};

    #[test]
    fn test_key_metadata() {
        let mut key = Key::new("user/test/x1").with_value("v").with_meta("m1", "a");
        assert_eq!(key.value(), "v");
        assert_eq!(key.get_meta("m1"), Some("a"));
        key.set_meta("m2", "b");
        assert_eq!(key.meta_names(), vec!["m1", "m2"]);
        assert_eq!(key.del_meta("m1"), Some("a".to_string()));
        assert!(!key.has_meta("m1"));
    }

    #[test]
    fn test_keyset_cascading_lookup_order() {
        let ks: KeySet = vec![
            Key::new("system/app/x").with_value("system"),
            Key::new("user/app/x").with_value("user"),
        ]
        .into_iter()
        .collect();

        assert_eq!(ks.lookup("/app/x").unwrap().value(), "user");
        assert_eq!(ks.resolve("/app/x").as_deref(), Some("user/app/x"));
        assert_eq!(ks.lookup("system/app/x").unwrap().value(), "system");
        assert!(ks.lookup("/app/y").is_none());
    }

    #[test]
    fn test_keyset_cut_and_below() {
        let mut ks: KeySet = vec![
            Key::new("user/a"),
            Key::new("user/a/b"),
            Key::new("user/ab"),
            Key::new("system/a/c"),
        ]
        .into_iter()
        .collect();

        assert_eq!(ks.names_below("user/a"), vec!["user/a", "user/a/b"]);
        assert_eq!(ks.names_below("/a").len(), 3);

        let cut = ks.cut("user/a");
        assert_eq!(cut.len(), 2);
        assert_eq!(ks.len(), 2);
        assert!(ks.contains("user/ab"));
    }

    #[test]
    fn test_with_session_commits_on_success() {
        let store = MemoryStore::new();
        with_session(&store, "/test", Access::ReadWrite, |keys| {
            keys.insert(Key::new("user/test/x").with_value("1"));
            Ok(())
        })
        .unwrap();

        assert_eq!(store.snapshot().unwrap().lookup("user/test/x").unwrap().value(), "1");
        assert_eq!(store.commit_count().unwrap(), 1);
    }

    #[test]
    fn test_with_session_read_only_does_not_commit() {
        let store = MemoryStore::new();
        with_session(&store, "/test", Access::ReadOnly, |keys| {
            keys.insert(Key::new("user/test/x"));
            Ok(())
        })
        .unwrap();

        assert!(store.snapshot().unwrap().is_empty());
        assert_eq!(store.commit_count().unwrap(), 0);
    }

    #[test]
    fn test_with_session_closes_on_error() {
        let store = MemoryStore::new();
        let result: Result<()> = with_session(&store, "/test", Access::ReadWrite, |keys| {
            keys.insert(Key::new("user/test/x"));
            Err(Error::Validation {
                resource: "key user/test/x".to_string(),
                message: "boom".to_string(),
            })
        });

        assert!(result.is_err());
        assert!(store.snapshot().unwrap().is_empty());
        assert_eq!(store.open_sessions().unwrap(), 0);
    }

    #[test]
    fn test_with_session_surfaces_store_error() {
        let store = MemoryStore::new();
        store
            .fail_next_set(StoreError::new("commit failed", "disk full").with_module("storage"))
            .unwrap();

        let err = with_session(&store, "/test", Access::ReadWrite, |_| Ok(())).unwrap_err();
        match err {
            Error::Store(e) => {
                assert_eq!(e.description, "commit failed");
                assert_eq!(e.module, "storage");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(store.open_sessions().unwrap(), 0);
    }

    #[test]
    fn test_as_user_restores_previous_identity() {
        let store = MemoryStore::new();
        as_user(&store, Some("alice"), || {
            assert_eq!(store.current_user()?.as_deref(), Some("alice"));
            Ok(())
        })
        .unwrap();
        assert_eq!(store.current_user().unwrap(), None);
    }

    #[test]
    fn test_as_user_restores_on_failure() {
        let store = MemoryStore::new();
        let result: Result<()> = as_user(&store, Some("alice"), || {
            Err(Error::LockPoisoned {
                context: "test".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.current_user().unwrap(), None);
    }

    #[test]
    fn test_as_user_none_is_passthrough() {
        let store = MemoryStore::new();
        let value = as_user(&store, None, || Ok(5)).unwrap();
        assert_eq!(value, 5);
    }
}
