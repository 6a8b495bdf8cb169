//! Key database persisted as a JSON document.
//!
//! Every session reads the file when it is opened and rewrites it on commit.
//! The file is replaced by renaming a fully written temporary file, so an
//! interrupted commit leaves the previous content in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use super::memory::StoreState;
use super::{KeySet, KeyStore, Session};
use crate::error::{Error, Result, StoreError};

/// A key database stored in a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    user: Mutex<Option<String>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            user: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreState> {
        if !self.path.exists() {
            return Ok(StoreState::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(StoreState::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            Error::Store(
                StoreError::new("Could not parse key database", e.to_string())
                    .with_module("storage")
                    .with_config_file(self.path.display().to_string()),
            )
        })
    }

    fn write(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                Error::Store(
                    StoreError::new("Could not write key database", e.to_string())
                        .with_module("storage")
                        .with_config_file(self.path.display().to_string()),
                )
            })
    }

    fn user(&self) -> Result<Option<String>> {
        self.user
            .lock()
            .map(|user| user.clone())
            .map_err(|_| Error::LockPoisoned {
                context: "file key database user".to_string(),
            })
    }
}

impl KeyStore for FileStore {
    fn open(&self) -> Result<Box<dyn Session + '_>> {
        debug!("opening key database {}", self.path.display());
        Ok(Box::new(FileSession {
            store: self,
            state: self.load()?,
            user: self.user()?,
        }))
    }

    fn current_user(&self) -> Result<Option<String>> {
        self.user()
    }

    fn switch_user(&self, user: Option<&str>) -> Result<()> {
        let mut current = self.user.lock().map_err(|_| Error::LockPoisoned {
            context: "file key database user".to_string(),
        })?;
        *current = user.map(str::to_string);
        Ok(())
    }
}

struct FileSession<'a> {
    store: &'a FileStore,
    state: StoreState,
    user: Option<String>,
}

impl Session for FileSession<'_> {
    fn get(&mut self, keys: &mut KeySet, root: &str) -> Result<()> {
        self.state.collect(root, self.user.as_deref(), keys);
        Ok(())
    }

    fn set(&mut self, keys: &KeySet, root: &str) -> Result<()> {
        self.state.replace(root, self.user.as_deref(), keys);
        self.store.write(&self.state)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
