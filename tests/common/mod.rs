//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, manifests and helper functions
//! to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_manifest(manifests::SINGLE_KEY);
//!     fixture.command().arg("apply").assert().success();
//! }
//! ```

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use kdb_state::store::{with_session, Access, FileStore, KeySet};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::TestFixture;
}

/// Common manifest YAML snippets for testing.
#[allow(dead_code)]
pub mod manifests {
    /// One cascading key with a value.
    pub const SINGLE_KEY: &str = r#"
- key:
    name: /test/puppet/x1
    value: hello world
"#;

    /// A key with value, metadata, comments and validation rules.
    pub const FULL_KEY: &str = r#"
- key:
    name: user/test/puppet/port
    value: 8080
    metadata:
      owner: ops
      description: listening port
    comments: |-
      port of the service
      change with care
    check:
      type: unsigned_short
      range: 1-65535
"#;

    /// A mounted hosts file with a key stored in it.
    pub const HOSTS_MOUNT: &str = r#"
- key:
    name: system/hosts/ipv4/localhost
    value: 127.0.0.1
- mount:
    name: system/hosts
    file: /etc/hosts
    plugins: hosts
"#;

    /// A list value stored as array elements.
    pub const LIST_KEY: &str = r#"
- key:
    name: user/test/puppet/list
    value: [a, b, c]
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "invalid: yaml: content:";

    /// Empty manifest (comments only).
    pub const EMPTY: &str = r#"# kdb-state manifest
[]
"#;
}

/// A test fixture that provides a temporary directory holding a manifest
/// and a file-backed key database.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new().with_manifest(manifests::SINGLE_KEY);
///
/// fixture.command().arg("apply").assert().success();
/// assert_eq!(fixture.value("user/test/puppet/x1").as_deref(), Some("hello world"));
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `kdb-state.yaml` manifest with the given content.
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("kdb-state.yaml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.temp_dir.path().join("kdb-state.yaml")
    }

    pub fn store_path(&self) -> PathBuf {
        self.temp_dir.path().join("store.json")
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(self.store_path())
    }

    /// Every key in the fixture's database.
    pub fn keys(&self) -> KeySet {
        with_session(&self.store(), "/", Access::ReadOnly, |keys| Ok(keys.clone()))
            .expect("Failed to read key database")
    }

    /// Value of a stored key, if present.
    pub fn value(&self, name: &str) -> Option<String> {
        self.keys().lookup(name).map(|key| key.value().to_string())
    }

    /// Create a command running in the fixture directory against the
    /// fixture's key database.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdb-state");
        cmd.current_dir(self.path())
            .env("KDB_STATE_STORE", self.store_path())
            .env_remove("KDB_STATE_MANIFEST")
            .env_remove("KDB_STATE_CATALOG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
