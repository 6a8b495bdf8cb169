//! # kdb-state
//!
//! This library declaratively manages the state of a hierarchical key
//! database: individual keys (value, metadata, comments, validation rules)
//! and mounted backends binding configuration files into the database. It is
//! designed to be used by the `kdb-state` command-line tool but can also be
//! embedded by other configuration management tools.
//!
//! ## Quick Example
//!
//! ```
//! use kdb_state::backend::PluginCatalog;
//! use kdb_state::reconcile::{apply, ApplyOptions};
//! use kdb_state::resource;
//! use kdb_state::store::MemoryStore;
//!
//! let manifest = resource::parse(
//!     r#"
//! - key:
//!     name: /app/port
//!     value: 8080
//!     metadata:
//!       owner: ops
//! "#,
//! )
//! .unwrap();
//!
//! let store = MemoryStore::new();
//! let report = apply(&manifest, &store, &PluginCatalog::builtin(), &ApplyOptions::default()).unwrap();
//! assert_eq!(report.changed().count(), 1);
//!
//! let keys = store.snapshot().unwrap();
//! assert_eq!(keys.lookup("user/app/port").unwrap().value(), "8080");
//! ```
//!
//! ## Core Concepts
//!
//! - **Key names (`keyname`, `array`)**: validated hierarchical names with
//!   namespaces and cascading lookup, plus the array element encoding.
//! - **Key database (`store`)**: the session-based interface to the
//!   database, with in-memory and JSON file implementations.
//! - **Key state (`meta`, `comment`, `check`)**: metadata reconciliation,
//!   comment encoding and validation rules on specification keys.
//! - **Backends (`backend`)**: plugin catalog, chain building and the
//!   mount configuration layout.
//! - **Manifests (`resource`)**: the YAML resource schema and its validation.
//! - **Reconciliation (`reconcile`)**: applies a manifest resource by
//!   resource, each in its own session.
//!
//! ## Execution Flow
//!
//! 1.  **Parse**: read the manifest into `key` and `mount` resources.
//! 2.  **Validate**: check every resource before touching the database.
//! 3.  **Plan**: order mounts before the keys stored in them.
//! 4.  **Reconcile**: bring each resource in line, committing only changes.

pub mod array;
pub mod backend;
pub mod check;
pub mod comment;
pub mod defaults;
pub mod error;
pub mod keyname;
pub mod meta;
pub mod output;
pub mod reconcile;
pub mod resource;
pub mod store;
pub mod suggestions;

#[cfg(test)]
mod array_proptest;
