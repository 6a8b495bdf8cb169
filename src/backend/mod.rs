//! # Backends
//!
//! A backend makes an external configuration file part of the key database:
//! a chain of plugins (a resolver locating the file, a storage plugin
//! parsing it, plus any checking or filtering plugins) bound to a
//! mountpoint.
//!
//! ## Key Components
//!
//! - **`PluginSpec`**: a plugin in the chain with its settings.
//! - **`PluginCatalog`**: what each available plugin provides, needs and
//!   recommends.
//! - **`BackendBuilder`** / **`MountBackendBuilder`**: assembles a chain and
//!   resolves needs against the catalog.
//! - **`compose`**: turns a `MountRequest` into a serialized backend,
//!   deciding which requested plugins have to be added explicitly and which
//!   the resolver pulls in anyway.
//! - **`check_sync`**: compares a live chain against a request.
//! - **`mountconf`**: the on-store layout of mounted backends.

pub mod builder;
pub mod catalog;
pub mod compose;
pub mod mountconf;
pub mod plugin;

pub use builder::{BackendBuilder, MountBackendBuilder};
pub use catalog::{PluginCatalog, PluginInfo};
pub use compose::{check_sync, compose, Composition, MountRequest, SyncReport};
pub use mountconf::{MountInfo, MOUNTPOINTS_ROOT};
pub use plugin::PluginSpec;
