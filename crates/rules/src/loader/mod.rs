//! Filesystem trigger loader with hot-reload via `notify` watcher.
//!
//! Reads trigger documents (YAML or JSON) from a directory tree, keeps the
//! parsed documents keyed by `metadata.id`, and maintains the live
//! event-name → [`Trigger`](crate::schema::Trigger) table that evaluations
//! snapshot.

mod core;
mod error;
mod watcher;


pub use self::core::{TriggerLoader, TriggerTable};
pub use self::error::{LoadResult, LoadStatus, LoaderError, Result};
