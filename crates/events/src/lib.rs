//! Catalog event bus and push-change envelopes.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying user-facing [`CatalogEvent`]s.
//! - [`ChangeFeed`] -- the same fan-out for [`RemoteChange`]s a persistence
//!   backend pushes to every session.

pub mod bus;
pub mod change;

pub use bus::{CatalogEvent, EventBus, EventKind, Severity};
pub use change::{ChangeFeed, RemoteChange};
