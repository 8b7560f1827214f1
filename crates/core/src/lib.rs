//! Domain model for the style-reference catalog.
//!
//! Pure types and functions only: items, the catalog state reducer, search
//! and tag filtering, the error taxonomy and the export file format. Async
//! orchestration lives in `sref-store`.

pub mod error;
pub mod item;
pub mod search;
pub mod state;
pub mod transfer;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use item::{Item, ItemDraft, ItemPatch, TagSet};
pub use state::{CatalogAction, CatalogState, ViewMode};
pub use types::{ItemId, Principal, PrincipalId, Timestamp};
