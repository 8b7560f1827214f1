//! Catalog orchestration: the [`CatalogStore`], the [`IdentityResolver`],
//! the capability traits they consume and the background sync tasks that
//! connect them.

pub mod catalog;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod local;
pub mod sync;

pub use catalog::CatalogStore;
pub use config::{CatalogMode, IdentityConfig, StoreConfig};
pub use gateway::{GatewayError, IdentityProvider, ItemGateway, SignUpOutcome};
pub use identity::{IdentityResolver, SessionState};
pub use local::{LocalGateway, LocalIdentityProvider};
pub use sync::{ChangeSync, IdentitySync, ProviderSessionSync};
