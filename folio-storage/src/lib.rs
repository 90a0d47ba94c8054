//! FOLIO Storage - Store Adapter and Cache Layer
//!
//! Defines the key/value contract the repository persists through, an
//! in-memory implementation of it, and the four-tier cache that sits in
//! front of it.

pub mod cache;
mod memory;
mod store;
mod watermark;

pub use cache::{CacheStats, OrgScopedKey, RepositoryCache, RepositoryCacheStats, TierCache};
pub use memory::InMemoryStore;
pub use store::{
    ChangeKind, KeyFilter, KeyValueStore, StoreChange, StoreListener, SubscriptionId,
};
pub use watermark::Watermark;
