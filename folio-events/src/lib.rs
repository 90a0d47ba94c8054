//! FOLIO Events - Asset Event Bus
//!
//! Repository mutations are announced as [`AssetEvent`]s on an [`EventBus`]
//! owned by the repository instance. Registration hands back a
//! [`ListenerHandle`] for explicit deregistration; nothing holds an owning
//! reference back to the repository.

mod bus;
mod event;

pub use bus::{AssetListener, EventBus, ListenerError, ListenerHandle};
pub use event::{AssetChange, AssetEvent};
