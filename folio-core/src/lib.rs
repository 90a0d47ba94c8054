//! FOLIO Core - Entry Model and Payload Types
//!
//! Value types shared by every other crate: asset entries and their
//! identifiers, folder containers, sheet payloads, reverse-dependency records,
//! bookmarks, the error taxonomy and configuration. No storage, no locking.

mod bookmark;
mod config;
mod dependency;
mod entry;
mod error;
mod folder;
mod identity;
mod payload;
mod selector;
mod sheet;

pub use bookmark::*;
pub use config::*;
pub use dependency::*;
pub use entry::*;
pub use error::*;
pub use folder::*;
pub use identity::*;
pub use payload::*;
pub use selector::*;
pub use sheet::*;
