//! Everything the repository persists under one store key.

use crate::{BookmarkSet, DependencyRecord, Folder, Sheet};
use serde::{Deserialize, Serialize};

/// A stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Folder(Folder),
    Sheet(Box<Sheet>),
    Dependencies(DependencyRecord),
    Bookmarks(BookmarkSet),
    /// Cached snapshot data, opaque bytes.
    Snapshot(Vec<u8>),
}

impl Payload {
    pub fn sheet(sheet: Sheet) -> Self {
        Payload::Sheet(Box::new(sheet))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Folder(_) => "folder",
            Payload::Sheet(_) => "sheet",
            Payload::Dependencies(_) => "dependencies",
            Payload::Bookmarks(_) => "bookmarks",
            Payload::Snapshot(_) => "snapshot",
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Payload::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn as_sheet(&self) -> Option<&Sheet> {
        match self {
            Payload::Sheet(sheet) => Some(sheet),
            _ => None,
        }
    }

    pub fn into_folder(self) -> Option<Folder> {
        match self {
            Payload::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn into_sheet(self) -> Option<Sheet> {
        match self {
            Payload::Sheet(sheet) => Some(*sheet),
            _ => None,
        }
    }

    pub fn into_dependencies(self) -> Option<DependencyRecord> {
        match self {
            Payload::Dependencies(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_bookmarks(self) -> Option<BookmarkSet> {
        match self {
            Payload::Bookmarks(set) => Some(set),
            _ => None,
        }
    }
}
