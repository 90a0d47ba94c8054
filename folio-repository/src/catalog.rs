//! External query repository consulted for `Query` scope listings.

use folio_core::{AssetEntry, FolioResult};

/// Tree of query-scope entries maintained outside this repository.
pub trait QueryCatalog: Send + Sync {
    /// Direct children of `folder`. Unknown folders yield an empty list.
    fn children(&self, folder: &AssetEntry) -> FolioResult<Vec<AssetEntry>>;
}
