//! Namespace listing.
//!
//! Listings take no lock. Each child is checked against the store, filtered
//! by selector and permission, and annotated from its folder metadata and
//! context sheet. Annotation is best effort.

use super::{is_corrupt_payload, AssetRepository};
use crate::QueryCatalog;
use folio_core::{
    AssetEntry, EntryMeta, EntrySelector, EntryType, FolioResult, Principal, RepositoryError,
    ResourceAction, Scope, PROP_ALIAS, PROP_DESCRIPTION, PROP_LOCALIZED, PROP_TOOLTIP,
};
use folio_storage::KeyFilter;

impl AssetRepository {
    /// Direct children of `folder` that `user` may perform `action` on.
    ///
    /// In `Report` scope, sub-folders the selector rejects are descended
    /// into, so the result holds matching entries only.
    pub fn get_entries(
        &self,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
    ) -> FolioResult<Vec<AssetEntry>> {
        self.list(folder, user, action, selector, false)
    }

    /// Every descendant of `folder` that `user` may perform `action` on.
    pub fn get_all_entries(
        &self,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
    ) -> FolioResult<Vec<AssetEntry>> {
        self.list(folder, user, action, selector, true)
    }

    fn list(
        &self,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
        recursive: bool,
    ) -> FolioResult<Vec<AssetEntry>> {
        if !folder.is_folder() {
            return Err(RepositoryError::FolderRequired {
                entry: folder.identifier(),
            }
            .into());
        }
        self.refresh()?;

        let mut out = Vec::new();
        match folder.scope() {
            Scope::Query => {
                let catalog = self.catalog.as_deref().ok_or_else(|| {
                    RepositoryError::InvalidStorage {
                        scope: folder.scope(),
                        entry: folder.identifier(),
                    }
                })?;
                self.list_query(catalog, folder, user, action, selector, recursive, &mut out)?;
            }
            Scope::Component => {
                out = self.list_components(folder, user, action, selector, recursive)?;
            }
            _ => self.list_namespace(folder, user, action, selector, recursive, &mut out)?,
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn list_query(
        &self,
        catalog: &dyn QueryCatalog,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
        recursive: bool,
        out: &mut Vec<AssetEntry>,
    ) -> FolioResult<()> {
        for child in catalog.children(folder)? {
            if self.check_asset_permission(user, &child, action).is_err() {
                continue;
            }
            if selector.matches(child.entry_type()) {
                out.push(child.clone());
            }
            if recursive && child.is_folder() {
                self.list_query(catalog, &child, user, action, selector, recursive, out)?;
            }
        }
        Ok(())
    }

    /// Scripts, libraries and table styles, found by key enumeration.
    fn list_components(
        &self,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
        recursive: bool,
    ) -> FolioResult<Vec<AssetEntry>> {
        let prefix = format!("{}^", Scope::Component.as_db_str());
        let keys = self
            .store
            .keys(&KeyFilter::prefix(prefix), folder.org_id())?;

        let wanted = |ty: EntryType| match folder.entry_type() {
            EntryType::ScriptFolder => matches!(ty, EntryType::Script | EntryType::Library),
            EntryType::TableStyleFolder => ty == EntryType::TableStyle,
            _ => matches!(
                ty,
                EntryType::Script | EntryType::Library | EntryType::TableStyle
            ),
        };

        Ok(keys
            .iter()
            .filter_map(|key| AssetEntry::parse_identifier(key).ok())
            .filter(|e| wanted(e.entry_type()))
            .filter(|e| {
                if recursive {
                    folder.is_root() || folder.is_ancestor_of(e)
                } else {
                    e.parent_path() == Some(folder.path())
                }
            })
            .filter(|e| selector.matches(e.entry_type()))
            .filter(|e| self.check_asset_permission(user, e, action).is_ok())
            .map(|e| self.annotate(&e, None))
            .collect())
    }

    fn list_namespace(
        &self,
        folder: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        selector: EntrySelector,
        recursive: bool,
        out: &mut Vec<AssetEntry>,
    ) -> FolioResult<()> {
        let loaded = match self.load_folder(folder)? {
            Some(loaded) => loaded,
            None if folder.is_root() => return Ok(()),
            None => {
                return Err(RepositoryError::NotFound {
                    entry: folder.identifier(),
                }
                .into())
            }
        };

        for child in loaded.children() {
            let entry = &child.entry;
            if !self.contains(entry)? {
                tracing::warn!(
                    folder = %folder,
                    entry = %entry,
                    "Skipping child missing from store"
                );
                continue;
            }
            if self.check_asset_permission(user, entry, action).is_err() {
                continue;
            }

            let matched = selector.matches(entry.entry_type());
            if matched {
                out.push(self.annotate(entry, Some(&child.meta)));
            }

            let transparent = !matched && folder.scope() == Scope::Report;
            if entry.is_folder() && (recursive || transparent) {
                match self.list_namespace(entry, user, action, selector, recursive, out) {
                    Ok(()) => {}
                    Err(e) if is_corrupt_payload(&e) || e.is_not_found() => {
                        tracing::warn!(folder = %entry, error = %e, "Skipping unreadable folder");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Copy of `entry` carrying its alias and description as properties.
    fn annotate(&self, entry: &AssetEntry, meta: Option<&EntryMeta>) -> AssetEntry {
        let mut annotated = entry.clone();
        if let Some(alias) = meta.and_then(|m| m.alias.as_deref()) {
            annotated.set_property(PROP_ALIAS, alias);
            annotated.set_property(PROP_LOCALIZED, alias);
        }
        if entry.is_sheet() {
            match self.load_context(entry) {
                Ok(Some(sheet)) => {
                    if let Some(description) = sheet.description.as_deref() {
                        annotated.set_property(PROP_DESCRIPTION, description);
                        annotated.set_property(PROP_TOOLTIP, description);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(entry = %entry, error = %e, "Failed to load description");
                }
            }
        }
        annotated
    }
}
