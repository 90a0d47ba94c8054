//! Scope-change and dependency validity rules.

use super::{AssetRepository, WriteGuard};
use folio_core::{AssetEntry, DependencyError, DependencyKind, FolioResult, Scope};
use std::collections::BTreeSet;

/// Verdict of [`AssetRepository::allows_scope_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeChange {
    Allowed,
    /// Dependents that would become illegal cross-scope references.
    Rejected(Vec<AssetEntry>),
}

impl ScopeChange {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ScopeChange::Allowed)
    }
}

/// Whether `dependent` blocks moving its target from `from` to `to`.
///
/// | from   | to Global/Report          | to User                   |
/// |--------|---------------------------|---------------------------|
/// | User   | reject User dependents    | allowed                   |
/// | Report | reject Report dependents  | reject Report dependents  |
/// | Global | allowed                   | allowed                   |
pub(crate) fn blocks_scope_change(from: Scope, to: Scope, dependent: &AssetEntry) -> bool {
    if from == to {
        return false;
    }
    match from {
        Scope::User => dependent.scope() == Scope::User,
        Scope::Report => dependent.scope() == Scope::Report,
        _ => false,
    }
}

impl AssetRepository {
    /// Whether the sheet at `entry` may move to `target` scope.
    pub fn allows_scope_change(&self, entry: &AssetEntry, target: Scope) -> FolioResult<ScopeChange> {
        if entry.scope() == target {
            return Ok(ScopeChange::Allowed);
        }
        let offenders: Vec<AssetEntry> = self
            .dependents_of(entry)?
            .into_iter()
            .filter(|d| blocks_scope_change(entry.scope(), target, d))
            .collect();
        if offenders.is_empty() {
            Ok(ScopeChange::Allowed)
        } else {
            Ok(ScopeChange::Rejected(offenders))
        }
    }

    /// Whether `entry` may depend on `dependency`.
    ///
    /// The dependency must exist (query-scope entries live elsewhere and are
    /// not checked). Temporary entries may depend on anything. A User-scoped
    /// dependency is only reachable from the same owner's User entries; a
    /// Temporary dependency only from Temporary entries.
    pub fn check_dependency_validity(
        &self,
        entry: &AssetEntry,
        dependency: &AssetEntry,
    ) -> FolioResult<()> {
        let invalid = |reason: &str| -> FolioResult<()> {
            Err(DependencyError::InvalidDependency {
                entry: entry.identifier(),
                dependency: dependency.identifier(),
                reason: reason.to_string(),
            }
            .into())
        };

        if dependency.scope() != Scope::Query && !self.contains(dependency)? {
            return invalid("dependency does not exist");
        }
        if entry.scope() == Scope::Temporary {
            return Ok(());
        }
        match dependency.scope() {
            Scope::User if entry.scope() != Scope::User => {
                invalid("user-scoped assets are private to their owner")
            }
            Scope::User if entry.owner() != dependency.owner() => {
                invalid("dependency belongs to another user")
            }
            Scope::Temporary => invalid("temporary assets cannot be referenced"),
            _ => Ok(()),
        }
    }

    /// Every known dependent of `entry`: the sheet's own dependent set
    /// merged with the reverse index record.
    ///
    /// An unreadable sheet contributes nothing; the index still answers.
    pub(crate) fn dependents_of(&self, entry: &AssetEntry) -> FolioResult<Vec<AssetEntry>> {
        let mut dependents = BTreeSet::new();
        if entry.is_sheet() {
            match self.load_sheet(entry) {
                Ok(Some(sheet)) => dependents.extend(sheet.dependents().cloned()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(entry = %entry, error = %e, "Unreadable sheet, using index only");
                }
            }
        }
        let record = self.index.get_dependencies(entry)?;
        dependents.extend(record.iter().map(|(_, d)| d.clone()));
        Ok(dependents.into_iter().collect())
    }

    /// Cut every edge between `entry` and `dependents`, on both sheets and
    /// in the reverse index.
    pub(crate) fn drop_dependency_edges(
        &self,
        entry: &AssetEntry,
        dependents: &[AssetEntry],
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        if let Some(sheet) = self.load_sheet(entry)? {
            let mut sheet = (*sheet).clone();
            let mut changed = false;
            for dependent in dependents {
                changed |= sheet.remove_dependent(dependent);
            }
            if changed {
                self.store_sheet(entry, &sheet, guard)?;
            }
        }

        for dependent in dependents {
            if dependent.is_sheet() {
                if let Some(sheet) = self.load_sheet(dependent)? {
                    let mut sheet = (*sheet).clone();
                    let before = sheet.references.len();
                    sheet.references.retain(|r| &r.target != entry);
                    let changed =
                        sheet.remove_dependency(entry) || sheet.references.len() != before;
                    if changed {
                        self.store_sheet(dependent, &sheet, guard)?;
                    }
                }
            }
            self.index
                .remove_dependency_from_file(entry, dependent, DependencyKind::Plain, false)?;
            self.index
                .remove_dependency_from_file(entry, dependent, DependencyKind::Embed, false)?;
        }

        tracing::info!(
            entry = %entry,
            dropped = dependents.len(),
            "Dropped dependency edges"
        );
        Ok(())
    }

    /// Apply the scope-change rule before moving `entry` to `target`.
    /// With `force` the offending edges are cut instead of failing.
    pub(crate) fn enforce_scope_change(
        &self,
        entry: &AssetEntry,
        target: Scope,
        outside: impl Fn(&AssetEntry) -> bool,
        force: bool,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<Vec<AssetEntry>> {
        let offenders = match self.allows_scope_change(entry, target)? {
            ScopeChange::Allowed => return Ok(Vec::new()),
            ScopeChange::Rejected(offenders) => offenders,
        };
        let offenders: Vec<AssetEntry> = offenders.into_iter().filter(|d| outside(d)).collect();
        if offenders.is_empty() || !force {
            return Ok(offenders);
        }
        tracing::warn!(
            entry = %entry,
            target = %target,
            dependents = offenders.len(),
            "Forced scope change, dropping dependents"
        );
        self.drop_dependency_edges(entry, &offenders, guard)?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::EntryType;

    fn dependent(scope: Scope) -> AssetEntry {
        AssetEntry::new(scope, EntryType::Viewsheet, "d", None, "o")
    }

    #[test]
    fn test_user_source_rejects_user_dependents_outside_user() {
        assert!(blocks_scope_change(Scope::User, Scope::Global, &dependent(Scope::User)));
        assert!(blocks_scope_change(Scope::User, Scope::Report, &dependent(Scope::User)));
        assert!(!blocks_scope_change(Scope::User, Scope::Global, &dependent(Scope::Global)));
        assert!(!blocks_scope_change(Scope::User, Scope::User, &dependent(Scope::User)));
    }

    #[test]
    fn test_report_source_rejects_report_dependents_everywhere() {
        assert!(blocks_scope_change(Scope::Report, Scope::Global, &dependent(Scope::Report)));
        assert!(blocks_scope_change(Scope::Report, Scope::User, &dependent(Scope::Report)));
        assert!(!blocks_scope_change(Scope::Report, Scope::User, &dependent(Scope::Global)));
    }

    #[test]
    fn test_global_source_always_allowed() {
        for to in [Scope::Report, Scope::User] {
            for d in Scope::ALL {
                assert!(!blocks_scope_change(Scope::Global, to, &dependent(d)));
            }
        }
    }
}
