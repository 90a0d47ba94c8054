//! Results of structural mutations.
//!
//! A rename or removal that walks a corrupt subtree does not fail: the
//! offending links are dropped and reported here.

use crate::RenameDependencyInfo;
use folio_core::AssetEntry;
use std::collections::HashMap;
use std::fmt;

/// What kind of inconsistency was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairKind {
    /// A folder listed a child whose key is absent from the store.
    NotContained,
    /// A folder-typed child did not hold a folder payload.
    FolderRequired,
    /// The entry being operated on had no payload; treated as empty.
    MissingPayload,
}

impl RepairKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairKind::NotContained => "not_contained",
            RepairKind::FolderRequired => "folder_required",
            RepairKind::MissingPayload => "missing_payload",
        }
    }
}

impl fmt::Display for RepairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One repaired inconsistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Folder the dropped link lived in, when there was one.
    pub folder: Option<AssetEntry>,
    pub entry: AssetEntry,
    pub kind: RepairKind,
}

/// Result of a rename or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Completed,
    CompletedWithRepairs(Vec<Repair>),
}

impl MutationOutcome {
    pub fn repairs(&self) -> &[Repair] {
        match self {
            MutationOutcome::Completed => &[],
            MutationOutcome::CompletedWithRepairs(repairs) => repairs,
        }
    }

    pub fn has_repairs(&self) -> bool {
        !self.repairs().is_empty()
    }
}

/// State threaded through one locked mutation.
#[derive(Debug, Default)]
pub(crate) struct MutationContext {
    pub repairs: Vec<Repair>,
    pub tasks: RenameDependencyInfo,
    /// Entries moved so far, old to new.
    pub moves: HashMap<AssetEntry, AssetEntry>,
}

impl MutationContext {
    pub fn repair(&mut self, folder: Option<&AssetEntry>, entry: &AssetEntry, kind: RepairKind) {
        let folder_id = folder.map(AssetEntry::identifier).unwrap_or_default();
        tracing::warn!(
            folder = %folder_id,
            entry = %entry,
            kind = %kind,
            "Repairing namespace inconsistency"
        );
        self.repairs.push(Repair {
            folder: folder.cloned(),
            entry: entry.clone(),
            kind,
        });
    }

    pub fn record_move(&mut self, old: &AssetEntry, new: &AssetEntry) {
        self.moves.insert(old.clone(), new.clone());
    }

    /// Split into the caller-facing outcome and the deferred rename work.
    ///
    /// Tasks aimed at an entry that moved in the same mutation are pointed
    /// at its new location.
    pub fn finish(mut self) -> (MutationOutcome, RenameDependencyInfo) {
        let mut tasks = RenameDependencyInfo::new();
        for mut task in std::mem::take(&mut self.tasks.tasks) {
            if let Some(moved) = self.moves.get(&task.target_entry) {
                task.target_entry = moved.clone();
            }
            tasks.push(task);
        }
        let outcome = if self.repairs.is_empty() {
            MutationOutcome::Completed
        } else {
            MutationOutcome::CompletedWithRepairs(self.repairs)
        };
        (outcome, tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{EntryType, Scope};

    #[test]
    fn test_finish_without_repairs_is_completed() {
        let (outcome, tasks) = MutationContext::default().finish();
        assert_eq!(outcome, MutationOutcome::Completed);
        assert!(!outcome.has_repairs());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_repairs_surface_in_outcome() {
        let mut ctx = MutationContext::default();
        let folder = AssetEntry::new(Scope::Global, EntryType::Folder, "f", None, "o");
        let ghost = folder.child("ghost", EntryType::Worksheet);
        ctx.repair(Some(&folder), &ghost, RepairKind::NotContained);

        let (outcome, _) = ctx.finish();
        assert_eq!(outcome.repairs().len(), 1);
        assert_eq!(outcome.repairs()[0].kind, RepairKind::NotContained);
        assert_eq!(outcome.repairs()[0].folder.as_ref(), Some(&folder));
    }

    #[test]
    fn test_tasks_follow_moved_targets() {
        let mut ctx = MutationContext::default();
        let old_x = AssetEntry::new(Scope::Global, EntryType::Viewsheet, "a/x", None, "o");
        let new_x = AssetEntry::new(Scope::Global, EntryType::Viewsheet, "b/x", None, "o");
        let outside = AssetEntry::new(Scope::Global, EntryType::Viewsheet, "z", None, "o");
        for target in [&old_x, &outside] {
            ctx.tasks.push(crate::RenameTask {
                target_entry: target.clone(),
                rewrite_kind: crate::RewriteKind::Hyperlink,
                old_identifier: "global^Worksheet^__NULL__^a/y^o".into(),
                new_identifier: "global^Worksheet^__NULL__^b/y^o".into(),
            });
        }
        ctx.record_move(&old_x, &new_x);

        let (_, info) = ctx.finish();
        let targets: Vec<_> = info.tasks.iter().map(|t| t.target_entry.clone()).collect();
        assert_eq!(targets, vec![new_x, outside]);
    }
}
