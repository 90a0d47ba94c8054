//! Rename-transform hand-off.
//!
//! After a rename commits, dependents whose content still names the old
//! identifier must be rewritten. That rewriting happens elsewhere; the
//! repository only describes the work and submits it.

use folio_core::AssetEntry;
use std::fmt;

/// Which kind of reference inside the dependent has to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteKind {
    Hyperlink,
    EmbedViewsheet,
    AutoDrill,
    /// A schedule task's viewsheet reference.
    Viewsheet,
}

impl fmt::Display for RewriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RewriteKind::Hyperlink => "hyperlink",
            RewriteKind::EmbedViewsheet => "embed_viewsheet",
            RewriteKind::AutoDrill => "auto_drill",
            RewriteKind::Viewsheet => "viewsheet",
        };
        f.write_str(s)
    }
}

/// One dependent to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTask {
    pub target_entry: AssetEntry,
    pub rewrite_kind: RewriteKind,
    pub old_identifier: String,
    pub new_identifier: String,
}

/// A batch of rewrite tasks collected during one rename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameDependencyInfo {
    pub tasks: Vec<RenameTask>,
}

impl RenameDependencyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: RenameTask) {
        if !self.tasks.contains(&task) {
            self.tasks.push(task);
        }
    }

    pub fn merge(&mut self, other: RenameDependencyInfo) {
        for task in other.tasks {
            self.push(task);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Consumer of rename tasks. `submit` must not block on the rewrite itself.
pub trait RenameTransformWorker: Send + Sync {
    fn submit(&self, info: RenameDependencyInfo);
}

/// Worker that drops every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransformWorker;

impl RenameTransformWorker for NoopTransformWorker {
    fn submit(&self, info: RenameDependencyInfo) {
        tracing::debug!(tasks = info.len(), "Discarding rename tasks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{EntryType, Scope};

    fn task(path: &str) -> RenameTask {
        RenameTask {
            target_entry: AssetEntry::new(Scope::Global, EntryType::Viewsheet, path, None, "o"),
            rewrite_kind: RewriteKind::Hyperlink,
            old_identifier: "old".into(),
            new_identifier: "new".into(),
        }
    }

    #[test]
    fn test_merge_dedupes() {
        let mut a = RenameDependencyInfo::new();
        a.push(task("x"));
        let mut b = RenameDependencyInfo::new();
        b.push(task("x"));
        b.push(task("y"));
        a.merge(b);
        assert_eq!(a.len(), 2);
    }
}
