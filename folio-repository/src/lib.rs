//! FOLIO Repository - Namespace Engine and Dependency Index
//!
//! The asset repository proper: folder hierarchy maintenance over a
//! [`KeyValueStore`](folio_storage::KeyValueStore), sheet persistence with
//! bidirectional dependency bookkeeping, scope-change rules, self-healing
//! traversal and a batched reverse-dependency index.
//!
//! Authorization, query catalogs and rename transforms are collaborators
//! supplied by the host through the traits re-exported here.

mod authz;
mod catalog;
mod engine;
mod index;
mod outcome;
mod transform;

pub use authz::{check_asset_permission, resolve_resource, Authorization, Resolution, ResourceRef};
pub use catalog::QueryCatalog;
pub use engine::{AssetRepository, AssetRepositoryBuilder, ScopeChange, SetSheetOptions, SheetLoad};
pub use index::{dependency_key, rewrite_kind, DependencyIndex, FlushReport, DEPENDENCY_KEY_PREFIX};
pub use outcome::{MutationOutcome, Repair, RepairKind};
pub use transform::{
    NoopTransformWorker, RenameDependencyInfo, RenameTask, RenameTransformWorker, RewriteKind,
};

pub(crate) use outcome::MutationContext;
