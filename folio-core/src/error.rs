//! Error types for FOLIO operations

use crate::{AssetEntry, ResourceAction, Scope};
use thiserror::Error;

/// Store adapter errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Unexpected payload at {key}: expected {expected}, found {found}")]
    UnexpectedPayload {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Namespace errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Invalid entry {entry}: {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("No storage resolves for scope {scope} (entry {entry})")]
    InvalidStorage { scope: Scope, entry: String },

    #[error("Entry {entry} is not contained in folder {folder}")]
    NotContainedEntry { folder: String, entry: String },

    #[error("Entry {entry} is not a folder")]
    FolderRequired { entry: String },

    #[error("Entry not found: {entry}")]
    NotFound { entry: String },

    #[error("Entry {entry} already exists in folder {folder}")]
    DuplicateEntry { folder: String, entry: String },

    #[error("Cross joins are not allowed in {entry}")]
    CrossJoinDenied { entry: String },
}

/// Dependency integrity errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Change to {entry} would break {} dependent(s)", .dependents.len())]
    Violation {
        entry: String,
        dependents: Vec<AssetEntry>,
    },

    #[error("Dependency cycle: {entry} and {dependency} depend on each other")]
    Cycle { entry: String, dependency: String },

    #[error("{entry} may not depend on {dependency}: {reason}")]
    InvalidDependency {
        entry: String,
        dependency: String,
        reason: String,
    },
}

/// Authorization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Permission denied for {principal}: {action} on {entry}")]
    Denied {
        action: ResourceAction,
        entry: String,
        principal: String,
    },

    #[error("Principal {principal} may not access organization {org_id}")]
    CrossOrganization { principal: String, org_id: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Master error type for all FOLIO errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FolioError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl FolioError {
    /// Folder/child inconsistencies that traversal downgrades to a repair.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FolioError::Repository(
                RepositoryError::NotContainedEntry { .. } | RepositoryError::FolderRequired { .. }
            )
        )
    }

    /// Errors a `force` flag is allowed to swallow.
    pub fn is_dependency_violation(&self) -> bool {
        matches!(self, FolioError::Dependency(DependencyError::Violation { .. }))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, FolioError::Permission(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FolioError::Repository(RepositoryError::NotFound { .. }))
    }
}

/// Result type alias for FOLIO operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================
