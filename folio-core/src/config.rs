//! Configuration types

use crate::{ConfigError, FolioResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Capacity and lifetime of one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierSettings {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl TierSettings {
    pub const fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self { capacity, ttl_secs }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// The four cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Sheets without their body.
    pub contexts: TierSettings,
    pub sheets: TierSettings,
    pub folders: TierSettings,
    pub bookmarks: TierSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            contexts: TierSettings::new(500, 600),
            sheets: TierSettings::new(100, 600),
            folders: TierSettings::new(1000, 600),
            bookmarks: TierSettings::new(200, 600),
        }
    }
}

/// Reverse-index flush behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencySettings {
    pub flush_timeout_secs: u64,
    /// Worker threads for a flush; `None` means one per available core.
    pub flush_parallelism: Option<usize>,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            flush_timeout_secs: 300,
            flush_parallelism: None,
        }
    }
}

impl DependencySettings {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn effective_parallelism(&self) -> usize {
        self.flush_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Engine policy switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySettings {
    pub allow_cross_joins: bool,
    /// Create missing non-root parent folders instead of failing.
    pub create_missing_parents: bool,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            allow_cross_joins: true,
            create_missing_parents: true,
        }
    }
}

/// Master configuration struct. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FolioConfig {
    pub cache: CacheSettings,
    pub dependency: DependencySettings,
    pub repository: RepositorySettings,
}

impl FolioConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn from_path(path: &Path) -> FolioResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> FolioResult<Self> {
        let config: FolioConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Apply `FOLIO_*` environment overrides.
    ///
    /// Environment variables:
    /// - `FOLIO_CACHE_SHEETS_CAPACITY`: full-sheet tier capacity
    /// - `FOLIO_CACHE_TTL_SECS`: TTL applied to all four tiers
    /// - `FOLIO_DEPENDENCY_FLUSH_TIMEOUT_SECS`: overall flush wait
    /// - `FOLIO_DEPENDENCY_FLUSH_PARALLELISM`: flush worker count
    /// - `FOLIO_ALLOW_CROSS_JOINS`: `true` / `false`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// explicit variable lookup. Unparseable values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            lookup(name).and_then(|s| s.trim().parse().ok())
        }

        if let Some(capacity) = parsed(&lookup, "FOLIO_CACHE_SHEETS_CAPACITY") {
            self.cache.sheets.capacity = capacity;
        }
        if let Some(ttl) = parsed::<u64>(&lookup, "FOLIO_CACHE_TTL_SECS") {
            self.cache.contexts.ttl_secs = ttl;
            self.cache.sheets.ttl_secs = ttl;
            self.cache.folders.ttl_secs = ttl;
            self.cache.bookmarks.ttl_secs = ttl;
        }
        if let Some(timeout) = parsed(&lookup, "FOLIO_DEPENDENCY_FLUSH_TIMEOUT_SECS") {
            self.dependency.flush_timeout_secs = timeout;
        }
        if let Some(parallelism) = parsed(&lookup, "FOLIO_DEPENDENCY_FLUSH_PARALLELISM") {
            self.dependency.flush_parallelism = Some(parallelism);
        }
        if let Some(allow) = parsed(&lookup, "FOLIO_ALLOW_CROSS_JOINS") {
            self.repository.allow_cross_joins = allow;
        }
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every tier capacity > 0
    /// - flush_timeout_secs > 0
    /// - flush_parallelism > 0 when set
    pub fn validate(&self) -> FolioResult<()> {
        let tiers = [
            ("cache.contexts.capacity", &self.cache.contexts),
            ("cache.sheets.capacity", &self.cache.sheets),
            ("cache.folders.capacity", &self.cache.folders),
            ("cache.bookmarks.capacity", &self.cache.bookmarks),
        ];
        for (field, tier) in tiers {
            if tier.capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    value: tier.capacity.to_string(),
                    reason: "capacity must be greater than 0".to_string(),
                }
                .into());
            }
        }

        if self.dependency.flush_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dependency.flush_timeout_secs",
                value: "0".to_string(),
                reason: "flush timeout must be positive".to_string(),
            }
            .into());
        }

        if self.dependency.flush_parallelism == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "dependency.flush_parallelism",
                value: "0".to_string(),
                reason: "flush parallelism must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
