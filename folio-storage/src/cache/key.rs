//! Organization-scoped cache keys.
//!
//! `OrgScopedKey`'s private inner struct means a key cannot be built without
//! naming the organization it belongs to, so one organization's cached
//! entries are never returned for another's lookups.

use folio_core::AssetEntry;
use std::fmt;

/// A cache key scoped to one organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrgScopedKey {
    inner: OrgKeyInner,
}

/// Private inner data - cannot be constructed externally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OrgKeyInner {
    org_id: String,
    identifier: String,
}

impl OrgScopedKey {
    pub fn new(org_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            inner: OrgKeyInner {
                org_id: org_id.into(),
                identifier: identifier.into(),
            },
        }
    }

    /// Key of an entry within its own organization.
    pub fn for_entry(entry: &AssetEntry) -> Self {
        Self::new(entry.org_id(), entry.identifier())
    }

    pub fn org_id(&self) -> &str {
        &self.inner.org_id
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }
}

impl fmt::Display for OrgScopedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.inner.org_id, self.inner.identifier)
    }
}
