//! Identity types: owners, principals and the actions they request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Separator used when an identity is rendered as a single string.
const IDENTITY_SEPARATOR: &str = "~;~";

/// An owner identity: a user name qualified by its organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId {
    pub name: String,
    pub org_id: String,
}

impl IdentityId {
    pub fn new(name: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org_id: org_id.into(),
        }
    }

    /// Render as `name~;~org`, the form embedded in entry identifiers.
    pub fn convert_to_key(&self) -> String {
        format!("{}{}{}", self.name, IDENTITY_SEPARATOR, self.org_id)
    }

    /// Parse the `name~;~org` form. A bare name gets an empty organization.
    pub fn parse_key(key: &str) -> Self {
        match key.split_once(IDENTITY_SEPARATOR) {
            Some((name, org)) => Self::new(name, org),
            None => Self::new(key, ""),
        }
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.convert_to_key())
    }
}

/// The caller on whose behalf a repository operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub org_id: String,
}

impl Principal {
    pub fn new(name: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org_id: org_id.into(),
        }
    }

    /// The owner identity this principal writes into user-scoped entries.
    pub fn identity(&self) -> IdentityId {
        IdentityId::new(self.name.clone(), self.org_id.clone())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.org_id)
    }
}

/// An action checked against the authorization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceAction {
    Read,
    Write,
    Delete,
    Admin,
}

impl ResourceAction {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ResourceAction::Read => "read",
            ResourceAction::Write => "write",
            ResourceAction::Delete => "delete",
            ResourceAction::Admin => "admin",
        }
    }
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Resource families understood by the authorization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Repository folders and sheets, addressed by path.
    Asset,
    /// Report-scope (shared report tree) folders and sheets.
    Report,
    DataSource,
    DataSourceFolder,
    PhysicalTable,
    QueryModel,
    Partition,
    Query,
    Script,
    TableStyle,
    ScheduleTask,
    Organization,
}
