//! Asset entries: the identity of every object in the repository.
//!
//! An [`AssetEntry`] names a folder, sheet or resource by scope, type,
//! slash-separated path, optional owner and organization. Its canonical
//! [`identifier`](AssetEntry::identifier) is the key the object is stored
//! under. Entries compare and hash on those five fields only; the property
//! bag is carried along but never part of the identity.

use crate::IdentityId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Separator between identifier components.
const ID_SEPARATOR: char = '^';

/// Placeholder for an absent owner inside an identifier.
const NULL_OWNER: &str = "__NULL__";

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Alias shown instead of the entry name.
pub const PROP_ALIAS: &str = "_alias_";
/// Free-text description copied from the payload when listing.
pub const PROP_DESCRIPTION: &str = "_description_";
/// Localized display string filled in by listings.
pub const PROP_LOCALIZED: &str = "localStr";
/// Tooltip filled in by listings.
pub const PROP_TOOLTIP: &str = "Tooltip";
/// Identifier of a transient preview entry whose bookmarks should be kept.
pub const PROP_PREVIEW_SOURCE: &str = "preview.source";
/// Data source a physical table, logical model or partition belongs to.
pub const PROP_DATA_SOURCE: &str = "source";
/// Base model (or partition) an extended model/partition refines.
pub const PROP_BASE_MODEL: &str = "base.model";

static INVALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\^\\:*?"<>|~]"#).expect("Invalid entry name regex"));

// ============================================================================
// SCOPE
// ============================================================================

/// Visibility domain of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Entries owned by the external query repository.
    Query,
    /// Shared components: scripts, table styles, libraries.
    Component,
    /// The shared report tree.
    Report,
    /// Organization-wide assets.
    Global,
    /// Assets private to their owner.
    User,
    /// Scratch entries, never permission checked.
    Temporary,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::Query,
        Scope::Component,
        Scope::Report,
        Scope::Global,
        Scope::User,
        Scope::Temporary,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Scope::Query => "query",
            Scope::Component => "component",
            Scope::Report => "report",
            Scope::Global => "global",
            Scope::User => "user",
            Scope::Temporary => "temporary",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ScopeParseError> {
        match s.to_lowercase().as_str() {
            "query" => Ok(Scope::Query),
            "component" => Ok(Scope::Component),
            "report" => Ok(Scope::Report),
            "global" => Ok(Scope::Global),
            "user" => Ok(Scope::User),
            "temporary" => Ok(Scope::Temporary),
            _ => Err(ScopeParseError(s.to_string())),
        }
    }

    /// Scopes backed by the folder namespace of the repository store.
    pub fn is_namespace_scope(&self) -> bool {
        matches!(
            self,
            Scope::Report | Scope::Global | Scope::User | Scope::Temporary
        )
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid scope string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid scope: {0}")]
pub struct ScopeParseError(pub String);

// ============================================================================
// ENTRY TYPE
// ============================================================================

/// Kind of object an entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryType {
    Folder,
    Worksheet,
    Viewsheet,
    ViewsheetBookmark,
    ViewsheetSnapshot,
    Query,
    LogicalModel,
    Table,
    Column,
    DataSource,
    DataSourceFolder,
    PhysicalFolder,
    PhysicalTable,
    PhysicalColumn,
    TableStyle,
    TableStyleFolder,
    Script,
    ScriptFolder,
    Partition,
    Domain,
    Vpm,
    ScheduleTask,
    Dashboard,
    ExtendedModel,
    ExtendedPartition,
    Library,
}

impl EntryType {
    pub const ALL: [EntryType; 26] = [
        EntryType::Folder,
        EntryType::Worksheet,
        EntryType::Viewsheet,
        EntryType::ViewsheetBookmark,
        EntryType::ViewsheetSnapshot,
        EntryType::Query,
        EntryType::LogicalModel,
        EntryType::Table,
        EntryType::Column,
        EntryType::DataSource,
        EntryType::DataSourceFolder,
        EntryType::PhysicalFolder,
        EntryType::PhysicalTable,
        EntryType::PhysicalColumn,
        EntryType::TableStyle,
        EntryType::TableStyleFolder,
        EntryType::Script,
        EntryType::ScriptFolder,
        EntryType::Partition,
        EntryType::Domain,
        EntryType::Vpm,
        EntryType::ScheduleTask,
        EntryType::Dashboard,
        EntryType::ExtendedModel,
        EntryType::ExtendedPartition,
        EntryType::Library,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntryType::Folder => "Folder",
            EntryType::Worksheet => "Worksheet",
            EntryType::Viewsheet => "Viewsheet",
            EntryType::ViewsheetBookmark => "ViewsheetBookmark",
            EntryType::ViewsheetSnapshot => "ViewsheetSnapshot",
            EntryType::Query => "Query",
            EntryType::LogicalModel => "LogicalModel",
            EntryType::Table => "Table",
            EntryType::Column => "Column",
            EntryType::DataSource => "DataSource",
            EntryType::DataSourceFolder => "DataSourceFolder",
            EntryType::PhysicalFolder => "PhysicalFolder",
            EntryType::PhysicalTable => "PhysicalTable",
            EntryType::PhysicalColumn => "PhysicalColumn",
            EntryType::TableStyle => "TableStyle",
            EntryType::TableStyleFolder => "TableStyleFolder",
            EntryType::Script => "Script",
            EntryType::ScriptFolder => "ScriptFolder",
            EntryType::Partition => "Partition",
            EntryType::Domain => "Domain",
            EntryType::Vpm => "Vpm",
            EntryType::ScheduleTask => "ScheduleTask",
            EntryType::Dashboard => "Dashboard",
            EntryType::ExtendedModel => "ExtendedModel",
            EntryType::ExtendedPartition => "ExtendedPartition",
            EntryType::Library => "Library",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EntryTypeParseError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_db_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EntryTypeParseError(s.to_string()))
    }

    /// Types that contain other entries.
    pub fn is_folder(&self) -> bool {
        matches!(
            self,
            EntryType::Folder
                | EntryType::DataSourceFolder
                | EntryType::PhysicalFolder
                | EntryType::TableStyleFolder
                | EntryType::ScriptFolder
        )
    }

    /// Types whose payload is a [`Sheet`](crate::Sheet).
    pub fn is_sheet(&self) -> bool {
        matches!(
            self,
            EntryType::Worksheet
                | EntryType::Viewsheet
                | EntryType::ViewsheetSnapshot
                | EntryType::Dashboard
                | EntryType::Query
                | EntryType::Script
                | EntryType::TableStyle
                | EntryType::ScheduleTask
                | EntryType::Library
        )
    }

    pub fn is_worksheet(&self) -> bool {
        matches!(self, EntryType::Worksheet)
    }

    pub fn is_viewsheet(&self) -> bool {
        matches!(self, EntryType::Viewsheet | EntryType::ViewsheetSnapshot)
    }

    /// Data-model resources that live under a data source.
    pub fn is_data_model(&self) -> bool {
        matches!(
            self,
            EntryType::LogicalModel
                | EntryType::Partition
                | EntryType::ExtendedModel
                | EntryType::ExtendedPartition
                | EntryType::Table
                | EntryType::Column
                | EntryType::Domain
                | EntryType::Vpm
        )
    }

    /// The folder type that contains entries of this type.
    pub fn folder_type(&self) -> EntryType {
        match self {
            EntryType::Script | EntryType::ScriptFolder | EntryType::Library => {
                EntryType::ScriptFolder
            }
            EntryType::TableStyle | EntryType::TableStyleFolder => EntryType::TableStyleFolder,
            EntryType::PhysicalFolder | EntryType::PhysicalTable | EntryType::PhysicalColumn => {
                EntryType::PhysicalFolder
            }
            EntryType::DataSource | EntryType::DataSourceFolder => EntryType::DataSourceFolder,
            t if t.is_data_model() => EntryType::DataSourceFolder,
            _ => EntryType::Folder,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for EntryType {
    type Err = EntryTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid entry type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid entry type: {0}")]
pub struct EntryTypeParseError(pub String);

// ============================================================================
// ASSET ENTRY
// ============================================================================

/// Error when an identifier string cannot be parsed back into an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierParseError {
    #[error("Malformed identifier: {0}")]
    Malformed(String),

    #[error(transparent)]
    Scope(#[from] ScopeParseError),

    #[error(transparent)]
    EntryType(#[from] EntryTypeParseError),
}

/// Identity of a repository object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    scope: Scope,
    entry_type: EntryType,
    path: String,
    owner: Option<IdentityId>,
    org_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
}

impl AssetEntry {
    /// Create an entry. The path is normalised: leading, trailing and
    /// repeated separators are dropped.
    pub fn new(
        scope: Scope,
        entry_type: EntryType,
        path: impl AsRef<str>,
        owner: Option<IdentityId>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            entry_type,
            path: normalize_path(path.as_ref()),
            owner,
            org_id: org_id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// The root folder of a scope.
    pub fn root(
        scope: Scope,
        folder_type: EntryType,
        owner: Option<IdentityId>,
        org_id: impl Into<String>,
    ) -> Self {
        Self::new(scope, folder_type, "", owner, org_id)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> Option<&IdentityId> {
        self.owner.as_ref()
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_folder(&self) -> bool {
        self.entry_type.is_folder()
    }

    pub fn is_sheet(&self) -> bool {
        self.entry_type.is_sheet()
    }

    /// Last path segment; empty for a root.
    pub fn name(&self) -> &str {
        match self.path.rfind(PATH_SEPARATOR) {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Path of the containing folder; `None` for a root.
    pub fn parent_path(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(match self.path.rfind(PATH_SEPARATOR) {
            Some(idx) => &self.path[..idx],
            None => "",
        })
    }

    /// The folder entry that contains this entry.
    ///
    /// Nested folders keep their own type; anything else lives in the folder
    /// type returned by [`EntryType::folder_type`].
    pub fn parent(&self) -> Option<AssetEntry> {
        let parent_path = self.parent_path()?;
        let parent_type = if self.entry_type.is_folder() {
            self.entry_type
        } else {
            self.entry_type.folder_type()
        };
        Some(AssetEntry::new(
            self.scope,
            parent_type,
            parent_path,
            self.owner.clone(),
            self.org_id.clone(),
        ))
    }

    /// A direct child of this entry.
    pub fn child(&self, name: &str, entry_type: EntryType) -> AssetEntry {
        let path = if self.is_root() {
            name.to_string()
        } else {
            format!("{}{}{}", self.path, PATH_SEPARATOR, name)
        };
        AssetEntry::new(
            self.scope,
            entry_type,
            path,
            self.owner.clone(),
            self.org_id.clone(),
        )
    }

    /// True when `other` lives somewhere below this entry in the same
    /// namespace (scope, owner and organization).
    pub fn is_ancestor_of(&self, other: &AssetEntry) -> bool {
        if self.scope != other.scope || self.owner != other.owner || self.org_id != other.org_id {
            return false;
        }
        if self.is_root() {
            return !other.is_root();
        }
        other.path.len() > self.path.len()
            && other.path.starts_with(&self.path)
            && other.path[self.path.len()..].starts_with(PATH_SEPARATOR)
    }

    /// Re-home a descendant of `from` below `to`.
    ///
    /// The path prefix of `from` is replaced by the path of `to`; scope,
    /// owner and organization are copied from `to`; type and properties are
    /// kept.
    pub fn relocated(&self, from: &AssetEntry, to: &AssetEntry) -> AssetEntry {
        let suffix = if self == from {
            ""
        } else if from.is_root() {
            self.path.as_str()
        } else {
            self.path
                .strip_prefix(from.path.as_str())
                .unwrap_or(self.path.as_str())
        };
        let path = if to.is_root() {
            suffix.to_string()
        } else {
            format!("{}{}", to.path, suffix)
        };
        let mut moved = AssetEntry::new(
            to.scope,
            self.entry_type,
            path,
            to.owner.clone(),
            to.org_id.clone(),
        );
        moved.properties = self.properties.clone();
        moved
    }

    /// Rewrite a leading path prefix, keeping every other field.
    ///
    /// Returns `None` when the path is not `old_prefix` or below it.
    pub fn with_path_prefix(&self, old_prefix: &str, new_prefix: &str) -> Option<AssetEntry> {
        let old_prefix = normalize_path(old_prefix);
        let rest = if old_prefix.is_empty() {
            self.path.as_str()
        } else if self.path == old_prefix {
            ""
        } else {
            self.path
                .strip_prefix(old_prefix.as_str())
                .filter(|rest| rest.starts_with(PATH_SEPARATOR))?
        };
        let mut entry = self.clone();
        entry.path = normalize_path(&format!("{}/{}", new_prefix, rest));
        Some(entry)
    }

    /// Same entry with a different scope and owner.
    pub fn with_scope(&self, scope: Scope, owner: Option<IdentityId>) -> AssetEntry {
        let mut entry = self.clone();
        entry.scope = scope;
        entry.owner = owner;
        entry
    }

    /// Canonical store key: `scope^type^owner^path^org`.
    pub fn identifier(&self) -> String {
        let owner = self
            .owner
            .as_ref()
            .map(IdentityId::convert_to_key)
            .unwrap_or_else(|| NULL_OWNER.to_string());
        format!(
            "{scope}{sep}{ty}{sep}{owner}{sep}{path}{sep}{org}",
            scope = self.scope.as_db_str(),
            ty = self.entry_type.as_db_str(),
            owner = owner,
            path = self.path,
            org = self.org_id,
            sep = ID_SEPARATOR,
        )
    }

    /// Inverse of [`identifier`](Self::identifier).
    pub fn parse_identifier(identifier: &str) -> Result<AssetEntry, IdentifierParseError> {
        let malformed = || IdentifierParseError::Malformed(identifier.to_string());
        let mut head = identifier.splitn(4, ID_SEPARATOR);
        let scope = Scope::from_db_str(head.next().ok_or_else(malformed)?)?;
        let entry_type = EntryType::from_db_str(head.next().ok_or_else(malformed)?)?;
        let owner = head.next().ok_or_else(malformed)?;
        let rest = head.next().ok_or_else(malformed)?;
        let (path, org) = rest.rsplit_once(ID_SEPARATOR).ok_or_else(malformed)?;
        let owner = (owner != NULL_OWNER).then(|| IdentityId::parse_key(owner));
        Ok(AssetEntry::new(scope, entry_type, path, owner, org))
    }

    /// Whether every path segment is a legal entry name.
    pub fn has_valid_path(&self) -> bool {
        self.path.split(PATH_SEPARATOR).all(|segment| {
            self.path.is_empty() || is_valid_name(segment)
        })
    }

    // === Properties ===

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn alias(&self) -> Option<&str> {
        self.property(PROP_ALIAS)
    }

    pub fn description(&self) -> Option<&str> {
        self.property(PROP_DESCRIPTION)
    }

    /// Name to display: alias when set, otherwise the last path segment.
    pub fn display_name(&self) -> &str {
        self.alias()
            .filter(|alias| !alias.is_empty())
            .unwrap_or_else(|| self.name())
    }

    fn identity_tuple(&self) -> (Scope, EntryType, Option<&IdentityId>, &str, &str) {
        (
            self.scope,
            self.entry_type,
            self.owner.as_ref(),
            self.path.as_str(),
            self.org_id.as_str(),
        )
    }
}

impl PartialEq for AssetEntry {
    fn eq(&self, other: &Self) -> bool {
        self.identity_tuple() == other.identity_tuple()
    }
}

impl Eq for AssetEntry {}

impl Hash for AssetEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_tuple().hash(state);
    }
}

impl PartialOrd for AssetEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AssetEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity_tuple().cmp(&other.identity_tuple())
    }
}

impl fmt::Display for AssetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Collapse separators and trim; the root path is the empty string.
pub fn normalize_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Entry names may not be empty or contain identifier/reserved characters.
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !INVALID_NAME.is_match(name)
}

// =============================================================================
// TESTS
// =============================================================================
