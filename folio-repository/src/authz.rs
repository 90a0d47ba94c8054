//! Authorization decision tree.
//!
//! Policy itself lives behind [`Authorization`]. This module only decides
//! *which* resource an entry maps to before asking it.

use folio_core::{
    AssetEntry, EntryType, FolioResult, PermissionError, Principal, ResourceAction, ResourceType,
    Scope, PROP_BASE_MODEL, PROP_DATA_SOURCE,
};

/// The capability-check collaborator.
pub trait Authorization: Send + Sync {
    fn has_capability(
        &self,
        principal: &Principal,
        resource_type: ResourceType,
        resource_path: &str,
        action: ResourceAction,
    ) -> bool;

    fn is_org_admin(&self, principal: &Principal) -> bool;

    /// Organization the current request runs in. Stands in for a missing
    /// organization on either side of a check.
    fn current_org_id(&self) -> String;

    /// Site administrators may cross organization boundaries.
    fn is_site_admin(&self, _principal: &Principal) -> bool {
        false
    }
}

/// Resource an entry resolves to for a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub path: String,
}

impl ResourceRef {
    fn new(resource_type: ResourceType, path: impl Into<String>) -> Self {
        Self {
            resource_type,
            path: path.into(),
        }
    }
}

/// Outcome of resolving an entry before any capability lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No check needed.
    Allowed,
    /// User-scoped entry: only its owner (or an org admin) may touch it.
    OwnerOnly,
    Check(ResourceRef),
}

/// Map an entry to the resource the security provider knows it by.
pub fn resolve_resource(entry: &AssetEntry) -> Resolution {
    let path = if entry.is_root() { "/" } else { entry.path() };
    let in_source = |p: &str| match entry.property(PROP_DATA_SOURCE) {
        Some(source) if !source.is_empty() => format!("{}/{}", source, p),
        _ => p.to_string(),
    };

    match entry.scope() {
        Scope::Temporary => Resolution::Allowed,
        Scope::User => Resolution::OwnerOnly,
        Scope::Query => Resolution::Check(ResourceRef::new(ResourceType::Query, path)),
        Scope::Component => {
            let resource_type = match entry.entry_type() {
                EntryType::TableStyle | EntryType::TableStyleFolder => ResourceType::TableStyle,
                _ => ResourceType::Script,
            };
            Resolution::Check(ResourceRef::new(resource_type, path))
        }
        Scope::Report => Resolution::Check(ResourceRef::new(ResourceType::Report, path)),
        Scope::Global => {
            let resource = match entry.entry_type() {
                EntryType::PhysicalTable | EntryType::PhysicalFolder | EntryType::PhysicalColumn => {
                    ResourceRef::new(ResourceType::PhysicalTable, in_source(path))
                }
                EntryType::LogicalModel
                | EntryType::Table
                | EntryType::Column
                | EntryType::Domain
                | EntryType::Vpm => ResourceRef::new(ResourceType::QueryModel, in_source(path)),
                EntryType::Partition => ResourceRef::new(ResourceType::Partition, in_source(path)),
                EntryType::ExtendedModel => {
                    ResourceRef::new(ResourceType::QueryModel, in_source(&extended_path(entry)))
                }
                EntryType::ExtendedPartition => {
                    ResourceRef::new(ResourceType::Partition, in_source(&extended_path(entry)))
                }
                EntryType::DataSource => ResourceRef::new(ResourceType::DataSource, path),
                EntryType::DataSourceFolder => {
                    ResourceRef::new(ResourceType::DataSourceFolder, path)
                }
                EntryType::Query => ResourceRef::new(ResourceType::Query, path),
                EntryType::Script | EntryType::Library => {
                    ResourceRef::new(ResourceType::Script, path)
                }
                EntryType::TableStyle => ResourceRef::new(ResourceType::TableStyle, path),
                EntryType::ScheduleTask => ResourceRef::new(ResourceType::ScheduleTask, path),
                _ => ResourceRef::new(ResourceType::Asset, path),
            };
            Resolution::Check(resource)
        }
    }
}

/// Extended models are secured under their base model: `base/name`.
fn extended_path(entry: &AssetEntry) -> String {
    match entry.property(PROP_BASE_MODEL) {
        Some(base) if !base.is_empty() => format!("{}/{}", base, entry.name()),
        _ => entry.path().to_string(),
    }
}

/// Check `action` on `entry` for `principal`.
///
/// The organization boundary is checked first; everything after that is
/// scope and type specific.
pub fn check_asset_permission(
    authz: &dyn Authorization,
    principal: &Principal,
    entry: &AssetEntry,
    action: ResourceAction,
) -> FolioResult<()> {
    let org_of = |org: &str| {
        if org.is_empty() {
            authz.current_org_id()
        } else {
            org.to_string()
        }
    };
    let entry_org = org_of(entry.org_id());
    if entry_org != org_of(&principal.org_id) && !authz.is_site_admin(principal) {
        return Err(PermissionError::CrossOrganization {
            principal: principal.to_string(),
            org_id: entry_org,
        }
        .into());
    }

    let allowed = match resolve_resource(entry) {
        Resolution::Allowed => true,
        Resolution::OwnerOnly => {
            entry.owner() == Some(&principal.identity()) || authz.is_org_admin(principal)
        }
        Resolution::Check(resource) => {
            authz.has_capability(principal, resource.resource_type, &resource.path, action)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(PermissionError::Denied {
            action,
            entry: entry.identifier(),
            principal: principal.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{FolioError, IdentityId};
    use std::sync::Mutex;

    /// Grants exactly the listed (type, path) pairs and records every query.
    struct Grants {
        allowed: Vec<(ResourceType, &'static str)>,
        site_admin: bool,
        asked: Mutex<Vec<(ResourceType, String)>>,
    }

    impl Grants {
        fn new(allowed: Vec<(ResourceType, &'static str)>) -> Self {
            Self {
                allowed,
                site_admin: false,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl Authorization for Grants {
        fn has_capability(
            &self,
            _principal: &Principal,
            resource_type: ResourceType,
            resource_path: &str,
            _action: ResourceAction,
        ) -> bool {
            self.asked
                .lock()
                .unwrap()
                .push((resource_type, resource_path.to_string()));
            self.allowed
                .iter()
                .any(|(t, p)| *t == resource_type && *p == resource_path)
        }

        fn is_org_admin(&self, _principal: &Principal) -> bool {
            false
        }

        fn current_org_id(&self) -> String {
            "o".to_string()
        }

        fn is_site_admin(&self, _principal: &Principal) -> bool {
            self.site_admin
        }
    }

    fn alice() -> Principal {
        Principal::new("alice", "o")
    }

    #[test]
    fn test_cross_org_rejected_before_capability_lookup() {
        let grants = Grants::new(vec![(ResourceType::Asset, "x")]);
        let foreign = AssetEntry::new(Scope::Global, EntryType::Worksheet, "x", None, "other");
        let err = check_asset_permission(&grants, &alice(), &foreign, ResourceAction::Read)
            .unwrap_err();
        assert!(matches!(
            err,
            FolioError::Permission(PermissionError::CrossOrganization { .. })
        ));
        assert!(grants.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_org_falls_back_to_current_org() {
        let grants = Grants::new(vec![(ResourceType::Asset, "x")]);
        let system = Principal::new("system", "");
        let local = AssetEntry::new(Scope::Global, EntryType::Worksheet, "x", None, "o");
        let foreign = AssetEntry::new(Scope::Global, EntryType::Worksheet, "x", None, "other");

        assert!(check_asset_permission(&grants, &system, &local, ResourceAction::Read).is_ok());
        let err = check_asset_permission(&grants, &system, &foreign, ResourceAction::Read)
            .unwrap_err();
        assert!(matches!(
            err,
            FolioError::Permission(PermissionError::CrossOrganization { .. })
        ));

        let unscoped = AssetEntry::new(Scope::Global, EntryType::Worksheet, "x", None, "");
        assert!(check_asset_permission(&grants, &alice(), &unscoped, ResourceAction::Read).is_ok());
    }

    #[test]
    fn test_site_admin_crosses_orgs() {
        let mut grants = Grants::new(vec![(ResourceType::Asset, "x")]);
        grants.site_admin = true;
        let foreign = AssetEntry::new(Scope::Global, EntryType::Worksheet, "x", None, "other");
        assert!(check_asset_permission(&grants, &alice(), &foreign, ResourceAction::Read).is_ok());
    }

    #[test]
    fn test_user_scope_owner_only() {
        let grants = Grants::new(vec![]);
        let mine = AssetEntry::new(
            Scope::User,
            EntryType::Worksheet,
            "w",
            Some(IdentityId::new("alice", "o")),
            "o",
        );
        let theirs = mine.with_scope(Scope::User, Some(IdentityId::new("bob", "o")));
        assert!(check_asset_permission(&grants, &alice(), &mine, ResourceAction::Write).is_ok());
        assert!(check_asset_permission(&grants, &alice(), &theirs, ResourceAction::Read).is_err());
    }

    #[test]
    fn test_temporary_always_allowed() {
        let grants = Grants::new(vec![]);
        let tmp = AssetEntry::new(Scope::Temporary, EntryType::Worksheet, "scratch", None, "o");
        assert!(check_asset_permission(&grants, &alice(), &tmp, ResourceAction::Delete).is_ok());
    }

    #[test]
    fn test_data_model_resources_resolve_under_source() {
        let physical = AssetEntry::new(Scope::Global, EntryType::PhysicalTable, "SALES", None, "o")
            .with_property(PROP_DATA_SOURCE, "warehouse");
        assert_eq!(
            resolve_resource(&physical),
            Resolution::Check(ResourceRef::new(ResourceType::PhysicalTable, "warehouse/SALES"))
        );

        let model = AssetEntry::new(Scope::Global, EntryType::LogicalModel, "Orders", None, "o")
            .with_property(PROP_DATA_SOURCE, "warehouse");
        assert_eq!(
            resolve_resource(&model),
            Resolution::Check(ResourceRef::new(ResourceType::QueryModel, "warehouse/Orders"))
        );

        let partition = AssetEntry::new(Scope::Global, EntryType::Partition, "P1", None, "o");
        assert_eq!(
            resolve_resource(&partition),
            Resolution::Check(ResourceRef::new(ResourceType::Partition, "P1"))
        );

        let extended = AssetEntry::new(Scope::Global, EntryType::ExtendedModel, "m/East", None, "o")
            .with_property(PROP_DATA_SOURCE, "warehouse")
            .with_property(PROP_BASE_MODEL, "Orders");
        assert_eq!(
            resolve_resource(&extended),
            Resolution::Check(ResourceRef::new(ResourceType::QueryModel, "warehouse/Orders/East"))
        );
    }

    #[test]
    fn test_component_and_report_resolution() {
        let style = AssetEntry::new(Scope::Component, EntryType::TableStyle, "s", None, "o");
        let script = AssetEntry::new(Scope::Component, EntryType::Script, "f", None, "o");
        let report_root = AssetEntry::root(Scope::Report, EntryType::Folder, None, "o");
        assert_eq!(
            resolve_resource(&style),
            Resolution::Check(ResourceRef::new(ResourceType::TableStyle, "s"))
        );
        assert_eq!(
            resolve_resource(&script),
            Resolution::Check(ResourceRef::new(ResourceType::Script, "f"))
        );
        assert_eq!(
            resolve_resource(&report_root),
            Resolution::Check(ResourceRef::new(ResourceType::Report, "/"))
        );
    }

    #[test]
    fn test_denied_carries_action_and_entry() {
        let grants = Grants::new(vec![]);
        let ws = AssetEntry::new(Scope::Global, EntryType::Worksheet, "w", None, "o");
        let err = check_asset_permission(&grants, &alice(), &ws, ResourceAction::Write).unwrap_err();
        match err {
            FolioError::Permission(PermissionError::Denied { action, entry, .. }) => {
                assert_eq!(action, ResourceAction::Write);
                assert_eq!(entry, ws.identifier());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
