//! Namespace tests: folder creation, listing, rename and removal.

use folio_core::{
    AssetEntry, EntrySelector, EntryType, FolioConfig, ResourceAction, Scope, PROP_ALIAS,
    PROP_DESCRIPTION, PROP_LOCALIZED, PROP_TOOLTIP,
};
use folio_events::AssetChange;
use folio_repository::{AssetRepository, MutationOutcome, SheetLoad};
use folio_test_utils::assertions::*;
use folio_test_utils::fixtures::*;
use folio_test_utils::{InMemoryQueryCatalog, StaticAuthorization, TEST_ORG};
use folio_core::{FolioError, RepositoryError};
use folio_storage::InMemoryStore;
use std::sync::Arc;

fn ids(entries: &[AssetEntry]) -> Vec<String> {
    entries.iter().map(|e| e.path().to_string()).collect()
}

// ============================================================================
// ADD FOLDER
// ============================================================================

#[test]
fn test_add_folder_links_into_lazily_created_root() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    t.put_folder(&reports);

    assert!(t.stored(&reports));
    assert!(t.stored(&root(Scope::Global)));
    assert_eq!(ids(&t.list(&root(Scope::Global))), vec!["Reports"]);
}

#[test]
fn test_add_folder_emits_renamed_without_old_identifier() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    t.put_folder(&reports);

    let events = t.listener.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change, AssetChange::Renamed);
    assert_eq!(events[0].entry, reports);
    assert!(events[0].old_identifier.is_none());
}

#[test]
fn test_add_folder_rejects_duplicates() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    t.put_folder(&reports);
    assert_duplicate(&t.repo.add_folder(&reports, &alice()));
}

#[test]
fn test_add_folder_rejects_invalid_entries() {
    let t = TestRepository::new();
    assert_invalid_entry(&t.repo.add_folder(&root(Scope::Global), &alice()));
    assert_invalid_entry(&t.repo.add_folder(&worksheet(Scope::Global, "W"), &alice()));
    assert_invalid_entry(
        &t.repo
            .add_folder(&entry(Scope::Query, EntryType::Folder, "q"), &alice()),
    );
    assert_invalid_entry(&t.repo.add_folder(&folder(Scope::Global, "bad|name"), &alice()));
}

#[test]
fn test_add_folder_creates_missing_parents() {
    let t = TestRepository::new();
    t.put_folder(&folder(Scope::Global, "a/b/c"));
    assert_eq!(
        ids(&t.list_all(&root(Scope::Global))),
        vec!["a", "a/b", "a/b/c"]
    );
}

#[test]
fn test_add_folder_missing_parent_is_fatal_when_not_created() {
    let mut config = FolioConfig::default();
    config.repository.create_missing_parents = false;
    let t = TestRepository::with_config(config);

    let nested = folder(Scope::Global, "a/b");
    assert_not_found(&t.repo.add_folder(&nested, &alice()));
    assert!(!t.stored(&nested));
}

#[test]
fn test_add_folder_requires_write_on_parent() {
    let t = TestRepository::new();
    t.put_folder(&folder(Scope::Global, "Reports"));
    t.authz.deny("Reports", ResourceAction::Write);

    let result = t
        .repo
        .add_folder(&folder(Scope::Global, "Reports/Locked"), &alice());
    assert_permission_denied(&result);
}

#[test]
fn test_user_scope_is_owner_only() {
    let t = TestRepository::new();
    let mine = folder(Scope::User, "Mine");
    t.put_folder(&mine);

    assert_permission_denied(&t.repo.add_folder(&folder(Scope::User, "Mine/Other"), &bob()));
}

#[test]
fn test_cross_organization_access_is_rejected() {
    let t = TestRepository::new();
    let foreign = AssetEntry::new(Scope::Global, EntryType::Folder, "x", None, "other-org");
    match t.repo.add_folder(&foreign, &alice()) {
        Err(FolioError::Permission(folio_core::PermissionError::CrossOrganization { .. })) => {}
        other => panic!("Expected CrossOrganization, got {:?}", other),
    }
}

// ============================================================================
// LISTING
// ============================================================================

#[test]
fn test_listing_annotates_alias_and_description() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    let sales = worksheet(Scope::Global, "Reports/Sales");
    t.put_folder(&reports);
    t.put_sheet(&sales, sheet("q1").with_description("Quarterly numbers"));
    t.repo
        .set_alias(&sales, Some("Sales Q1".to_string()), &alice())
        .unwrap();

    let listed = t.list(&reports);
    assert_eq!(listed.len(), 1);
    let listed = &listed[0];
    assert_eq!(listed.property(PROP_ALIAS), Some("Sales Q1"));
    assert_eq!(listed.property(PROP_LOCALIZED), Some("Sales Q1"));
    assert_eq!(listed.property(PROP_DESCRIPTION), Some("Quarterly numbers"));
    assert_eq!(listed.property(PROP_TOOLTIP), Some("Quarterly numbers"));
}

#[test]
fn test_set_alias_on_unlinked_entry_fails() {
    let t = TestRepository::new();
    let stray = worksheet(Scope::Global, "Nowhere/W");
    match t.repo.set_alias(&stray, Some("x".to_string()), &alice()) {
        Err(FolioError::Repository(RepositoryError::NotContainedEntry { .. })) => {}
        other => panic!("Expected NotContainedEntry, got {:?}", other),
    }
}

#[test]
fn test_favorites_are_per_user() {
    let t = TestRepository::new();
    let sales = worksheet(Scope::Global, "Sales");
    t.put_sheet(&sales, sheet("s"));

    assert!(t.repo.set_favorite(&sales, &alice(), true).unwrap());
    assert!(!t.repo.set_favorite(&sales, &alice(), true).unwrap());
    assert!(t.repo.set_favorite(&sales, &bob(), true).unwrap());
    assert!(t.repo.set_favorite(&sales, &alice(), false).unwrap());
}

#[test]
fn test_listing_filters_by_selector_and_permission() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    t.put_folder(&reports);
    t.put_folder(&folder(Scope::Global, "Reports/Archive"));
    t.put_sheet(&worksheet(Scope::Global, "Reports/Sales"), sheet("s"));
    t.put_sheet(&worksheet(Scope::Global, "Reports/Secret"), sheet("x"));
    t.put_sheet(&viewsheet(Scope::Global, "Reports/Board"), sheet("v"));
    t.authz.deny("Reports/Secret", ResourceAction::Read);

    let worksheets = t
        .repo
        .get_entries(&reports, &alice(), ResourceAction::Read, EntrySelector::WORKSHEET)
        .unwrap();
    assert_eq!(ids(&worksheets), vec!["Reports/Sales"]);

    let mut everything = ids(&t.list(&reports));
    everything.sort();
    assert_eq!(everything, vec!["Reports/Archive", "Reports/Board", "Reports/Sales"]);
}

#[test]
fn test_report_scope_descends_into_unmatched_folders() {
    let t = TestRepository::new();
    t.put_folder(&folder(Scope::Report, "Sales"));
    t.put_sheet(&worksheet(Scope::Report, "Sales/Q1"), sheet("q1"));
    t.put_folder(&folder(Scope::Global, "Sales"));
    t.put_sheet(&worksheet(Scope::Global, "Sales/Q1"), sheet("q1"));

    let report = t
        .repo
        .get_entries(
            &root(Scope::Report),
            &alice(),
            ResourceAction::Read,
            EntrySelector::WORKSHEET,
        )
        .unwrap();
    assert_eq!(ids(&report), vec!["Sales/Q1"]);

    let global = t
        .repo
        .get_entries(
            &root(Scope::Global),
            &alice(),
            ResourceAction::Read,
            EntrySelector::WORKSHEET,
        )
        .unwrap();
    assert!(global.is_empty());
}

#[test]
fn test_listing_missing_folder() {
    let t = TestRepository::new();
    assert!(t.list(&root(Scope::Global)).is_empty());
    assert_not_found(&t.repo.get_entries(
        &folder(Scope::Global, "Ghost"),
        &alice(),
        ResourceAction::Read,
        EntrySelector::all(),
    ));
}

#[test]
fn test_component_listing_uses_key_enumeration() {
    let t = TestRepository::new();
    t.put_sheet(&script("util"), sheet("fn util()"));
    t.put_sheet(&script("lib/helpers"), sheet("fn help()"));
    t.put_sheet(
        &AssetEntry::new(Scope::Component, EntryType::TableStyle, "blue", None, TEST_ORG),
        sheet("style"),
    );

    let scripts = AssetEntry::root(Scope::Component, EntryType::ScriptFolder, None, TEST_ORG);
    assert_eq!(ids(&t.list(&scripts)), vec!["util"]);

    let mut all = ids(&t.list_all(&scripts));
    all.sort();
    assert_eq!(all, vec!["lib/helpers", "util"]);

    let styles = AssetEntry::root(Scope::Component, EntryType::TableStyleFolder, None, TEST_ORG);
    assert_eq!(ids(&t.list(&styles)), vec!["blue"]);
}

#[test]
fn test_query_scope_lists_through_catalog() {
    let sales = AssetEntry::new(Scope::Query, EntryType::Folder, "sales", None, TEST_ORG);
    let q1 = AssetEntry::new(Scope::Query, EntryType::Query, "sales/q1", None, TEST_ORG);
    let catalog = InMemoryQueryCatalog::new()
        .with_entry(sales.clone())
        .with_entry(q1.clone());

    let repo = AssetRepository::builder(
        Arc::new(InMemoryStore::new()),
        Arc::new(StaticAuthorization::allow_all()),
    )
    .query_catalog(Arc::new(catalog))
    .build()
    .unwrap();

    let query_root = AssetEntry::root(Scope::Query, EntryType::Folder, None, TEST_ORG);
    let direct = repo
        .get_entries(&query_root, &alice(), ResourceAction::Read, EntrySelector::all())
        .unwrap();
    assert_eq!(direct, vec![sales.clone()]);

    let all = repo
        .get_all_entries(&query_root, &alice(), ResourceAction::Read, EntrySelector::all())
        .unwrap();
    assert_eq!(all, vec![sales, q1]);
}

#[test]
fn test_query_scope_without_catalog_is_invalid_storage() {
    let t = TestRepository::new();
    let query_root = AssetEntry::root(Scope::Query, EntryType::Folder, None, TEST_ORG);
    match t.repo.get_entries(&query_root, &alice(), ResourceAction::Read, EntrySelector::all()) {
        Err(FolioError::Repository(RepositoryError::InvalidStorage { .. })) => {}
        other => panic!("Expected InvalidStorage, got {:?}", other),
    }
}

// ============================================================================
// RENAME
// ============================================================================

#[test]
fn test_reports_renamed_to_quarterly() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    let sales = worksheet(Scope::Global, "Reports/Sales");
    t.put_folder(&reports);
    t.put_sheet(&sales, sheet("sales"));

    let quarterly = folder(Scope::Global, "Quarterly");
    let outcome = t.repo.change_folder(&reports, &quarterly, &alice(), false).unwrap();
    assert_eq!(outcome, MutationOutcome::Completed);

    let top = t.list(&root(Scope::Global));
    assert_eq!(top, vec![quarterly.clone()]);
    let inside = t.list(&quarterly);
    assert_eq!(inside, vec![worksheet(Scope::Global, "Quarterly/Sales")]);

    assert!(!t.stored(&reports));
    assert!(!t.stored(&sales));
    assert!(t.stored(&worksheet(Scope::Global, "Quarterly/Sales")));
}

#[test]
fn test_rename_preserves_nested_paths_and_metadata() {
    let t = TestRepository::new();
    t.put_folder(&folder(Scope::Global, "a/x"));
    let deep = worksheet(Scope::Global, "a/x/deep");
    t.put_sheet(&deep, sheet("d"));
    t.repo
        .set_alias(&deep, Some("Deep one".to_string()), &alice())
        .unwrap();

    t.repo
        .change_folder(&folder(Scope::Global, "a"), &folder(Scope::Global, "b"), &alice(), false)
        .unwrap();

    let listed = t.list_all(&root(Scope::Global));
    assert_eq!(ids(&listed), vec!["b", "b/x", "b/x/deep"]);
    assert_eq!(listed[2].property(PROP_ALIAS), Some("Deep one"));
}

#[test]
fn test_folder_move_into_user_scope_takes_destination_owner() {
    let t = TestRepository::new();
    t.put_folder(&folder(Scope::Global, "Shared"));
    t.put_sheet(&worksheet(Scope::Global, "Shared/W"), sheet("w"));

    let private = folder(Scope::User, "Private");
    t.repo
        .change_folder(&folder(Scope::Global, "Shared"), &private, &alice(), false)
        .unwrap();

    let moved = t.list(&private);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].scope(), Scope::User);
    assert_eq!(moved[0].owner(), Some(&alice().identity()));
    assert_eq!(moved[0].path(), "Private/W");
}

fn load_sheet(t: &TestRepository, entry: &AssetEntry) -> std::sync::Arc<folio_core::Sheet> {
    t.repo
        .get_sheet(entry, &alice(), ResourceAction::Read, SheetLoad::Full)
        .unwrap()
        .unwrap_or_else(|| panic!("{} not stored", entry))
}

#[test]
fn test_user_folder_to_global_blocked_by_outside_user_dependent() {
    let t = TestRepository::new();
    let private = folder(Scope::User, "Private");
    let source = worksheet(Scope::User, "Private/W");
    let board = viewsheet(Scope::User, "Board");
    t.put_folder(&private);
    t.put_sheet(&source, sheet("w"));
    t.put_sheet(&board, sheet("board").with_dependency(source.clone()));

    let shared = folder(Scope::Global, "Shared");
    assert_violation(
        &t.repo.change_folder(&private, &shared, &alice(), false),
        &[board.clone()],
    );
    assert!(t.stored(&source));
    assert!(!t.stored(&shared));
    assert!(load_sheet(&t, &board).contains_dependency(&source));
    assert!(load_sheet(&t, &source).contains_dependent(&board));

    t.repo.change_folder(&private, &shared, &alice(), true).unwrap();
    let moved = worksheet(Scope::Global, "Shared/W");
    assert!(t.stored(&moved));
    assert!(!t.stored(&source));
    let board_sheet = load_sheet(&t, &board);
    assert!(!board_sheet.contains_dependency(&source));
    assert!(!board_sheet.contains_dependency(&moved));
    assert!(!load_sheet(&t, &moved).contains_dependent(&board));
    let index = t.repo.dependency_index();
    assert!(!index.get_dependencies(&moved).unwrap().contains_any(&board));
    assert!(!index.get_dependencies(&source).unwrap().contains_any(&board));
}

#[test]
fn test_report_folder_move_blocked_by_report_dependent() {
    let t = TestRepository::new();
    let reports = folder(Scope::Report, "R");
    let source = worksheet(Scope::Report, "R/src");
    let reader = viewsheet(Scope::Report, "Reader");
    t.put_folder(&reports);
    t.put_sheet(&source, sheet("src"));
    t.put_sheet(&reader, sheet("reader").with_dependency(source.clone()));

    let target = folder(Scope::Global, "G");
    assert_violation(
        &t.repo.change_folder(&reports, &target, &alice(), false),
        &[reader.clone()],
    );
    assert!(t.stored(&source));

    t.repo.change_folder(&reports, &target, &alice(), true).unwrap();
    assert!(t.stored(&worksheet(Scope::Global, "G/src")));
    assert!(!load_sheet(&t, &reader).contains_dependency(&source));
}

#[test]
fn test_dependents_inside_moved_folder_do_not_block() {
    let t = TestRepository::new();
    let private = folder(Scope::User, "Private");
    let source = worksheet(Scope::User, "Private/W");
    let inner = viewsheet(Scope::User, "Private/V");
    t.put_folder(&private);
    t.put_sheet(&source, sheet("w"));
    t.put_sheet(&inner, sheet("v").with_dependency(source.clone()));

    let outcome = t
        .repo
        .change_folder(&private, &folder(Scope::Global, "Shared"), &alice(), false)
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Completed);

    let moved_source = worksheet(Scope::Global, "Shared/W");
    let moved_inner = viewsheet(Scope::Global, "Shared/V");
    assert!(load_sheet(&t, &moved_inner).contains_dependency(&moved_source));
    assert!(load_sheet(&t, &moved_source).contains_dependent(&moved_inner));
}

#[test]
fn test_folder_rename_validation() {
    let t = TestRepository::new();
    let a = folder(Scope::Global, "a");
    t.put_folder(&a);
    t.put_folder(&folder(Scope::Global, "taken"));

    assert_invalid_entry(&t.repo.change_folder(&a, &folder(Scope::Global, "a/inside"), &alice(), false));
    assert_duplicate(&t.repo.change_folder(&a, &folder(Scope::Global, "taken"), &alice(), false));
    assert_not_found(&t.repo.change_folder(
        &folder(Scope::Global, "ghost"),
        &folder(Scope::Global, "g2"),
        &alice(),
        false,
    ));
    assert_eq!(
        t.repo.change_folder(&a, &a, &alice(), false).unwrap(),
        MutationOutcome::Completed
    );
}

#[test]
fn test_rename_requires_delete_on_source() {
    let t = TestRepository::new();
    let a = folder(Scope::Global, "a");
    t.put_folder(&a);
    t.authz.deny("a", ResourceAction::Delete);
    assert_permission_denied(&t.repo.change_folder(&a, &folder(Scope::Global, "b"), &alice(), false));
}

// ============================================================================
// REMOVE
// ============================================================================

#[test]
fn test_remove_folder_deletes_subtree_pre_order() {
    let t = TestRepository::new();
    let a = folder(Scope::Global, "a");
    let child = worksheet(Scope::Global, "a/w");
    t.put_folder(&a);
    t.put_sheet(&child, sheet("w"));
    t.listener.clear();

    let outcome = t.repo.remove_folder(&a, &alice(), false).unwrap();
    assert_eq!(outcome, MutationOutcome::Completed);
    assert!(!t.stored(&a));
    assert!(!t.stored(&child));
    assert!(t.list(&root(Scope::Global)).is_empty());

    let changes = t.listener.changes();
    assert_eq!(
        changes,
        vec![
            (AssetChange::ToBeDeleted, a.identifier()),
            (AssetChange::ToBeDeleted, child.identifier()),
            (AssetChange::Deleted, child.identifier()),
            (AssetChange::Deleted, a.identifier()),
        ]
    );
}

#[test]
fn test_remove_folder_blocked_by_outside_dependent() {
    let t = TestRepository::new();
    let base = worksheet(Scope::Global, "data/base");
    let board = viewsheet(Scope::Global, "boards/main");
    t.put_folder(&folder(Scope::Global, "data"));
    t.put_sheet(&base, sheet("base"));
    t.put_sheet(&board, sheet("board").with_dependency(base.clone()));

    let data = folder(Scope::Global, "data");
    assert_violation(&t.repo.remove_folder(&data, &alice(), false), &[board.clone()]);
    assert!(t.stored(&base));

    t.repo.remove_folder(&data, &alice(), true).unwrap();
    assert!(!t.stored(&base));
    assert!(t.stored(&board));
}

#[test]
fn test_remove_folder_ignores_dependents_inside_subtree() {
    let t = TestRepository::new();
    let base = worksheet(Scope::Global, "data/base");
    let derived = worksheet(Scope::Global, "data/derived");
    t.put_folder(&folder(Scope::Global, "data"));
    t.put_sheet(&base, sheet("base"));
    t.put_sheet(&derived, sheet("derived").with_dependency(base.clone()));

    t.repo
        .remove_folder(&folder(Scope::Global, "data"), &alice(), false)
        .unwrap();
    assert!(!t.stored(&base));
    assert!(!t.stored(&derived));
}

#[test]
fn test_remove_missing_folder_is_not_found() {
    let t = TestRepository::new();
    assert_not_found(&t.repo.remove_folder(&folder(Scope::Global, "ghost"), &alice(), false));
}
