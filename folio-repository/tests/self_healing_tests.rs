//! Traversal over inconsistent namespaces: dangling links, corrupt payloads
//! and orphaned content.

use folio_core::{Folder, Payload, Scope};
use folio_repository::{MutationOutcome, Repair, RepairKind};
use folio_storage::KeyValueStore;
use folio_test_utils::fixtures::*;
use folio_test_utils::TEST_ORG;

#[test]
fn test_remove_folder_reports_dangling_child() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    let sales = worksheet(Scope::Global, "Reports/Sales");
    t.put_folder(&reports);
    t.put_sheet(&sales, sheet("s"));
    t.store.remove(&sales.identifier(), TEST_ORG).unwrap();

    let outcome = t.repo.remove_folder(&reports, &alice(), false).unwrap();
    assert_eq!(
        outcome,
        MutationOutcome::CompletedWithRepairs(vec![Repair {
            folder: Some(reports.clone()),
            entry: sales,
            kind: RepairKind::NotContained,
        }])
    );
    assert!(!t.stored(&reports));
    assert!(t.list(&root(Scope::Global)).is_empty());
}

#[test]
fn test_change_folder_drops_dangling_child() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    let sales = worksheet(Scope::Global, "Reports/Sales");
    let kept = worksheet(Scope::Global, "Reports/Kept");
    t.put_folder(&reports);
    t.put_sheet(&sales, sheet("s"));
    t.put_sheet(&kept, sheet("k"));
    t.store.remove(&sales.identifier(), TEST_ORG).unwrap();

    let archive = folder(Scope::Global, "Archive");
    let outcome = t.repo.change_folder(&reports, &archive, &alice(), false).unwrap();

    assert_eq!(outcome.repairs().len(), 1);
    assert_eq!(outcome.repairs()[0].entry, sales);
    assert_eq!(outcome.repairs()[0].kind, RepairKind::NotContained);
    assert_eq!(
        t.list(&archive),
        vec![worksheet(Scope::Global, "Archive/Kept")]
    );
}

#[test]
fn test_remove_linked_but_missing_sheet_unlinks() {
    let t = TestRepository::new();
    let sales = worksheet(Scope::Global, "Sales");
    t.put_sheet(&sales, sheet("s"));
    t.store.remove(&sales.identifier(), TEST_ORG).unwrap();

    let outcome = t.repo.remove_sheet(&sales, &alice(), false).unwrap();
    assert!(outcome.has_repairs());
    assert_eq!(outcome.repairs()[0].kind, RepairKind::NotContained);
    assert!(t.list(&root(Scope::Global)).is_empty());

    // Nothing left to repair the second time.
    assert!(t.repo.remove_sheet(&sales, &alice(), false).is_err());
}

#[test]
fn test_remove_corrupt_sheet() {
    let t = TestRepository::new();
    let sales = worksheet(Scope::Global, "Sales");
    t.put_sheet(&sales, sheet("s"));
    t.store
        .put_raw(&sales.identifier(), TEST_ORG, b"not json".to_vec())
        .unwrap();

    let outcome = t.repo.remove_sheet(&sales, &alice(), false).unwrap();
    assert_eq!(
        outcome.repairs(),
        &[Repair {
            folder: Some(root(Scope::Global)),
            entry: sales.clone(),
            kind: RepairKind::MissingPayload,
        }]
    );
    assert!(!t.stored(&sales));
    assert!(t.list(&root(Scope::Global)).is_empty());
}

#[test]
fn test_remove_folder_with_mistyped_child() {
    let t = TestRepository::new();
    let parent = folder(Scope::Global, "p");
    let child = folder(Scope::Global, "p/sub");
    t.put_folder(&child);
    t.store
        .put(&child.identifier(), TEST_ORG, &Payload::sheet(sheet("not a folder")))
        .unwrap();

    let outcome = t.repo.remove_folder(&parent, &alice(), false).unwrap();
    assert_eq!(outcome.repairs().len(), 1);
    assert_eq!(outcome.repairs()[0].entry, child);
    assert_eq!(outcome.repairs()[0].kind, RepairKind::FolderRequired);
    assert!(!t.stored(&child));
    assert!(!t.stored(&parent));
}

#[test]
fn test_listing_skips_missing_and_unreadable_children() {
    let t = TestRepository::new();
    let reports = folder(Scope::Global, "Reports");
    let broken = folder(Scope::Global, "Reports/Broken");
    let gone = worksheet(Scope::Global, "Reports/Gone");
    t.put_folder(&broken);
    t.put_sheet(&gone, sheet("g"));
    t.put_sheet(&worksheet(Scope::Global, "Reports/Broken/Inner"), sheet("i"));

    t.store.remove(&gone.identifier(), TEST_ORG).unwrap();
    t.store
        .put_raw(&broken.identifier(), TEST_ORG, b"{".to_vec())
        .unwrap();

    assert_eq!(t.list(&reports), vec![broken.clone()]);
    assert_eq!(t.list_all(&reports), vec![broken]);
}

#[test]
fn test_orphaned_folder_payload_is_adopted() {
    let t = TestRepository::new();
    let orphan = folder(Scope::Global, "Orphan");
    t.store
        .put(&orphan.identifier(), TEST_ORG, &Payload::Folder(Folder::new()))
        .unwrap();
    assert!(t.list(&root(Scope::Global)).is_empty());

    t.put_folder(&orphan);
    assert_eq!(t.list(&root(Scope::Global)), vec![orphan]);
}
