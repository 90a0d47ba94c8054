//! FOLIO Test Utilities
//!
//! Shared test infrastructure for the FOLIO workspace:
//! - Proptest generators for entries, paths and sheets
//! - Mock collaborators (authorization, transform worker, query catalog)
//! - A recording event listener
//! - Fixtures for common repository setups
//! - Assertions over the error taxonomy

pub use folio_core::{
    AssetEntry, DependencyError, DependencyKind, EntrySelector, EntryType, FolioConfig,
    FolioError, FolioResult, IdentityId, PermissionError, Principal, RepositoryError,
    ResourceAction, ResourceType, Scope, Sheet, SheetReference,
};
pub use folio_events::{AssetChange, AssetEvent, AssetListener, ListenerError};
pub use folio_repository::{
    AssetRepository, Authorization, QueryCatalog, RenameDependencyInfo, RenameTransformWorker,
};
pub use folio_storage::InMemoryStore;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, Once};

/// Organization every fixture lives in.
pub const TEST_ORG: &str = "host-org";

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Authorization that grants everything except explicitly denied
/// `(resource path, action)` pairs.
#[derive(Debug)]
pub struct StaticAuthorization {
    org_id: String,
    org_admins: BTreeSet<String>,
    site_admins: BTreeSet<String>,
    denied: Mutex<BTreeSet<(String, ResourceAction)>>,
}

impl StaticAuthorization {
    pub fn allow_all() -> Self {
        Self {
            org_id: TEST_ORG.to_string(),
            org_admins: BTreeSet::new(),
            site_admins: BTreeSet::new(),
            denied: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_org_admin(mut self, name: &str) -> Self {
        self.org_admins.insert(name.to_string());
        self
    }

    pub fn with_site_admin(mut self, name: &str) -> Self {
        self.site_admins.insert(name.to_string());
        self
    }

    /// Deny `action` on the resource path (`/` for roots).
    pub fn deny(&self, path: &str, action: ResourceAction) {
        locked(&self.denied).insert((path.to_string(), action));
    }

    pub fn allow(&self, path: &str, action: ResourceAction) {
        locked(&self.denied).remove(&(path.to_string(), action));
    }
}

impl Authorization for StaticAuthorization {
    fn has_capability(
        &self,
        _principal: &Principal,
        _resource_type: ResourceType,
        resource_path: &str,
        action: ResourceAction,
    ) -> bool {
        !locked(&self.denied).contains(&(resource_path.to_string(), action))
    }

    fn is_org_admin(&self, principal: &Principal) -> bool {
        self.org_admins.contains(&principal.name)
    }

    fn current_org_id(&self) -> String {
        self.org_id.clone()
    }

    fn is_site_admin(&self, principal: &Principal) -> bool {
        self.site_admins.contains(&principal.name)
    }
}

/// Listener that keeps every event it sees.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<AssetEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AssetEvent> {
        locked(&self.events).clone()
    }

    /// `(change, identifier)` pairs in delivery order.
    pub fn changes(&self) -> Vec<(AssetChange, String)> {
        locked(&self.events)
            .iter()
            .map(|e| (e.change, e.entry.identifier()))
            .collect()
    }

    pub fn clear(&self) {
        locked(&self.events).clear();
    }
}

impl AssetListener for RecordingListener {
    fn on_event(&self, event: &AssetEvent) -> Result<(), ListenerError> {
        locked(&self.events).push(event.clone());
        Ok(())
    }
}

/// Transform worker that keeps every submitted batch.
#[derive(Debug, Default)]
pub struct RecordingTransformWorker {
    batches: Mutex<Vec<RenameDependencyInfo>>,
}

impl RecordingTransformWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<RenameDependencyInfo> {
        locked(&self.batches).clone()
    }
}

impl RenameTransformWorker for RecordingTransformWorker {
    fn submit(&self, info: RenameDependencyInfo) {
        locked(&self.batches).push(info);
    }
}

/// Query catalog backed by a map of folder path to children.
#[derive(Debug, Default)]
pub struct InMemoryQueryCatalog {
    tree: BTreeMap<String, Vec<AssetEntry>>,
}

impl InMemoryQueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under its parent folder.
    pub fn with_entry(mut self, entry: AssetEntry) -> Self {
        let parent = entry.parent_path().unwrap_or_default().to_string();
        self.tree.entry(parent).or_default().push(entry);
        self
    }
}

impl QueryCatalog for InMemoryQueryCatalog {
    fn children(&self, folder: &AssetEntry) -> FolioResult<Vec<AssetEntry>> {
        Ok(self.tree.get(folder.path()).cloned().unwrap_or_default())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for FOLIO value types.

    use super::*;
    use proptest::prelude::*;

    /// A legal entry name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 _-]{0,11}".prop_map(|s| s.trim().to_string())
    }

    /// A legal, non-root path of one to four segments.
    pub fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_name(), 1..=4).prop_map(|segments| segments.join("/"))
    }

    /// A scope with a folder namespace.
    pub fn arb_namespace_scope() -> impl Strategy<Value = Scope> {
        prop_oneof![Just(Scope::Report), Just(Scope::Global), Just(Scope::User)]
    }

    /// A sheet type that lives in plain folders.
    pub fn arb_report_sheet_type() -> impl Strategy<Value = EntryType> {
        prop_oneof![
            Just(EntryType::Worksheet),
            Just(EntryType::Viewsheet),
            Just(EntryType::Dashboard),
            Just(EntryType::ScheduleTask),
        ]
    }

    pub fn arb_entry_type() -> impl Strategy<Value = EntryType> {
        proptest::sample::select(EntryType::ALL.to_vec())
    }

    /// An entry in `scope`, owned by `alice` when the scope is `User`.
    pub fn arb_entry(scope: Scope) -> impl Strategy<Value = AssetEntry> {
        (arb_entry_type(), arb_path()).prop_map(move |(ty, path)| {
            AssetEntry::new(scope, ty, path, fixtures::owner_for(scope), TEST_ORG)
        })
    }

    /// A sheet with an opaque body, optional description and no edges.
    pub fn arb_sheet() -> impl Strategy<Value = Sheet> {
        (any::<i64>(), "[a-z ]{0,24}", proptest::option::of("[A-Za-z ]{1,32}")).prop_map(
            |(n, text, description)| {
                let mut sheet = Sheet::new(serde_json::json!({ "n": n, "text": text }));
                sheet.description = description;
                sheet
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built repositories, principals and entries.

    use super::*;

    pub fn alice() -> Principal {
        Principal::new("alice", TEST_ORG)
    }

    pub fn bob() -> Principal {
        Principal::new("bob", TEST_ORG)
    }

    /// `alice` for User scope, nobody otherwise.
    pub fn owner_for(scope: Scope) -> Option<IdentityId> {
        (scope == Scope::User).then(|| alice().identity())
    }

    pub fn root(scope: Scope) -> AssetEntry {
        AssetEntry::root(scope, EntryType::Folder, owner_for(scope), TEST_ORG)
    }

    pub fn folder(scope: Scope, path: &str) -> AssetEntry {
        AssetEntry::new(scope, EntryType::Folder, path, owner_for(scope), TEST_ORG)
    }

    pub fn entry(scope: Scope, entry_type: EntryType, path: &str) -> AssetEntry {
        AssetEntry::new(scope, entry_type, path, owner_for(scope), TEST_ORG)
    }

    pub fn worksheet(scope: Scope, path: &str) -> AssetEntry {
        entry(scope, EntryType::Worksheet, path)
    }

    pub fn viewsheet(scope: Scope, path: &str) -> AssetEntry {
        entry(scope, EntryType::Viewsheet, path)
    }

    pub fn script(path: &str) -> AssetEntry {
        AssetEntry::new(Scope::Component, EntryType::Script, path, None, TEST_ORG)
    }

    pub fn sheet(text: &str) -> Sheet {
        Sheet::new(serde_json::json!({ "text": text }))
    }

    /// Everything a repository test needs, with handles on each mock.
    pub struct TestRepository {
        pub store: Arc<InMemoryStore>,
        pub authz: Arc<StaticAuthorization>,
        pub worker: Arc<RecordingTransformWorker>,
        pub listener: Arc<RecordingListener>,
        pub repo: AssetRepository,
    }

    impl TestRepository {
        pub fn new() -> Self {
            Self::with_config(FolioConfig::default())
        }

        /// Flushes run on two workers with a short deadline.
        pub fn with_config(mut config: FolioConfig) -> Self {
            init_test_tracing();
            config.dependency.flush_parallelism = Some(2);
            config.dependency.flush_timeout_secs = 10;

            let store = Arc::new(InMemoryStore::new());
            let authz = Arc::new(StaticAuthorization::allow_all());
            let worker = RecordingTransformWorker::new();
            let listener = RecordingListener::new();
            let repo = AssetRepository::builder(store.clone(), authz.clone())
                .config(config)
                .transform_worker(worker.clone())
                .build()
                .expect("test repository builds");
            repo.add_listener(listener.clone());
            Self {
                store,
                authz,
                worker,
                listener,
                repo,
            }
        }

        /// Store `content` at `entry` as alice with default options.
        pub fn put_sheet(&self, entry: &AssetEntry, content: Sheet) -> Arc<Sheet> {
            self.repo
                .set_sheet(entry, content, &alice(), Default::default())
                .unwrap_or_else(|e| panic!("set_sheet({}) failed: {}", entry, e))
        }

        pub fn put_folder(&self, entry: &AssetEntry) {
            self.repo
                .add_folder(entry, &alice())
                .unwrap_or_else(|e| panic!("add_folder({}) failed: {}", entry, e));
        }

        pub fn stored(&self, entry: &AssetEntry) -> bool {
            use folio_storage::KeyValueStore;
            self.store
                .contains(&entry.identifier(), entry.org_id())
                .expect("store readable")
        }

        /// Listing as alice with READ and every type selected.
        pub fn list(&self, folder: &AssetEntry) -> Vec<AssetEntry> {
            self.repo
                .get_entries(folder, &alice(), ResourceAction::Read, EntrySelector::all())
                .unwrap_or_else(|e| panic!("get_entries({}) failed: {}", folder, e))
        }

        pub fn list_all(&self, folder: &AssetEntry) -> Vec<AssetEntry> {
            self.repo
                .get_all_entries(folder, &alice(), ResourceAction::Read, EntrySelector::all())
                .unwrap_or_else(|e| panic!("get_all_entries({}) failed: {}", folder, e))
        }
    }

    impl Default for TestRepository {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over the FOLIO error taxonomy.

    use super::*;

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Repository(RepositoryError::NotFound { .. })) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_entry<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Repository(RepositoryError::InvalidEntry { .. })) => {}
            other => panic!("Expected InvalidEntry, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_duplicate<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Repository(RepositoryError::DuplicateEntry { .. })) => {}
            other => panic!("Expected DuplicateEntry, got: {:?}", other),
        }
    }

    /// Assert a `DependencyViolation` naming exactly `expected` dependents.
    #[track_caller]
    pub fn assert_violation<T: std::fmt::Debug>(result: &FolioResult<T>, expected: &[AssetEntry]) {
        match result {
            Err(FolioError::Dependency(DependencyError::Violation { dependents, .. })) => {
                let mut got = dependents.clone();
                got.sort();
                let mut want = expected.to_vec();
                want.sort();
                assert_eq!(got, want, "Wrong dependents in DependencyViolation");
            }
            other => panic!("Expected DependencyViolation, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cycle<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Dependency(DependencyError::Cycle { .. })) => {}
            other => panic!("Expected Cycle, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_dependency<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Dependency(DependencyError::InvalidDependency { .. })) => {}
            other => panic!("Expected InvalidDependency, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_permission_denied<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(e) if e.is_permission_denied() => {}
            other => panic!("Expected permission error, got: {:?}", other),
        }
    }
}
