//! Scripted in-memory platform used by tests.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for crates that drive the update flow against it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::biometric::{BiometricAuthenticator, BiometricPrompt, BiometricStatus};
use crate::export::{DocumentEntry, DocumentStore};
use crate::platform::{
    CompletionNotice, CompletionObserver, DownloadFacility, DownloadRequest, FileShare,
    InstallPermissions, InstallRequest, ObserverId, PackageInstaller, Platform, PlatformError,
    SettingsRedirect, ShareUri, TaskId, UriOpener,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct State {
    permission_denied: bool,
    permission_query_fails: bool,
    permission_checks: usize,
    settings_opened: Vec<SettingsRedirect>,

    reject_enqueue: bool,
    next_task: u64,
    next_download: Option<PathBuf>,
    enqueued: Vec<(TaskId, DownloadRequest)>,
    files: HashMap<TaskId, Option<PathBuf>>,
    removed: Vec<TaskId>,

    next_observer: u64,
    observers: HashMap<ObserverId, Arc<CompletionObserver>>,
    unregister_calls: usize,

    next_grant: u64,
    grants: HashMap<ShareUri, PathBuf>,

    installer_missing: bool,
    install_requests: Vec<InstallRequest>,
    installed_paths: Vec<PathBuf>,

}

/// Fake implementation of every update-flow platform facility.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    /// Install permission granted, installer present, downloads produce no file.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            permissions: self.clone(),
            downloads: self.clone(),
            files: self.clone(),
            installer: self.clone(),
        }
    }

    pub fn set_install_permission(&self, granted: bool) {
        lock(&self.state).permission_denied = !granted;
    }

    pub fn fail_permission_query(&self, fail: bool) {
        lock(&self.state).permission_query_fails = fail;
    }

    pub fn permission_checks(&self) -> usize {
        lock(&self.state).permission_checks
    }

    pub fn settings_opened(&self) -> Vec<SettingsRedirect> {
        lock(&self.state).settings_opened.clone()
    }

    pub fn reject_enqueue(&self, reject: bool) {
        lock(&self.state).reject_enqueue = reject;
    }

    /// File that downloads enqueued from now on resolve to.
    pub fn set_next_download(&self, path: Option<PathBuf>) {
        lock(&self.state).next_download = path;
    }

    pub fn enqueued(&self) -> Vec<(TaskId, DownloadRequest)> {
        lock(&self.state).enqueued.clone()
    }

    /// Registers a finished task resolving to `path` without enqueueing.
    pub fn prepare_task(&self, path: impl Into<PathBuf>) -> TaskId {
        self.prepare(Some(path.into()))
    }

    /// Registers a finished task whose file the facility cannot produce.
    pub fn prepare_missing_task(&self) -> TaskId {
        self.prepare(None)
    }

    fn prepare(&self, path: Option<PathBuf>) -> TaskId {
        let mut state = lock(&self.state);
        state.next_task += 1;
        let id = TaskId(state.next_task);
        state.files.insert(id, path);
        id
    }

    /// Delivers a completion broadcast to every live observer.
    pub fn notify_completion(&self, task_id: Option<TaskId>) {
        let observers: Vec<_> = lock(&self.state).observers.values().cloned().collect();
        for observer in observers {
            observer(CompletionNotice { task_id });
        }
    }

    pub fn unregister_calls(&self) -> usize {
        lock(&self.state).unregister_calls
    }

    pub fn live_observers(&self) -> usize {
        lock(&self.state).observers.len()
    }

    pub fn removed(&self) -> Vec<TaskId> {
        lock(&self.state).removed.clone()
    }

    /// Path behind a live grant.
    pub fn granted_path(&self, uri: &ShareUri) -> Option<PathBuf> {
        lock(&self.state).grants.get(uri).cloned()
    }

    pub fn active_grants(&self) -> usize {
        lock(&self.state).grants.len()
    }

    pub fn set_installer_available(&self, available: bool) {
        lock(&self.state).installer_missing = !available;
    }

    pub fn install_requests(&self) -> Vec<InstallRequest> {
        lock(&self.state).install_requests.clone()
    }

    /// Files the installer could read through its grant when it started.
    pub fn installed_paths(&self) -> Vec<PathBuf> {
        lock(&self.state).installed_paths.clone()
    }
}

impl InstallPermissions for FakePlatform {
    fn can_request_package_installs(&self) -> Result<bool, PlatformError> {
        let mut state = lock(&self.state);
        state.permission_checks += 1;
        if state.permission_query_fails {
            return Err(PlatformError::Unsupported);
        }
        Ok(!state.permission_denied)
    }

    fn open_settings(&self, redirect: &SettingsRedirect) -> Result<(), PlatformError> {
        lock(&self.state).settings_opened.push(redirect.clone());
        Ok(())
    }
}

impl DownloadFacility for FakePlatform {
    fn enqueue(&self, request: DownloadRequest) -> Result<TaskId, PlatformError> {
        let mut state = lock(&self.state);
        if state.reject_enqueue {
            return Err(PlatformError::Rejected("download refused".to_string()));
        }
        state.next_task += 1;
        let id = TaskId(state.next_task);
        let file = state.next_download.clone();
        state.files.insert(id, file);
        state.enqueued.push((id, request));
        Ok(id)
    }

    fn downloaded_file(&self, id: TaskId) -> Option<PathBuf> {
        lock(&self.state).files.get(&id).cloned().flatten()
    }

    fn remove(&self, id: TaskId) {
        let mut state = lock(&self.state);
        state.files.remove(&id);
        state.removed.push(id);
    }

    fn register_observer(&self, observer: CompletionObserver) -> ObserverId {
        let mut state = lock(&self.state);
        state.next_observer += 1;
        let id = ObserverId(state.next_observer);
        state.observers.insert(id, Arc::new(observer));
        id
    }

    fn unregister_observer(&self, id: ObserverId) {
        let mut state = lock(&self.state);
        state.unregister_calls += 1;
        state.observers.remove(&id);
    }
}

impl FileShare for FakePlatform {
    fn grant_read(&self, path: &Path, _mime_type: &str) -> Result<ShareUri, PlatformError> {
        let mut state = lock(&self.state);
        state.next_grant += 1;
        let uri = ShareUri::new(format!("content://fake.fileprovider/{}", state.next_grant));
        state.grants.insert(uri.clone(), path.to_path_buf());
        Ok(uri)
    }

    fn revoke(&self, uri: &ShareUri) {
        lock(&self.state).grants.remove(uri);
    }
}

impl PackageInstaller for FakePlatform {
    fn start_install(&self, request: &InstallRequest) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        state.install_requests.push(request.clone());
        if state.installer_missing {
            return Err(PlatformError::NoHandler(request.mime_type.clone()));
        }
        if let Some(path) = state.grants.get(&request.uri).cloned() {
            state.installed_paths.push(path);
        }
        Ok(())
    }
}

/// In-memory documents collection.
#[derive(Default)]
pub struct FakeDocumentStore {
    inner: Mutex<DocumentState>,
}

#[derive(Default)]
struct DocumentState {
    fail_inserts: bool,
    fail_writes: bool,
    next: u64,
    entries: Vec<(String, DocumentEntry)>,
    contents: HashMap<String, Vec<u8>>,
    deleted: Vec<String>,
}

impl FakeDocumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_inserts(&self, fail: bool) {
        lock(&self.inner).fail_inserts = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    /// Records currently in the collection, oldest first.
    pub fn entries(&self) -> Vec<(String, DocumentEntry)> {
        lock(&self.inner).entries.clone()
    }

    pub fn contents(&self, location: &str) -> Option<Vec<u8>> {
        lock(&self.inner).contents.get(location).cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.inner).deleted.clone()
    }
}

impl DocumentStore for FakeDocumentStore {
    fn insert(&self, entry: &DocumentEntry) -> Result<String, PlatformError> {
        let mut inner = lock(&self.inner);
        if inner.fail_inserts {
            return Err(PlatformError::Rejected("insert refused".to_string()));
        }
        inner.next += 1;
        let location = format!("content://media/documents/{}", inner.next);
        inner.entries.push((location.clone(), entry.clone()));
        Ok(location)
    }

    fn write(&self, location: &str, bytes: &[u8]) -> Result<(), PlatformError> {
        let mut inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(PlatformError::Io(std::io::Error::other("disk full")));
        }
        inner.contents.insert(location.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, location: &str) -> Result<(), PlatformError> {
        let mut inner = lock(&self.inner);
        inner.entries.retain(|(l, _)| l != location);
        inner.contents.remove(location);
        inner.deleted.push(location.to_string());
        Ok(())
    }
}

/// Biometric API with a fixed status and prompt result.
pub struct FakeBiometrics {
    status: BiometricStatus,
    result: Result<bool, ()>,
    prompts: AtomicUsize,
}

impl FakeBiometrics {
    /// `Err(())` makes the prompt fail with a platform error.
    pub fn new(status: BiometricStatus, result: Result<bool, ()>) -> Arc<Self> {
        Arc::new(Self {
            status,
            result,
            prompts: AtomicUsize::new(0),
        })
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricAuthenticator for FakeBiometrics {
    fn status(&self) -> BiometricStatus {
        self.status
    }

    async fn prompt(&self, _prompt: &BiometricPrompt) -> Result<bool, PlatformError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.result
            .map_err(|()| PlatformError::Rejected("prompt dismissed".to_string()))
    }
}

/// URI opener that records what it was asked to open.
pub struct FakeOpener {
    available: bool,
    opened: Mutex<Vec<String>>,
}

impl FakeOpener {
    /// With `available == false` every request fails with no handler.
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl UriOpener for FakeOpener {
    fn open_uri(&self, uri: &str) -> Result<(), PlatformError> {
        if !self.available {
            return Err(PlatformError::NoHandler(uri.to_string()));
        }
        lock(&self.opened).push(uri.to_string());
        Ok(())
    }
}
