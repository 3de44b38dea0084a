//! Background HTTP downloads with completion broadcasts.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::platform::{
    CompletionNotice, CompletionObserver, DownloadFacility, DownloadRequest,
    NotificationVisibility, ObserverId, PlatformError, TaskId,
};

/// Why a transfer failed.
#[derive(Debug, Error)]
enum TransferError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Running,
    Succeeded,
    Failed,
}

struct TaskEntry {
    path: PathBuf,
    status: TaskStatus,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    client: reqwest::Client,
    dir: PathBuf,
    runtime: Handle,
    next_task: AtomicU64,
    next_observer: AtomicU64,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    observers: Mutex<HashMap<ObserverId, Arc<CompletionObserver>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Downloads over HTTP on the tokio runtime it was created on.
///
/// Every finished transfer, successful or not, is broadcast to all registered
/// observers, the way a system download service announces completions.
#[derive(Clone)]
pub struct HttpDownloadFacility {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HttpDownloadFacility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownloadFacility")
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

impl HttpDownloadFacility {
    /// Creates a facility that stores downloads in `dir`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PlatformError> {
        let runtime = Handle::try_current().map_err(|_| PlatformError::Unsupported)?;

        let client = reqwest::Client::builder()
            .user_agent(format!("Hostlink/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Rejected(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                dir: dir.into(),
                runtime,
                next_task: AtomicU64::new(1),
                next_observer: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
                observers: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.inner.dir
    }
}

impl DownloadFacility for HttpDownloadFacility {
    fn enqueue(&self, request: DownloadRequest) -> Result<TaskId, PlatformError> {
        std::fs::create_dir_all(&self.inner.dir)?;

        let id = TaskId(self.inner.next_task.fetch_add(1, Ordering::Relaxed));
        let path = self.inner.dir.join(&request.destination_name);

        // Hold the lock across spawn so the task cannot finish before its entry exists.
        let mut tasks = lock(&self.inner.tasks);
        evict(&mut tasks, &path);
        let inner = self.inner.clone();
        let task_path = path.clone();
        let handle = self
            .inner
            .runtime
            .spawn(async move { inner.run(id, request, task_path).await });

        tasks.insert(
            id,
            TaskEntry {
                path,
                status: TaskStatus::Running,
                handle: Some(handle),
            },
        );

        debug!(task_id = %id, "Download enqueued");
        Ok(id)
    }

    fn downloaded_file(&self, id: TaskId) -> Option<PathBuf> {
        let tasks = lock(&self.inner.tasks);
        let entry = tasks.get(&id)?;
        (entry.status == TaskStatus::Succeeded && entry.path.is_file()).then(|| entry.path.clone())
    }

    fn remove(&self, id: TaskId) {
        let Some(entry) = lock(&self.inner.tasks).remove(&id) else {
            return;
        };

        if let Some(handle) = entry.handle {
            handle.abort();
        }
        for path in [partial_path(&entry.path), entry.path] {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to delete download");
                }
            }
        }
        info!(task_id = %id, "Download removed");
    }

    fn register_observer(&self, observer: CompletionObserver) -> ObserverId {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.observers).insert(id, Arc::new(observer));
        id
    }

    fn unregister_observer(&self, id: ObserverId) {
        lock(&self.inner.observers).remove(&id);
    }
}

impl Inner {
    async fn run(self: Arc<Self>, id: TaskId, request: DownloadRequest, path: PathBuf) {
        let result = self.transfer(&request.url, &path).await;

        let status = match &result {
            Ok(bytes) => {
                info!(task_id = %id, bytes, path = %path.display(), "Download finished");
                TaskStatus::Succeeded
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "Download failed");
                TaskStatus::Failed
            }
        };

        {
            let mut tasks = lock(&self.tasks);
            match tasks.get_mut(&id) {
                Some(entry) => {
                    entry.status = status;
                    entry.handle = None;
                }
                // Removed while the last bytes were being written.
                None => {
                    if !tasks.values().any(|entry| entry.path == path) {
                        let _ = std::fs::remove_file(&path);
                    }
                    return;
                }
            }
        }

        if request.visibility == NotificationVisibility::VisibleNotifyCompleted {
            super::notify::download_finished(&request.title, status == TaskStatus::Succeeded);
        }

        self.broadcast(CompletionNotice { task_id: Some(id) });
    }

    async fn transfer(&self, url: &str, path: &Path) -> Result<u64, TransferError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let partial = partial_path(path);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, path).await?;
        Ok(written)
    }

    fn broadcast(&self, notice: CompletionNotice) {
        let observers: Vec<_> = lock(&self.observers).values().cloned().collect();
        for observer in observers {
            observer(notice);
        }
    }
}

/// Forgets finished tasks and aborts running ones writing to `path`.
///
/// A finished task's notice has already been broadcast, so only its file
/// outlives it. The destination name is fixed, so a newer download of the
/// same file supersedes an older one.
fn evict(tasks: &mut HashMap<TaskId, TaskEntry>, path: &Path) {
    tasks.retain(|id, entry| {
        if entry.status != TaskStatus::Running {
            return false;
        }
        if entry.path != path {
            return true;
        }
        warn!(task_id = %id, path = %path.display(), "Superseding running download");
        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        false
    });
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
