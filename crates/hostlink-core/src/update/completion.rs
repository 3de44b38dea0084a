//! Waiting for download-completion notifications.
//!
//! The download facility broadcasts a completion notice for every download it
//! finishes, on a thread of its choosing. A [`CompletionSubscription`] turns
//! that callback into an async wait:
//!
//! - the registered observer only forwards notices into a channel, so all
//!   filtering and state changes happen on the awaiting task
//! - notices for other task ids are ignored
//! - the observer is unregistered exactly once, on match, timeout,
//!   cancellation, or drop

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::mime;
use crate::platform::{CompletionNotice, DownloadFacility, ObserverId, TaskId};
use crate::update::cancel::CancelSignal;

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub mime_type: String,
}

/// Unregisters an observer at most once.
struct Registration {
    downloads: Arc<dyn DownloadFacility>,
    id: ObserverId,
    released: AtomicBool,
}

impl Registration {
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.downloads.unregister_observer(self.id);
            debug!(observer = self.id.0, "Completion observer unregistered");
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live completion observer registration.
pub struct CompletionSubscription {
    rx: mpsc::UnboundedReceiver<CompletionNotice>,
    registration: Registration,
    mime_type: String,
}

impl fmt::Debug for CompletionSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSubscription")
            .field("observer", &self.registration.id)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl CompletionSubscription {
    /// Waits for the completion notice of `task_id` and resolves its artifact.
    ///
    /// Fails with `Timeout` after `timeout`, `Cancelled` when `cancel` fires,
    /// and `ArtifactUnavailable` when the facility reports the task finished but
    /// has no file for it. The observer is released before returning.
    pub async fn wait(
        mut self,
        task_id: TaskId,
        timeout: Duration,
        cancel: &mut CancelSignal,
    ) -> Result<Artifact> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.registration.release();
                    info!(task_id = %task_id, "Completion wait cancelled");
                    return Err(UpdateError::Cancelled);
                }
                _ = &mut deadline => {
                    self.registration.release();
                    warn!(task_id = %task_id, ?timeout, "Timed out waiting for download");
                    return Err(UpdateError::Timeout(timeout));
                }
                notice = self.rx.recv() => match notice {
                    Some(CompletionNotice { task_id: Some(id) }) if id == task_id => {
                        self.registration.release();
                        return self.resolve(task_id);
                    }
                    Some(other) => {
                        debug!(task_id = %task_id, notice = ?other.task_id, "Ignoring unrelated completion");
                    }
                    None => {
                        self.registration.release();
                        return Err(UpdateError::Platform(
                            "download facility dropped the completion observer".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn resolve(&self, task_id: TaskId) -> Result<Artifact> {
        match self.registration.downloads.downloaded_file(task_id) {
            Some(local_path) => {
                info!(task_id = %task_id, path = %local_path.display(), "Download finished");
                Ok(Artifact {
                    local_path,
                    mime_type: self.mime_type.clone(),
                })
            }
            None => {
                warn!(task_id = %task_id, "Download finished without a retrievable file");
                Err(UpdateError::ArtifactUnavailable)
            }
        }
    }
}

/// Registers completion observers on the download facility.
#[derive(Clone)]
pub struct CompletionListener {
    downloads: Arc<dyn DownloadFacility>,
    mime_type: String,
}

impl fmt::Debug for CompletionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionListener")
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

impl CompletionListener {
    /// `destination_name` is the fixed download file name; artifacts take
    /// their content type from it.
    pub fn new(downloads: Arc<dyn DownloadFacility>, destination_name: &str) -> Self {
        Self {
            downloads,
            mime_type: mime::for_file_name(destination_name).to_string(),
        }
    }

    /// Registers an observer and starts buffering notices.
    ///
    /// Subscribe before enqueueing so a fast download cannot finish unseen.
    pub fn subscribe(&self) -> CompletionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.downloads.register_observer(Box::new(move |notice| {
            // The receiver is gone once the wait is over.
            let _ = tx.send(notice);
        }));
        debug!(observer = id.0, "Completion observer registered");

        CompletionSubscription {
            rx,
            registration: Registration {
                downloads: self.downloads.clone(),
                id,
                released: AtomicBool::new(false),
            },
            mime_type: self.mime_type.clone(),
        }
    }

    /// Subscribes and waits for `task_id` in one step.
    pub async fn await_one(
        &self,
        task_id: TaskId,
        timeout: Duration,
        cancel: &mut CancelSignal,
    ) -> Result<Artifact> {
        self.subscribe().wait(task_id, timeout, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;
    use crate::update::cancel::cancel_pair;

    const LONG: Duration = Duration::from_secs(30);

    fn listener(fake: &Arc<FakePlatform>) -> CompletionListener {
        CompletionListener::new(fake.clone(), "attendance_tracker_update.apk")
    }

    #[tokio::test]
    async fn resolves_matching_notice() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/attendance_tracker_update.apk");
        let sub = listener(&fake).subscribe();

        fake.notify_completion(Some(id));
        let artifact = sub.wait(id, LONG, &mut CancelSignal::never()).await.unwrap();

        assert_eq!(
            artifact.local_path,
            PathBuf::from("/downloads/attendance_tracker_update.apk")
        );
        assert_eq!(artifact.mime_type, mime::PACKAGE_ARCHIVE);
        assert_eq!(fake.unregister_calls(), 1);
        assert_eq!(fake.live_observers(), 0);
    }

    #[tokio::test]
    async fn ignores_other_tasks_until_match() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/update.apk");
        let sub = listener(&fake).subscribe();

        fake.notify_completion(Some(TaskId(id.0 + 100)));
        fake.notify_completion(None);
        fake.notify_completion(Some(id));

        let artifact = sub.wait(id, LONG, &mut CancelSignal::never()).await.unwrap();
        assert_eq!(artifact.local_path, PathBuf::from("/downloads/update.apk"));
        assert_eq!(fake.unregister_calls(), 1);
    }

    #[tokio::test]
    async fn notice_from_another_thread_is_marshaled() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/update.apk");
        let sub = listener(&fake).subscribe();

        let remote = fake.clone();
        std::thread::spawn(move || remote.notify_completion(Some(id)))
            .join()
            .unwrap();

        assert!(sub.wait(id, LONG, &mut CancelSignal::never()).await.is_ok());
    }

    #[tokio::test]
    async fn matched_without_file_is_artifact_unavailable() {
        let fake = FakePlatform::new();
        let id = fake.prepare_missing_task();
        let sub = listener(&fake).subscribe();

        fake.notify_completion(Some(id));
        let err = sub.wait(id, LONG, &mut CancelSignal::never()).await.unwrap_err();

        assert_eq!(err, UpdateError::ArtifactUnavailable);
        assert_eq!(fake.unregister_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_unregisters() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/update.apk");
        let timeout = Duration::from_secs(5);

        let err = listener(&fake)
            .await_one(id, timeout, &mut CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(err, UpdateError::Timeout(timeout));
        assert_eq!(fake.unregister_calls(), 1);
        assert_eq!(fake.live_observers(), 0);
    }

    #[tokio::test]
    async fn cancellation_unregisters() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/update.apk");
        let (handle, mut signal) = cancel_pair();
        let sub = listener(&fake).subscribe();

        handle.cancel();
        let err = sub.wait(id, LONG, &mut signal).await.unwrap_err();

        assert_eq!(err, UpdateError::Cancelled);
        assert_eq!(fake.unregister_calls(), 1);

        // Late notice after cancellation reaches no observer.
        fake.notify_completion(Some(id));
        assert_eq!(fake.live_observers(), 0);
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_notice() {
        let fake = FakePlatform::new();
        let id = fake.prepare_task("/downloads/update.apk");
        let (handle, mut signal) = cancel_pair();
        let sub = listener(&fake).subscribe();

        fake.notify_completion(Some(id));
        handle.cancel();

        let err = sub.wait(id, LONG, &mut signal).await.unwrap_err();
        assert_eq!(err, UpdateError::Cancelled);
    }

    #[test]
    fn dropping_subscription_unregisters_once() {
        let fake = FakePlatform::new();
        let sub = listener(&fake).subscribe();
        assert_eq!(fake.live_observers(), 1);

        drop(sub);
        assert_eq!(fake.unregister_calls(), 1);
        assert_eq!(fake.live_observers(), 0);
    }

    #[test]
    fn release_is_latched() {
        let fake = FakePlatform::new();
        let sub = listener(&fake).subscribe();

        sub.registration.release();
        sub.registration.release();
        drop(sub);

        assert_eq!(fake.unregister_calls(), 1);
    }
}
