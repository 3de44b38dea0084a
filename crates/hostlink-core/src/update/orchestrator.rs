//! The self-update state machine.
//!
//! One orchestrator runs at most one update request at a time:
//!
//! ```text
//! Idle -> CheckingPermission -> PermissionDenied
//!                            -> Fetching -> AwaitingCompletion -> FetchFailed
//!                                                              -> Resolving -> Installing -> InstallFailed
//!                                                                                         -> HandedOff
//! ```
//!
//! `start` runs synchronously up to `AwaitingCompletion` and returns. The rest
//! runs on a spawned task that waits for the download facility's completion
//! notice. Every transition made by that task is checked against the request's
//! generation, so a stale task can never touch a later request.
//!
//! Platform calls are made without the state lock held. While they run the
//! request sits in an in-flight state, which rejects `start` and `cancel`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::platform::{Platform, TaskId};
use crate::settings::UpdaterSettings;
use crate::update::cancel::{cancel_pair, CancelHandle, CancelSignal};
use crate::update::completion::{CompletionListener, CompletionSubscription};
use crate::update::fetch::{validate_url, FetchCoordinator, FetchStatus, FetchTask};
use crate::update::install::InstallLauncher;
use crate::update::permission::{PermissionGate, PermissionState};
use crate::update::share::SecureShareResolver;
use crate::update::state::{UpdateEvent, UpdateOutcome, UpdateRequest, UpdateState};

/// Capacity of the event stream before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 64;

/// Acknowledgment returned by [`UpdateOrchestrator::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTicket {
    pub request: UpdateRequest,
    /// Download task, if the request got that far.
    pub task_id: Option<TaskId>,
    /// State when `start` returned.
    pub state: UpdateState,
}

/// The in-flight request. Owns its correlation id.
struct ActiveRequest {
    request: UpdateRequest,
    task: Option<FetchTask>,
    cancel: Option<CancelHandle>,
}

#[derive(Default)]
struct Core {
    state: UpdateState,
    generation: u64,
    active: Option<ActiveRequest>,
    /// URL of the last request halted for missing permission.
    halted_url: Option<String>,
    /// Download of the last finished request.
    last_task: Option<FetchTask>,
}

#[derive(Debug, Clone)]
struct Finished {
    generation: u64,
    outcome: UpdateOutcome,
}

struct Shared {
    gate: PermissionGate,
    fetch: FetchCoordinator,
    listener: CompletionListener,
    resolver: SecureShareResolver,
    launcher: InstallLauncher,
    completion_timeout: Duration,
    core: Mutex<Core>,
    events: broadcast::Sender<UpdateEvent>,
    finished: watch::Sender<Option<Finished>>,
}

/// Sequences permission, download, completion, sharing, and install.
#[derive(Clone)]
pub struct UpdateOrchestrator {
    shared: Arc<Shared>,
}

impl fmt::Debug for UpdateOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOrchestrator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl UpdateOrchestrator {
    pub fn new(platform: Platform, app_id: &str, settings: &UpdaterSettings) -> Self {
        let gate = PermissionGate::new(platform.permissions.clone(), app_id);
        let fetch = FetchCoordinator::new(platform.downloads.clone(), gate.clone(), settings.clone());
        let listener = CompletionListener::new(platform.downloads.clone(), &settings.destination_name);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (finished, _) = watch::channel(None);

        Self {
            shared: Arc::new(Shared {
                gate,
                fetch,
                listener,
                resolver: SecureShareResolver::new(platform.files.clone()),
                launcher: InstallLauncher::new(platform.installer.clone()),
                completion_timeout: settings.completion_timeout(),
                core: Mutex::new(Core::default()),
                events,
                finished,
            }),
        }
    }

    /// Starts an update from `url`.
    ///
    /// Returns once the download is enqueued, or once the request halted for
    /// missing permission. The eventual outcome is published on the event
    /// stream and available through [`wait`](Self::wait).
    ///
    /// Fails with `InvalidUrl` before touching any state, and with
    /// `RequestAlreadyActive` while another request is in flight.
    pub fn start(&self, url: &str) -> Result<UpdateTicket> {
        let url = validate_url(url)?.to_string();
        let runtime = Handle::try_current()
            .map_err(|_| UpdateError::Platform("no async runtime available".to_string()))?;

        let shared = &self.shared;
        let (generation, request) = {
            let mut core = shared.core();
            if !core.state.is_settled() {
                warn!(state = %core.state, url = %url, "Rejecting update, another request is active");
                return Err(UpdateError::RequestAlreadyActive);
            }

            core.generation += 1;
            let request = UpdateRequest::new(&url);
            core.halted_url = None;
            core.last_task = None;
            core.active = Some(ActiveRequest {
                request: request.clone(),
                task: None,
                cancel: None,
            });
            info!(generation = core.generation, url = %url, "Update requested");
            shared.set_state(&mut core, UpdateState::CheckingPermission);
            (core.generation, request)
        };

        let permission = shared.gate.check();
        if permission != PermissionState::Granted {
            info!(?permission, "Install permission missing, halting update");
            let redirect = shared.gate.emit_redirect();
            shared.emit(UpdateEvent::PermissionRedirect(redirect));

            let mut core = shared.core();
            core.halted_url = Some(url);
            shared.finish_locked(
                &mut core,
                UpdateState::PermissionDenied,
                UpdateOutcome::PermissionDenied,
            );
            return Ok(UpdateTicket {
                request,
                task_id: None,
                state: UpdateState::PermissionDenied,
            });
        }

        shared.advance(generation, UpdateState::Fetching);
        // Register before enqueueing so a fast download cannot finish unseen.
        let subscription = shared.listener.subscribe();
        let task = match shared.fetch.enqueue(&url) {
            Ok(task) => task,
            Err(e) => {
                drop(subscription);
                shared.finish(
                    generation,
                    UpdateState::FetchFailed,
                    UpdateOutcome::Failed(e.clone()),
                );
                return Err(e);
            }
        };

        let (handle, signal) = cancel_pair();
        {
            let mut core = shared.core();
            if let Some(active) = core.active.as_mut() {
                active.task = Some(task.clone());
                active.cancel = Some(handle);
            }
            shared.emit(UpdateEvent::Enqueued {
                task_id: task.id,
                url: url.clone(),
            });
            shared.set_state(&mut core, UpdateState::AwaitingCompletion);
        }

        let driver = self.shared.clone();
        runtime.spawn(async move {
            driver.drive(generation, task.id, subscription, signal).await;
        });

        Ok(UpdateTicket {
            request,
            task_id: Some(task.id),
            state: UpdateState::AwaitingCompletion,
        })
    }

    /// Requests cancellation of the in-flight request.
    ///
    /// Returns false if nothing cancellable is in flight. The request settles
    /// in `Cancelled` once its completion observer is released.
    pub fn cancel(&self) -> bool {
        let core = self.shared.core();
        if !core.state.is_cancellable() {
            return false;
        }
        let Some(active) = core.active.as_ref() else {
            return false;
        };

        info!(state = %core.state, url = %active.request.url, "Cancelling update");
        if let Some(handle) = &active.cancel {
            handle.cancel();
        }
        if core.state == UpdateState::AwaitingCompletion {
            if let Some(task) = &active.task {
                self.shared.fetch.cancel(task.id);
            }
        }
        true
    }

    /// Re-checks install permission after the host surface regains focus.
    ///
    /// If the last request halted for missing permission and permission is
    /// now granted, settles back to `Idle` and returns that request's URL so
    /// the caller can start it again.
    pub fn on_host_resumed(&self) -> Option<String> {
        let shared = &self.shared;
        let mut core = shared.core();
        if core.state != UpdateState::PermissionDenied || core.halted_url.is_none() {
            return None;
        }

        match shared.gate.check() {
            PermissionState::Granted => {
                info!("Install permission granted while away");
                shared.set_state(&mut core, UpdateState::Idle);
                core.halted_url.take()
            }
            permission => {
                debug!(?permission, "Install permission still missing");
                None
            }
        }
    }

    pub fn state(&self) -> UpdateState {
        self.shared.core().state
    }

    /// The download task of the in-flight request.
    pub fn active_task(&self) -> Option<FetchTask> {
        self.shared
            .core()
            .active
            .as_ref()
            .and_then(|a| a.task.clone())
    }

    /// Download of the in-flight request, else of the last finished one.
    ///
    /// `None` once a new request starts and until it enqueues.
    pub fn last_task(&self) -> Option<FetchTask> {
        let core = self.shared.core();
        core.active
            .as_ref()
            .and_then(|a| a.task.clone())
            .or_else(|| core.last_task.clone())
    }

    /// The in-flight request.
    pub fn active_request(&self) -> Option<UpdateRequest> {
        self.shared
            .core()
            .active
            .as_ref()
            .map(|a| a.request.clone())
    }

    /// Subscribes to state changes and outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.shared.events.subscribe()
    }

    /// Waits for the most recent request to end.
    ///
    /// Returns `None` if no request was ever started.
    pub async fn wait(&self) -> Option<UpdateOutcome> {
        let generation = self.shared.core().generation;
        if generation == 0 {
            return None;
        }

        let mut rx = self.shared.finished.subscribe();
        loop {
            let done = rx
                .borrow_and_update()
                .as_ref()
                .filter(|f| f.generation >= generation)
                .map(|f| f.outcome.clone());
            if done.is_some() {
                return done;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UpdateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, core: &mut Core, state: UpdateState) {
        if core.state != state {
            debug!(from = %core.state, to = %state, "Update state changed");
            core.state = state;
            self.emit(UpdateEvent::StateChanged(state));
        }
    }

    /// Moves the request to `state` unless it was superseded or already ended.
    fn advance(&self, generation: u64, state: UpdateState) -> bool {
        let mut core = self.core();
        if core.generation != generation || core.state.is_terminal() {
            return false;
        }
        self.set_state(&mut core, state);
        true
    }

    /// Records the download status of the request's task.
    fn mark_task(&self, generation: u64, status: FetchStatus) {
        let mut core = self.core();
        if core.generation != generation {
            return;
        }
        if let Some(task) = core.active.as_mut().and_then(|a| a.task.as_mut()) {
            debug!(task_id = %task.id, ?status, "Download status changed");
            task.status = status;
        }
    }

    fn finish(&self, generation: u64, state: UpdateState, outcome: UpdateOutcome) {
        let mut core = self.core();
        if core.generation != generation || core.state.is_terminal() {
            debug!(generation, "Dropping outcome of superseded request");
            return;
        }
        self.finish_locked(&mut core, state, outcome);
    }

    fn finish_locked(&self, core: &mut Core, state: UpdateState, outcome: UpdateOutcome) {
        match &outcome {
            UpdateOutcome::Failed(e) => warn!(state = %state, error = %e, "Update failed"),
            other => info!(state = %state, outcome = ?other, "Update finished"),
        }
        self.set_state(core, state);
        if let Some(task) = core.active.take().and_then(|a| a.task) {
            core.last_task = Some(task);
        }
        self.emit(UpdateEvent::Finished(outcome.clone()));
        self.finished.send_replace(Some(Finished {
            generation: core.generation,
            outcome,
        }));
    }

    /// Runs a request from `AwaitingCompletion` to its terminal state.
    async fn drive(
        self: Arc<Self>,
        generation: u64,
        task_id: TaskId,
        subscription: CompletionSubscription,
        mut signal: CancelSignal,
    ) {
        self.mark_task(generation, FetchStatus::InProgress);

        let artifact = match subscription
            .wait(task_id, self.completion_timeout, &mut signal)
            .await
        {
            Ok(artifact) => artifact,
            Err(UpdateError::Cancelled) => {
                self.mark_task(generation, FetchStatus::Failed);
                self.finish(generation, UpdateState::Cancelled, UpdateOutcome::Cancelled);
                return;
            }
            Err(e) => {
                // The facility may still be writing the fixed destination file.
                self.fetch.cancel(task_id);
                self.mark_task(generation, FetchStatus::Failed);
                self.finish(generation, UpdateState::FetchFailed, UpdateOutcome::Failed(e));
                return;
            }
        };
        self.mark_task(generation, FetchStatus::Succeeded);

        if !self.advance(generation, UpdateState::Resolving) {
            return;
        }
        let reference = match self.resolver.wrap(&artifact) {
            Ok(reference) => reference,
            Err(e) => {
                self.finish(generation, UpdateState::FetchFailed, UpdateOutcome::Failed(e));
                return;
            }
        };

        if signal.is_cancelled() {
            drop(reference);
            self.finish(generation, UpdateState::Cancelled, UpdateOutcome::Cancelled);
            return;
        }
        if !self.advance(generation, UpdateState::Installing) {
            return;
        }

        let launched = self.launcher.launch(&reference);
        // The grant only lives for the hand-off.
        drop(reference);

        match launched {
            Ok(()) => self.finish(generation, UpdateState::HandedOff, UpdateOutcome::HandedOff),
            Err(e) => self.finish(generation, UpdateState::InstallFailed, UpdateOutcome::Failed(e)),
        }
    }
}
