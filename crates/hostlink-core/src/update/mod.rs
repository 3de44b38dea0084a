//! Self-update flow: permission check, background download, secure hand-off
//! to the OS installer.

pub mod cancel;
pub mod completion;
pub mod fetch;
pub mod install;
mod orchestrator;
pub mod permission;
pub mod share;
pub mod state;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use completion::{Artifact, CompletionListener, CompletionSubscription};
pub use fetch::{validate_url, FetchCoordinator, FetchStatus, FetchTask};
pub use install::InstallLauncher;
pub use orchestrator::{UpdateOrchestrator, UpdateTicket};
pub use permission::{PermissionGate, PermissionState, MANAGE_UNKNOWN_APP_SOURCES};
pub use share::{GrantScope, SecureShareResolver, SharedReference};
pub use state::{UpdateEvent, UpdateOutcome, UpdateRequest, UpdateState};
