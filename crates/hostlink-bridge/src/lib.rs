//! Hostlink Bridge - method channels between the UI layer and the host.
//!
//! The UI layer cannot reach OS facilities itself. It calls named channels
//! instead, and the bridge routes each call to a host capability:
//!
//! - `<app id>/updater` - `downloadAndInstall`, `cancelUpdate`, `updateStatus`, `hostResumed`
//! - `<app id>/reports` - `saveFileToDocuments`
//! - `<app id>/biometric` - `canAuthenticate`, `authenticate`
//! - `<app id>/email` - `compose`
//!
//! Update progress is pushed on `<app id>/updater/events`.
//!
//! ## Example
//!
//! ```no_run
//! use hostlink_bridge::{Bridge, BridgeServices, MethodCall};
//! use hostlink_core::desktop::DesktopPlatform;
//! use hostlink_core::HostSettings;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = HostSettings::default();
//!     let desktop = DesktopPlatform::new(&settings).unwrap();
//!     let bridge = Bridge::new(settings, BridgeServices::from_desktop(&desktop));
//!
//!     let channel = bridge.channel(hostlink_bridge::UPDATER_CHANNEL);
//!     let call = MethodCall::new("downloadAndInstall", json!({"url": "https://example.com/app.apk"}));
//!     println!("{:?}", bridge.call(&channel, &call).await);
//! }
//! ```

pub mod channel;
pub mod error;
pub mod events;
mod handlers;
pub mod models;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use hostlink_core::biometric::BiometricAuthenticator;
use hostlink_core::platform::UriOpener;
use hostlink_core::{
    BiometricGate, DocumentExporter, DocumentStore, EmailComposer, HostSettings, Platform,
    UpdateOrchestrator,
};

pub use channel::{ChannelRegistry, MethodCall, MethodHandler, MethodResponse};
pub use error::{BridgeError, Result};
pub use events::{forward_updates, BufferedSink, EventSink};
pub use handlers::{BiometricHandler, EmailHandler, ReportsHandler, UpdaterHandler};

/// Channel suffix for the update flow.
pub const UPDATER_CHANNEL: &str = "updater";

/// Channel suffix for document export.
pub const REPORTS_CHANNEL: &str = "reports";

/// Channel suffix for biometric authentication.
pub const BIOMETRIC_CHANNEL: &str = "biometric";

/// Channel suffix for email composition.
pub const EMAIL_CHANNEL: &str = "email";

/// Channel suffix on which update events are pushed.
pub const UPDATE_EVENTS_CHANNEL: &str = "updater/events";

/// Host facilities the bridge exposes.
#[derive(Clone)]
pub struct BridgeServices {
    pub platform: Platform,
    pub documents: Arc<dyn DocumentStore>,
    pub biometrics: Arc<dyn BiometricAuthenticator>,
    pub opener: Arc<dyn UriOpener>,
}

impl BridgeServices {
    #[cfg(feature = "desktop")]
    pub fn from_desktop(desktop: &hostlink_core::desktop::DesktopPlatform) -> Self {
        Self {
            platform: desktop.platform(),
            documents: desktop.document_store(),
            biometrics: desktop.biometrics(),
            opener: desktop.uri_opener(),
        }
    }
}

/// Routes channel calls to host capabilities.
pub struct Bridge {
    settings: HostSettings,
    updater: UpdateOrchestrator,
    registry: ChannelRegistry,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("app_id", &self.settings.app_id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn new(settings: HostSettings, services: BridgeServices) -> Self {
        let updater =
            UpdateOrchestrator::new(services.platform, &settings.app_id, &settings.updater);

        let mut registry = ChannelRegistry::new();
        registry.register(
            settings.channel(UPDATER_CHANNEL),
            Arc::new(UpdaterHandler::new(updater.clone())),
        );
        registry.register(
            settings.channel(REPORTS_CHANNEL),
            Arc::new(ReportsHandler::new(DocumentExporter::new(services.documents))),
        );
        registry.register(
            settings.channel(BIOMETRIC_CHANNEL),
            Arc::new(BiometricHandler::new(BiometricGate::new(services.biometrics))),
        );
        registry.register(
            settings.channel(EMAIL_CHANNEL),
            Arc::new(EmailHandler::new(EmailComposer::new(services.opener))),
        );

        info!(app_id = %settings.app_id, channels = registry.channels().len(), "Bridge ready");

        Self {
            settings,
            updater,
            registry,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn updater(&self) -> &UpdateOrchestrator {
        &self.updater
    }

    /// Full channel name for a suffix, e.g. `updater` -> `com.example.app/updater`.
    pub fn channel(&self, suffix: &str) -> String {
        self.settings.channel(suffix)
    }

    pub fn channels(&self) -> Vec<String> {
        self.registry.channels()
    }

    /// Dispatches one call.
    pub async fn call(&self, channel: &str, call: &MethodCall) -> MethodResponse {
        self.registry.dispatch(channel, call).await
    }

    /// Starts an update. Returns true when the request was accepted.
    ///
    /// Acceptance covers the permission halt; the outcome arrives on the
    /// event channel.
    pub fn request_update(&self, url: &str) -> bool {
        match self.updater.start(url) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, code = e.code(), "Update request rejected");
                false
            }
        }
    }

    /// Forwards update events to `sink` on the events channel.
    pub fn forward_events(&self, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        forward_updates(&self.updater, sink, self.channel(UPDATE_EVENTS_CHANNEL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hostlink_core::biometric::BiometricStatus;
    use hostlink_core::testing::{FakeBiometrics, FakeDocumentStore, FakeOpener, FakePlatform};
    use hostlink_core::{UpdateOutcome, UpdateState};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const APP: &str = "com.example.app";

    struct Harness {
        bridge: Bridge,
        platform: Arc<FakePlatform>,
        documents: Arc<FakeDocumentStore>,
        opener: Arc<FakeOpener>,
    }

    fn harness() -> Harness {
        let platform = FakePlatform::new();
        let documents = FakeDocumentStore::new();
        let opener = FakeOpener::new(true);
        let settings = HostSettings {
            app_id: APP.to_string(),
            ..HostSettings::default()
        };

        let bridge = Bridge::new(
            settings,
            BridgeServices {
                platform: platform.platform(),
                documents: documents.clone(),
                biometrics: FakeBiometrics::new(BiometricStatus::Available, Ok(true)),
                opener: opener.clone(),
            },
        );

        Harness {
            bridge,
            platform,
            documents,
            opener,
        }
    }

    async fn call(h: &Harness, suffix: &str, method: &str, args: Value) -> MethodResponse {
        let channel = format!("{APP}/{suffix}");
        h.bridge.call(&channel, &MethodCall::new(method, args)).await
    }

    fn error_code(response: &MethodResponse) -> &str {
        match response {
            MethodResponse::Error { code, .. } => code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn registers_all_channels() {
        let h = harness();
        assert_eq!(
            h.bridge.channels(),
            vec![
                format!("{APP}/biometric"),
                format!("{APP}/email"),
                format!("{APP}/reports"),
                format!("{APP}/updater"),
            ]
        );
    }

    #[tokio::test]
    async fn download_without_url_is_invalid_arguments() {
        let h = harness();

        for args in [json!({}), Value::Null, json!({"url": "  "})] {
            let response = call(&h, "updater", "downloadAndInstall", args).await;
            assert_eq!(error_code(&response), "INVALID_ARGUMENTS");
            if let MethodResponse::Error { message, .. } = response {
                assert_eq!(message, "Download URL is missing");
            }
        }
        assert!(h.platform.enqueued().is_empty());
    }

    #[tokio::test]
    async fn download_is_accepted_and_status_reported() {
        let h = harness();

        let response = call(
            &h,
            "updater",
            "downloadAndInstall",
            json!({"url": "https://example.com/app.apk"}),
        )
        .await;
        assert_eq!(response, MethodResponse::Success(json!(true)));

        let status = call(&h, "updater", "updateStatus", Value::Null).await;
        let MethodResponse::Success(status) = status else {
            panic!("expected success");
        };
        assert_eq!(status["state"], "awaiting_completion");
        assert_eq!(status["url"], "https://example.com/app.apk");
        assert!(status["taskId"].is_u64());
        assert!(matches!(
            status["taskStatus"].as_str(),
            Some("enqueued" | "in_progress")
        ));
    }

    #[tokio::test]
    async fn invalid_and_concurrent_requests_are_errors() {
        let h = harness();

        let response = call(&h, "updater", "downloadAndInstall", json!({"url": "ftp://x/a"})).await;
        assert_eq!(error_code(&response), "INVALID_URL");

        let url = json!({"url": "https://example.com/app.apk"});
        assert!(call(&h, "updater", "downloadAndInstall", url.clone()).await.is_success());
        let second = call(&h, "updater", "downloadAndInstall", url).await;
        assert_eq!(error_code(&second), "REQUEST_ALREADY_ACTIVE");
        assert_eq!(h.platform.enqueued().len(), 1);
    }

    #[tokio::test]
    async fn permission_halt_is_accepted_then_resumed() {
        let h = harness();
        h.platform.set_install_permission(false);

        let response = call(
            &h,
            "updater",
            "downloadAndInstall",
            json!({"url": "https://example.com/app.apk"}),
        )
        .await;
        assert_eq!(response, MethodResponse::Success(json!(true)));
        assert_eq!(h.bridge.updater().state(), UpdateState::PermissionDenied);
        assert_eq!(h.platform.settings_opened().len(), 1);

        // Still denied: nothing to resume.
        let resumed = call(&h, "updater", "hostResumed", Value::Null).await;
        assert_eq!(resumed, MethodResponse::Success(json!(false)));

        h.platform.set_install_permission(true);
        let resumed = call(&h, "updater", "hostResumed", Value::Null).await;
        assert_eq!(resumed, MethodResponse::Success(json!(true)));
        assert_eq!(h.platform.enqueued().len(), 1);
        assert_eq!(h.platform.enqueued()[0].1.url, "https://example.com/app.apk");
    }

    #[tokio::test]
    async fn cancel_update() {
        let h = harness();

        let nothing = call(&h, "updater", "cancelUpdate", Value::Null).await;
        assert_eq!(nothing, MethodResponse::Success(json!(false)));

        assert!(h.bridge.request_update("https://example.com/app.apk"));
        let cancelled = call(&h, "updater", "cancelUpdate", Value::Null).await;
        assert_eq!(cancelled, MethodResponse::Success(json!(true)));

        assert_eq!(h.bridge.updater().wait().await, Some(UpdateOutcome::Cancelled));

        let status = call(&h, "updater", "updateStatus", Value::Null).await;
        let MethodResponse::Success(status) = status else {
            panic!("expected success");
        };
        assert_eq!(status["state"], "cancelled");
        assert_eq!(status["taskStatus"], "failed");
        assert!(status["taskId"].is_u64());
    }

    #[tokio::test]
    async fn request_update_rejects_invalid_url() {
        let h = harness();
        assert!(!h.bridge.request_update("not a url"));
        assert_eq!(h.platform.permission_checks(), 0);
    }

    #[tokio::test]
    async fn save_file_to_documents() {
        let h = harness();

        let response = call(
            &h,
            "reports",
            "saveFileToDocuments",
            json!({"fileName": "attendance.csv", "fileBytes": "bmFtZSxwcmVzZW50Cg=="}),
        )
        .await;

        let MethodResponse::Success(Value::String(location)) = response else {
            panic!("expected location, got {response:?}");
        };
        assert_eq!(h.documents.contents(&location), Some(b"name,present\n".to_vec()));
    }

    #[tokio::test]
    async fn save_file_argument_errors() {
        let h = harness();

        for args in [
            json!({"fileName": "a.pdf"}),
            json!({"fileBytes": [1, 2, 3]}),
            json!({"fileName": "a.pdf", "fileBytes": "%%%"}),
        ] {
            let response = call(&h, "reports", "saveFileToDocuments", args).await;
            assert_eq!(error_code(&response), "INVALID_ARGUMENTS");
        }
        assert!(h.documents.entries().is_empty());
    }

    #[tokio::test]
    async fn save_failure_is_unavailable() {
        let h = harness();
        h.documents.fail_writes(true);

        let response = call(
            &h,
            "reports",
            "saveFileToDocuments",
            json!({"fileName": "a.pdf", "fileBytes": [1, 2, 3]}),
        )
        .await;

        match response {
            MethodResponse::Error { code, message, .. } => {
                assert_eq!(code, "UNAVAILABLE");
                assert!(message.starts_with("Could not save file: "));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.documents.entries().is_empty());
    }

    #[tokio::test]
    async fn unknown_methods_and_channels() {
        let h = harness();
        assert_eq!(
            call(&h, "reports", "deleteEverything", Value::Null).await,
            MethodResponse::NotImplemented
        );
        assert_eq!(
            call(&h, "camera", "snap", Value::Null).await,
            MethodResponse::NotImplemented
        );
    }

    #[tokio::test]
    async fn biometric_channel() {
        let h = harness();
        assert_eq!(
            call(&h, "biometric", "canAuthenticate", Value::Null).await,
            MethodResponse::Success(json!("available"))
        );
        assert_eq!(
            call(&h, "biometric", "authenticate", Value::Null).await,
            MethodResponse::Success(json!(true))
        );
    }

    #[tokio::test]
    async fn email_channel() {
        let h = harness();

        let response = call(
            &h,
            "email",
            "compose",
            json!({"to": "principal@school.edu", "subject": "Report", "body": "Attached"}),
        )
        .await;
        assert_eq!(response, MethodResponse::Success(json!(true)));
        assert_eq!(
            h.opener.opened(),
            vec!["mailto:principal@school.edu?subject=Report&body=Attached".to_string()]
        );

        let response = call(&h, "email", "compose", json!({"subject": "no one"})).await;
        assert_eq!(error_code(&response), "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn events_are_forwarded() {
        let dir = TempDir::new().unwrap();
        let apk = dir.path().join("attendance_tracker_update.apk");
        std::fs::write(&apk, b"PK\x03\x04").unwrap();

        let h = harness();
        h.platform.set_next_download(Some(apk));
        let sink = BufferedSink::new();
        let _forwarder = h.bridge.forward_events(sink.clone());

        assert!(h.bridge.request_update("https://example.com/app.apk"));
        let task_id = h.bridge.updater().active_task().unwrap().id;
        h.platform.notify_completion(Some(task_id));

        assert_eq!(h.bridge.updater().wait().await, Some(UpdateOutcome::HandedOff));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let events = sink.take();
        assert!(events
            .iter()
            .all(|(channel, _)| channel == &format!("{APP}/updater/events")));
        assert_eq!(events.first().unwrap().1["state"], "checking_permission");
        let last = &events.last().unwrap().1;
        assert_eq!(last["event"], "finished");
        assert_eq!(last["outcome"], "handed_off");
        assert!(events.iter().any(|(_, e)| e["event"] == "enqueued"));
    }
}
