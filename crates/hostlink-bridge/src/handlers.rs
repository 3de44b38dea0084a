//! Channel handlers.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use hostlink_core::{BiometricGate, DocumentExporter, EmailComposer, EmailDraft, UpdateOrchestrator};

use crate::channel::{MethodCall, MethodHandler, MethodResponse};
use crate::error::{BridgeError, Result};
use crate::models::{ComposeArgs, DownloadArgs, SaveFileArgs, UpdateStatus};

fn respond<T: serde::Serialize>(result: Result<T>) -> MethodResponse {
    match result {
        Ok(value) => MethodResponse::success(value),
        Err(e) => e.into(),
    }
}

/// `<app id>/updater`
#[derive(Debug, Clone)]
pub struct UpdaterHandler {
    updater: UpdateOrchestrator,
}

impl UpdaterHandler {
    pub fn new(updater: UpdateOrchestrator) -> Self {
        Self { updater }
    }

    /// Starts an update. True once the orchestrator accepted the request,
    /// including when it halted for install permission.
    pub fn download_and_install(&self, call: &MethodCall) -> Result<bool> {
        let url = call
            .arguments::<DownloadArgs>()
            .and_then(|args| args.url)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| BridgeError::InvalidArguments("Download URL is missing".to_string()))?;

        let ticket = self.updater.start(&url)?;
        info!(state = %ticket.state, "Update request accepted");
        Ok(true)
    }

    /// Restarts a request that halted for permission once permission is granted.
    pub fn host_resumed(&self) -> Result<bool> {
        match self.updater.on_host_resumed() {
            Some(url) => {
                self.updater.start(&url)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MethodHandler for UpdaterHandler {
    async fn handle(&self, call: &MethodCall) -> MethodResponse {
        match call.method.as_str() {
            "downloadAndInstall" => respond(self.download_and_install(call)),
            "cancelUpdate" => MethodResponse::success(self.updater.cancel()),
            "updateStatus" => MethodResponse::success(UpdateStatus::of(&self.updater)),
            "hostResumed" => respond(self.host_resumed()),
            _ => MethodResponse::NotImplemented,
        }
    }
}

/// `<app id>/reports`
#[derive(Debug, Clone)]
pub struct ReportsHandler {
    exporter: DocumentExporter,
}

impl ReportsHandler {
    pub fn new(exporter: DocumentExporter) -> Self {
        Self { exporter }
    }

    /// Saves a report and returns where it was stored.
    pub fn save_file(&self, call: &MethodCall) -> Result<String> {
        let missing = || BridgeError::InvalidArguments("File name or bytes are missing".to_string());

        let args = call.arguments::<SaveFileArgs>().ok_or_else(missing)?;
        let (Some(file_name), Some(file_bytes)) = (args.file_name, args.file_bytes) else {
            return Err(missing());
        };
        let bytes = file_bytes
            .decode()
            .ok_or_else(|| BridgeError::InvalidArguments("File bytes are not valid base64".to_string()))?;

        Ok(self.exporter.save(&file_name, &bytes)?)
    }
}

#[async_trait]
impl MethodHandler for ReportsHandler {
    async fn handle(&self, call: &MethodCall) -> MethodResponse {
        match call.method.as_str() {
            "saveFileToDocuments" => respond(self.save_file(call)),
            _ => MethodResponse::NotImplemented,
        }
    }
}

/// `<app id>/biometric`
#[derive(Debug, Clone)]
pub struct BiometricHandler {
    gate: BiometricGate,
}

impl BiometricHandler {
    pub fn new(gate: BiometricGate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl MethodHandler for BiometricHandler {
    async fn handle(&self, call: &MethodCall) -> MethodResponse {
        match call.method.as_str() {
            "canAuthenticate" => MethodResponse::success(self.gate.can_authenticate().as_str()),
            "authenticate" => {
                let passed = self.gate.authenticate().await;
                debug!(passed, "Biometric authentication finished");
                MethodResponse::success(passed)
            }
            _ => MethodResponse::NotImplemented,
        }
    }
}

/// `<app id>/email`
#[derive(Debug, Clone)]
pub struct EmailHandler {
    composer: EmailComposer,
}

impl EmailHandler {
    pub fn new(composer: EmailComposer) -> Self {
        Self { composer }
    }

    pub fn compose(&self, call: &MethodCall) -> Result<bool> {
        let args = call
            .arguments::<ComposeArgs>()
            .ok_or_else(|| BridgeError::InvalidArguments("Invalid email arguments".to_string()))?;

        let draft = EmailDraft {
            to: args.to.into(),
            cc: args.cc.into(),
            subject: args.subject,
            body: args.body,
            attachment: args.attachment.map(PathBuf::from),
        };
        self.composer.compose(&draft)?;
        Ok(true)
    }
}

#[async_trait]
impl MethodHandler for EmailHandler {
    async fn handle(&self, call: &MethodCall) -> MethodResponse {
        match call.method.as_str() {
            "compose" => respond(self.compose(call)),
            _ => MethodResponse::NotImplemented,
        }
    }
}
