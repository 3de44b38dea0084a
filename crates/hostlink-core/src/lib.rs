//! Hostlink Core - host-side capabilities for the attendance tracker app.
//!
//! This crate provides what the UI layer cannot do on its own:
//!
//! - Self-update: check install permission, download the new package in the
//!   background, wrap it in a read-only share grant, and hand it to the OS
//!   installer
//! - Exporting generated reports to the documents collection
//! - Biometric authentication
//! - Composing emails through the platform mail client
//!
//! Every OS facility sits behind a trait in [`platform`]. The `desktop`
//! feature provides implementations backed by HTTP downloads and the local
//! filesystem.
//!
//! # Example
//!
//! ```no_run
//! use hostlink_core::desktop::DesktopPlatform;
//! use hostlink_core::{HostSettings, UpdateOrchestrator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = HostSettings::default();
//!     let desktop = DesktopPlatform::new(&settings).unwrap();
//!     let updater = UpdateOrchestrator::new(desktop.platform(), &settings.app_id, &settings.updater);
//!
//!     updater.start("https://example.com/releases/app-v2.apk").unwrap();
//!     let outcome = updater.wait().await;
//!     println!("{outcome:?}");
//! }
//! ```

pub mod biometric;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod email;
pub mod error;
pub mod export;
pub mod mime;
pub mod platform;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod update;

pub use biometric::{BiometricGate, BiometricStatus};
pub use email::{EmailComposer, EmailDraft, EmailError};
pub use error::{Result, UpdateError};
pub use export::{DocumentExporter, DocumentStore, ExportError};
pub use platform::{Platform, PlatformError};
pub use settings::{HostSettings, SettingsError, UpdaterSettings};
pub use update::{UpdateEvent, UpdateOrchestrator, UpdateOutcome, UpdateState};
