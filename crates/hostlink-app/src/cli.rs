//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hostlink_core::HostSettings;

/// Hostlink - host capabilities for the attendance tracker
#[derive(Parser, Debug)]
#[command(name = "hostlink", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (default: settings.json in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for a download to finish
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Directory downloads are stored in
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Root directory exported documents are filed under
    #[arg(long, global = true)]
    pub documents_dir: Option<PathBuf>,

    /// Report install permission as missing
    #[arg(long, global = true)]
    pub deny_installs: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a new version and hand it to the installer
    Update {
        /// Absolute http(s) URL of the package
        url: String,
    },

    /// Save a file into the documents folder
    Save {
        /// File to export
        file: PathBuf,

        /// Name to save under (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Serve bridge channels as JSON lines on stdin/stdout
    Serve,
}

impl Args {
    /// Effective log level.
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Layers command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut HostSettings) {
        if let Some(secs) = self.timeout_secs {
            settings.updater.completion_timeout_secs = secs;
        }
        if let Some(dir) = &self.download_dir {
            settings.download_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.documents_dir {
            settings.documents_dir = Some(dir.clone());
        }
        if self.deny_installs {
            settings.allow_package_installs = false;
        }
    }
}
