use std::path::PathBuf;

use thiserror::Error;

use crate::models::AppType;
use crate::sources::SourceKind;

/// Failure taxonomy for the launcher core.
///
/// Each variant maps to one condition the UI can message on specifically.
/// Cancellation is deliberately not represented here; it travels as
/// `Outcome::Cancelled` (see `cancel`).
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required configuration value is missing or unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The raw target string could not be resolved into host, port and
    /// scheme.
    #[error("could not parse target address: {0}")]
    Parse(String),

    /// The server probe request failed (connection, timeout, HTTP status).
    #[error("server probe failed for '{url}': {message}")]
    Probe { url: String, message: String },

    /// The probe response is not JSON or is missing required fields.
    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    /// Every configured source was disabled, unconfigured or failed.
    #[error("no configured source could provide the installer archive")]
    ExhaustedSources,

    /// A single source adapter hit a transport-level failure. The
    /// acquisition engine turns this into fallthrough to the next source.
    #[error("{kind} source failed: {message}")]
    Transport { kind: SourceKind, message: String },

    /// The fetched archive is not a readable ZIP file.
    #[error("downloaded archive is corrupt or not a ZIP file: {0}")]
    CorruptArchive(String),

    /// Extraction failed for a reason other than archive corruption.
    #[error("archive extraction failed: {0}")]
    Extraction(String),

    /// BackOffice.exe was not found in the extracted content, or went
    /// missing after relocation.
    #[error("no {app_type} distribution for version {version} found in the archive content")]
    DistributionNotFound { app_type: AppType, version: String },

    /// The executable's embedded company name does not match the expected
    /// vendor.
    #[error("distribution vendor mismatch: expected '{expected}', found '{found}'")]
    VendorMismatch { expected: String, found: String },

    /// A bounded wait ran out of time. Distinct from cancellation.
    #[error("timed out {0}")]
    Timeout(String),

    /// backclient.config.xml could not be parsed, anchored or rewritten.
    #[error("client config rewrite failed for '{path}': {message}", path = .path.display())]
    ClientConfig { path: PathBuf, message: String },

    /// Spawning or stopping the BackOffice process failed.
    #[error("process error: {0}")]
    Process(String),

    /// A required piece of the host environment could not be resolved.
    #[error("environment error: {0}")]
    Environment(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Short machine-readable code for event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            LaunchError::Config(_) => "config",
            LaunchError::Parse(_) => "parse",
            LaunchError::Probe { .. } => "probe",
            LaunchError::InvalidResponse(_) => "invalid_response",
            LaunchError::ExhaustedSources => "exhausted_sources",
            LaunchError::Transport { .. } => "transport",
            LaunchError::CorruptArchive(_) => "corrupt_archive",
            LaunchError::Extraction(_) => "extraction",
            LaunchError::DistributionNotFound { .. } => "distribution_not_found",
            LaunchError::VendorMismatch { .. } => "vendor_mismatch",
            LaunchError::Timeout(_) => "timeout",
            LaunchError::ClientConfig { .. } => "client_config",
            LaunchError::Process(_) => "process",
            LaunchError::Environment(_) => "environment",
            LaunchError::Io(_) => "io",
        }
    }

    /// Full diagnostic detail: code, display message and the source chain,
    /// one cause per line. Carried by the error event next to the short
    /// message.
    pub fn detail(&self) -> String {
        let mut out = format!("[{}] {}", self.code(), self);
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
