use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::events::EventSink;
use crate::fsutil;
use crate::models::AppType;
use crate::progress::ProgressSpan;

pub mod ftp;
pub mod http;
pub mod smb;

pub use ftp::FtpSource;
pub use http::HttpSource;
pub use smb::SmbSource;

/// Transfer buffer for network downloads.
pub(crate) const DOWNLOAD_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Smb,
    Http,
    Ftp,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Smb => "SMB",
            SourceKind::Http => "HTTP",
            SourceKind::Ftp => "FTP",
        })
    }
}

/// What a fetch attempt did.
///
/// `Skipped` means the source did not even try (disabled, or missing
/// configuration for this app type) and the next source should be
/// consulted silently. Transport failures are returned as errors; the
/// acquisition engine logs them and falls through as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Fetched,
    Skipped,
    Cancelled,
}

/// One place an installer archive can come from.
pub trait InstallerSource {
    fn kind(&self) -> SourceKind;

    /// Fetches the archive for the given flavour and formatted version into
    /// `dest`. Implementations report download progress inside `span`, poll
    /// the token between chunks, and remove a partial `dest` on
    /// cancellation.
    fn fetch(
        &self,
        app_type: AppType,
        version: &str,
        dest: &Path,
        sink: &dyn EventSink,
        span: ProgressSpan,
        token: &CancellationToken,
    ) -> Result<FetchStatus, LaunchError>;
}

/// Parses the comma-separated priority list; unknown tokens are logged and
/// dropped.
pub fn parse_source_order(order: &str) -> Vec<SourceKind> {
    order
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.to_ascii_lowercase().as_str() {
            "smb" => Some(SourceKind::Smb),
            "http" => Some(SourceKind::Http),
            "ftp" => Some(SourceKind::Ftp),
            other => {
                log::warn!("unknown source '{other}' in priority order, skipping");
                None
            }
        })
        .collect()
}

/// Builds the adapter chain in the configured priority order.
pub fn configured_sources(
    config: &AppConfig,
    http_timeout: Duration,
) -> Vec<Box<dyn InstallerSource>> {
    parse_source_order(&config.source_priority.order)
        .into_iter()
        .map(|kind| match kind {
            SourceKind::Smb => {
                Box::new(SmbSource::new(config.smb_source.clone())) as Box<dyn InstallerSource>
            }
            SourceKind::Http => Box::new(HttpSource::new(config.http_source.clone(), http_timeout)),
            SourceKind::Ftp => Box::new(FtpSource::new(config.ftp_source.clone())),
        })
        .collect()
}

/// Drops a partially written archive after a cancelled or failed transfer.
pub(crate) fn discard_partial(dest: &Path) {
    fsutil::remove_file_best_effort(dest);
}
