use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::config::SmbConfig;
use crate::error::LaunchError;
use crate::events::{EventSink, StatusLevel};
use crate::models::AppType;
use crate::progress::ProgressSpan;
use crate::sources::{discard_partial, FetchStatus, InstallerSource, SourceKind};

/// Chunk size for copying from a mounted share; shares are fast and local,
/// so the buffer is much larger than the network download chunk.
const COPY_CHUNK: usize = 1024 * 1024;

/// Fetches archives by copying them from a UNC path (or any mounted
/// directory).
pub struct SmbSource {
    config: SmbConfig,
}

impl SmbSource {
    pub fn new(config: SmbConfig) -> Self {
        Self { config }
    }

    fn source_path(&self, archive_name: &str) -> PathBuf {
        let mut full = PathBuf::from(self.config.path.trim_end_matches(['/', '\\']));
        for part in archive_name
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
        {
            full.push(part);
        }
        full
    }
}

impl InstallerSource for SmbSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Smb
    }

    fn fetch(
        &self,
        app_type: AppType,
        version: &str,
        dest: &Path,
        sink: &dyn EventSink,
        span: ProgressSpan,
        token: &CancellationToken,
    ) -> Result<FetchStatus, LaunchError> {
        if token.is_cancelled() {
            return Ok(FetchStatus::Cancelled);
        }
        if !self.config.enabled {
            log::debug!("SMB source is disabled");
            return Ok(FetchStatus::Skipped);
        }
        if self.config.path.is_empty() {
            log::warn!("SMB source has no path configured");
            return Ok(FetchStatus::Skipped);
        }
        let Some(archive_name) = self.config.archives.archive_name(app_type, version) else {
            log::warn!("SMB source has no archive name template for {app_type}");
            return Ok(FetchStatus::Skipped);
        };

        let source = self.source_path(&archive_name);
        sink.status(
            &format!("Copying from SMB: {archive_name}..."),
            StatusLevel::Info,
        );
        log::info!("copying '{}' to '{}'", source.display(), dest.display());

        if !source.exists() {
            return Err(LaunchError::Transport {
                kind: SourceKind::Smb,
                message: format!("archive not found at '{}'", source.display()),
            });
        }

        let total = source.metadata().map(|m| m.len()).unwrap_or(0);
        let transport = |message: String| LaunchError::Transport {
            kind: SourceKind::Smb,
            message,
        };

        let mut reader = File::open(&source)
            .map_err(|err| transport(format!("could not open '{}': {err}", source.display())))?;
        let mut writer = File::create(dest)
            .map_err(|err| transport(format!("could not create '{}': {err}", dest.display())))?;

        let mut buffer = vec![0u8; COPY_CHUNK];
        let mut copied: u64 = 0;
        loop {
            if token.is_cancelled() {
                log::warn!("SMB copy cancelled");
                sink.status("SMB copy cancelled.", StatusLevel::Info);
                drop(writer);
                discard_partial(dest);
                return Ok(FetchStatus::Cancelled);
            }

            let read = reader
                .read(&mut buffer)
                .map_err(|err| transport(format!("read failed: {err}")))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|err| transport(format!("write failed: {err}")))?;
            copied += read as u64;
            if total > 0 {
                sink.progress(span.at(copied as f64 / total as f64));
            }
        }

        log::info!("SMB copy finished ({copied} bytes)");
        sink.status("SMB copy finished.", StatusLevel::Info);
        sink.progress(span.end());
        Ok(FetchStatus::Fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::NullSink;
    use std::fs;

    fn config_for(share: &Path, enabled: bool) -> SmbConfig {
        SmbConfig {
            enabled,
            path: share.to_string_lossy().into_owned(),
            ..SmbConfig::default()
        }
    }

    #[test]
    fn copies_the_archive_from_the_share() {
        let share = tempfile::tempdir().unwrap();
        fs::write(share.path().join("RMSOffice813.zip"), b"zip-bytes").unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("RMSOffice813.zip");

        let source = SmbSource::new(config_for(share.path(), true));
        let status = source
            .fetch(
                AppType::IikoRms,
                "813",
                &dest,
                &NullSink,
                ProgressSpan::full(),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(status, FetchStatus::Fetched);
        assert_eq!(fs::read(&dest).unwrap(), b"zip-bytes");
    }

    #[test]
    fn disabled_source_is_skipped() {
        let share = tempfile::tempdir().unwrap();
        let source = SmbSource::new(config_for(share.path(), false));
        let status = source
            .fetch(
                AppType::IikoRms,
                "813",
                Path::new("unused.zip"),
                &NullSink,
                ProgressSpan::full(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(status, FetchStatus::Skipped);
    }

    #[test]
    fn missing_archive_is_a_transport_error() {
        let share = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let source = SmbSource::new(config_for(share.path(), true));
        let err = source
            .fetch(
                AppType::IikoRms,
                "813",
                &dest_dir.path().join("out.zip"),
                &NullSink,
                ProgressSpan::full(),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Transport {
                kind: SourceKind::Smb,
                ..
            }
        ));
    }

    #[test]
    fn cancelled_before_start() {
        let share = tempfile::tempdir().unwrap();
        let source = SmbSource::new(config_for(share.path(), true));
        let token = CancellationToken::new();
        token.cancel();
        let status = source
            .fetch(
                AppType::IikoRms,
                "813",
                Path::new("unused.zip"),
                &NullSink,
                ProgressSpan::full(),
                &token,
            )
            .unwrap();
        assert_eq!(status, FetchStatus::Cancelled);
    }

    #[test]
    fn vendor_subpath_in_template_maps_to_directories() {
        let share = tempfile::tempdir().unwrap();
        fs::create_dir(share.path().join("Syrve")).unwrap();
        fs::write(share.path().join("Syrve/RMSSOffice90.zip"), b"syrve").unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("RMSSOffice90.zip");

        let source = SmbSource::new(config_for(share.path(), true));
        let status = source
            .fetch(
                AppType::SyrveRms,
                "90",
                &dest,
                &NullSink,
                ProgressSpan::full(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(status, FetchStatus::Fetched);
        assert_eq!(fs::read(&dest).unwrap(), b"syrve");
    }
}
