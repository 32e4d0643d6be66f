use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use suppaftp::types::FileType;
use suppaftp::FtpStream;

use crate::cancel::CancellationToken;
use crate::config::FtpConfig;
use crate::error::LaunchError;
use crate::events::{EventSink, StatusLevel};
use crate::models::AppType;
use crate::progress::ProgressSpan;
use crate::sources::{discard_partial, FetchStatus, InstallerSource, SourceKind, DOWNLOAD_CHUNK};

/// Downloads archives from an FTP directory with a binary RETR.
pub struct FtpSource {
    config: FtpConfig,
}

impl FtpSource {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

impl InstallerSource for FtpSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ftp
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
            log::debug!("FTP source is disabled");
            return Ok(FetchStatus::Skipped);
        }
        if self.config.host.is_empty() || self.config.directory.is_empty() {
            log::warn!("FTP source has no host or directory configured");
            return Ok(FetchStatus::Skipped);
        }
        let Some(archive_name) = self.config.archives.archive_name(app_type, version) else {
            log::warn!("FTP source has no archive name template for {app_type}");
            return Ok(FetchStatus::Skipped);
        };

        sink.status(
            &format!("Downloading over FTP: {archive_name}..."),
            StatusLevel::Info,
        );
        log::info!(
            "downloading '{}:{}{}/{archive_name}' to '{}'",
            self.config.host,
            self.config.port,
            self.config.directory,
            dest.display()
        );

        let transport = |message: String| LaunchError::Transport {
            kind: SourceKind::Ftp,
            message,
        };

        let address = format!("{}:{}", self.config.host, self.config.port);
        let mut ftp = FtpStream::connect(&address)
            .map_err(|err| transport(format!("could not connect to '{address}': {err}")))?;
        ftp.login(&self.config.username, &self.config.password)
            .map_err(|err| transport(format!("login failed: {err}")))?;
        ftp.cwd(&self.config.directory).map_err(|err| {
            transport(format!(
                "could not enter directory '{}': {err}",
                self.config.directory
            ))
        })?;

        // The template may carry a vendor sub-path.
        let file_name = match archive_name.rsplit_once('/') {
            Some((subdir, file)) => {
                ftp.cwd(subdir).map_err(|err| {
                    transport(format!("could not enter sub-directory '{subdir}': {err}"))
                })?;
                file.to_string()
            }
            None => archive_name.clone(),
        };

        let total = match ftp.size(&file_name) {
            Ok(size) => size as u64,
            Err(err) => {
                log::warn!("could not get size of '{file_name}': {err}");
                0
            }
        };

        ftp.transfer_type(FileType::Binary)
            .map_err(|err| transport(format!("could not switch to binary mode: {err}")))?;
        let mut stream = ftp
            .retr_as_stream(&file_name)
            .map_err(|err| transport(format!("RETR '{file_name}' failed: {err}")))?;

        let mut writer = File::create(dest)
            .map_err(|err| transport(format!("could not create '{}': {err}", dest.display())))?;
        let mut buffer = vec![0u8; DOWNLOAD_CHUNK];
        let mut downloaded: u64 = 0;
        loop {
            if token.is_cancelled() {
                log::warn!("FTP download cancelled");
                sink.status("FTP download cancelled.", StatusLevel::Info);
                // Abort tears down the data connection server-side; ignore
                // failures, the control connection is going away anyway.
                if let Err(err) = ftp.abort(stream) {
                    log::debug!("FTP ABOR failed: {err}");
                }
                drop(writer);
                discard_partial(dest);
                return Ok(FetchStatus::Cancelled);
            }

            let read = stream
                .read(&mut buffer)
                .map_err(|err| transport(format!("download of '{file_name}' failed: {err}")))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|err| transport(format!("write failed: {err}")))?;
            downloaded += read as u64;
            if total > 0 {
                sink.progress(span.at(downloaded as f64 / total as f64));
            }
        }

        ftp.finalize_retr_stream(stream)
            .map_err(|err| transport(format!("could not finalize transfer: {err}")))?;
        if let Err(err) = ftp.quit() {
            log::debug!("FTP QUIT failed: {err}");
        }

        log::info!("FTP download finished ({downloaded} bytes)");
        sink.status("FTP download finished.", StatusLevel::Info);
        sink.progress(span.end());
        Ok(FetchStatus::Fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::NullSink;

    #[test]
    fn disabled_source_is_skipped() {
        let config = FtpConfig {
            enabled: false,
            ..FtpConfig::default()
        };
        let source = FtpSource::new(config);
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
    fn unconfigured_host_is_skipped() {
        let config = FtpConfig {
            host: String::new(),
            ..FtpConfig::default()
        };
        let source = FtpSource::new(config);
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
    fn cancelled_before_start() {
        let source = FtpSource::new(FtpConfig::default());
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
}
