use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::HttpConfig;
use crate::error::LaunchError;
use crate::events::{EventSink, StatusLevel};
use crate::models::AppType;
use crate::progress::ProgressSpan;
use crate::sources::{discard_partial, FetchStatus, InstallerSource, SourceKind, DOWNLOAD_CHUNK};

/// Downloads archives from a plain HTTP(S) directory.
pub struct HttpSource {
    config: HttpConfig,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(config: HttpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn archive_url(&self, archive_name: &str) -> String {
        format!("{}/{archive_name}", self.config.url.trim_end_matches('/'))
    }
}

impl InstallerSource for HttpSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Http
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
            log::debug!("HTTP source is disabled");
            return Ok(FetchStatus::Skipped);
        }
        if self.config.url.is_empty() {
            log::warn!("HTTP source has no URL configured");
            return Ok(FetchStatus::Skipped);
        }
        let Some(archive_name) = self.config.archives.archive_name(app_type, version) else {
            log::warn!("HTTP source has no archive name template for {app_type}");
            return Ok(FetchStatus::Skipped);
        };

        let url = self.archive_url(&archive_name);
        sink.status(
            &format!("Downloading over HTTP: {archive_name}..."),
            StatusLevel::Info,
        );
        log::info!("downloading '{url}' to '{}'", dest.display());

        let transport = |message: String| LaunchError::Transport {
            kind: SourceKind::Http,
            message,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| transport(err.to_string()))?;
        let mut response = client
            .get(&url)
            .send()
            .map_err(|err| transport(format!("request to '{url}' failed: {err}")))?
            .error_for_status()
            .map_err(|err| transport(err.to_string()))?;

        let total = response.content_length().unwrap_or(0);
        let mut writer = File::create(dest)
            .map_err(|err| transport(format!("could not create '{}': {err}", dest.display())))?;

        let mut buffer = vec![0u8; DOWNLOAD_CHUNK];
        let mut downloaded: u64 = 0;
        loop {
            if token.is_cancelled() {
                log::warn!("HTTP download cancelled");
                sink.status("HTTP download cancelled.", StatusLevel::Info);
                drop(writer);
                discard_partial(dest);
                return Ok(FetchStatus::Cancelled);
            }

            let read = response
                .read(&mut buffer)
                .map_err(|err| transport(format!("download from '{url}' failed: {err}")))?;
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

        log::info!("HTTP download finished ({downloaded} bytes)");
        sink.status("HTTP download finished.", StatusLevel::Info);
        sink.progress(span.end());
        Ok(FetchStatus::Fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::NullSink;

    #[test]
    fn archive_url_joins_without_double_slash() {
        let config = HttpConfig {
            url: "https://mirror.example/iikoBacks/".to_string(),
            ..HttpConfig::default()
        };
        let source = HttpSource::new(config, Duration::from_secs(15));
        assert_eq!(
            source.archive_url("Syrve/RMSSOffice90.zip"),
            "https://mirror.example/iikoBacks/Syrve/RMSSOffice90.zip"
        );
    }

    #[test]
    fn disabled_source_is_skipped() {
        let config = HttpConfig {
            enabled: false,
            ..HttpConfig::default()
        };
        let source = HttpSource::new(config, Duration::from_secs(15));
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
        let source = HttpSource::new(HttpConfig::default(), Duration::from_secs(15));
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
