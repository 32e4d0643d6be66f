use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::cancel::{CancellationToken, Outcome, StepResult};
use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::events::{EventSink, StatusLevel};
use crate::fsutil;
use crate::metadata;
use crate::models::AppType;
use crate::progress::ProgressSpan;
use crate::sources::{configured_sources, FetchStatus, InstallerSource};
use crate::{check_cancelled, try_outcome};

const BACKOFFICE_EXE: &str = "BackOffice.exe";
const TEMP_EXTRACT_DIR: &str = "temp_extract_folder";

/// Finds a ready local distribution or fetches, extracts and stages one
/// from the configured sources.
///
/// Progress inside the caller's span is split 10% local check, 40%
/// download, 40% extraction, 10% relocation and final verification. On
/// error or cancellation every partial artifact is removed: the temp
/// archive, the temp extraction folder and the half-staged distribution
/// directory (never the installer root itself).
pub struct AcquisitionEngine {
    installer_root: PathBuf,
    temp_dir: PathBuf,
    sources: Vec<Box<dyn InstallerSource>>,
}

impl AcquisitionEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_sources(
            config.settings.installer_root.clone(),
            std::env::temp_dir(),
            configured_sources(config, config.http_timeout()),
        )
    }

    /// Assembles an engine from explicit parts; lets callers (and tests)
    /// control the roots and the source chain.
    pub fn with_sources(
        installer_root: PathBuf,
        temp_dir: PathBuf,
        sources: Vec<Box<dyn InstallerSource>>,
    ) -> Self {
        Self {
            installer_root,
            temp_dir,
            sources,
        }
    }

    /// Returns the path of a distribution directory that contains a
    /// verified BackOffice.exe for the given flavour and version.
    pub fn prepare(
        &self,
        app_type: AppType,
        version: &str,
        dir_name: &str,
        sink: &dyn EventSink,
        span: ProgressSpan,
        token: &CancellationToken,
    ) -> StepResult<PathBuf> {
        check_cancelled!(token);
        let vendor = app_type.vendor();
        log::info!("preparing distribution '{dir_name}' for {app_type} (vendor {vendor})");

        let local_path = self.installer_root.join(dir_name);
        let exe_path = local_path.join(BACKOFFICE_EXE);
        sink.status(
            &format!("Checking local distribution: {dir_name}..."),
            StatusLevel::Info,
        );

        // Cache check (first 10% of the span).
        if exe_path.exists() {
            let company = metadata::file_company_name(&exe_path);
            if metadata::vendor_matches(company.as_deref(), vendor) {
                log::info!("local distribution at '{}' is usable", local_path.display());
                sink.status(
                    "Local distribution found, vendor matches (or is undetermined).",
                    StatusLevel::Info,
                );
                sink.progress(span.at(0.1));
                return Ok(Outcome::Completed(local_path));
            }
            log::warn!(
                "local distribution vendor '{}' does not match expected '{vendor}', re-acquiring",
                company.as_deref().unwrap_or("?")
            );
            sink.status(
                "Local distribution found, but the vendor does not match.",
                StatusLevel::Warning,
            );
            fsutil::remove_dir_best_effort(&local_path);
        }
        sink.progress(span.at(0.1));

        sink.status(
            "Local distribution missing or unusable. Trying remote sources...",
            StatusLevel::Info,
        );

        let temp_archive = self.temp_dir.join(format!("{dir_name}.zip"));
        let temp_extract = local_path.join(TEMP_EXTRACT_DIR);

        let staged = self.stage(
            app_type,
            version,
            &local_path,
            &temp_archive,
            &temp_extract,
            sink,
            span,
            token,
        );

        match staged {
            Ok(Outcome::Completed(())) => {
                fsutil::remove_file_best_effort(&temp_archive);
                sink.progress(span.end());
                sink.status("Distribution prepared.", StatusLevel::Info);
                Ok(Outcome::Completed(local_path))
            }
            Ok(Outcome::Cancelled) => {
                self.cleanup(&temp_archive, &temp_extract, &local_path);
                Ok(Outcome::Cancelled)
            }
            Err(err) => {
                self.cleanup(&temp_archive, &temp_extract, &local_path);
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn stage(
        &self,
        app_type: AppType,
        version: &str,
        local_path: &Path,
        temp_archive: &Path,
        temp_extract: &Path,
        sink: &dyn EventSink,
        span: ProgressSpan,
        token: &CancellationToken,
    ) -> StepResult<()> {
        check_cancelled!(token);

        // Start from a clean slate: a stale half-staged directory or a
        // leftover archive from a crashed run must not leak into this one.
        if local_path.exists() {
            fsutil::remove_dir_best_effort(local_path);
        }
        fs::create_dir_all(&self.installer_root)?;
        fs::create_dir_all(local_path)?;
        fsutil::remove_file_best_effort(temp_archive);

        // Download (10%..50% of the span).
        let download_span = span.slice(0.1, 0.5);
        let mut fetched = false;
        for source in &self.sources {
            check_cancelled!(token);
            log::debug!("trying {} source", source.kind());
            match source.fetch(app_type, version, temp_archive, sink, download_span, token) {
                Ok(FetchStatus::Fetched) => {
                    fetched = true;
                    break;
                }
                Ok(FetchStatus::Skipped) => {
                    log::debug!("{} source skipped", source.kind());
                }
                Ok(FetchStatus::Cancelled) => return Ok(Outcome::Cancelled),
                Err(err) => {
                    log::warn!("{} source failed: {err}", source.kind());
                    sink.status(&err.to_string(), StatusLevel::Error);
                }
            }
        }
        if !fetched {
            return Err(LaunchError::ExhaustedSources);
        }

        // Extraction (50%..90% of the span).
        let extract_span = span.slice(0.5, 0.9);
        sink.status(
            &format!("Extracting archive '{}'...", file_name(temp_archive)),
            StatusLevel::Info,
        );
        fs::create_dir_all(temp_extract)?;
        try_outcome!(extract_archive(temp_archive, temp_extract, sink, extract_span, token));
        sink.status("Archive extracted.", StatusLevel::Info);
        sink.progress(extract_span.end());

        // Locate the content root (the directory holding BackOffice.exe).
        sink.status(
            "Verifying and relocating the extracted distribution...",
            StatusLevel::Info,
        );
        let mut content_root: Option<PathBuf> = None;
        for entry in WalkDir::new(temp_extract).into_iter().flatten() {
            check_cancelled!(token);
            if entry.file_type().is_file() && entry.file_name() == BACKOFFICE_EXE {
                content_root = entry.path().parent().map(Path::to_path_buf);
                break;
            }
        }
        let Some(content_root) = content_root else {
            return Err(LaunchError::DistributionNotFound {
                app_type,
                version: version.to_string(),
            });
        };
        log::info!("content root located at '{}'", content_root.display());
        sink.progress(span.at(0.92));

        // Relocate into the distribution directory and drop the temp tree.
        try_outcome!(fsutil::copy_dir_merge(&content_root, local_path, token));
        fsutil::remove_dir_best_effort(temp_extract);
        sink.progress(span.at(0.98));

        // Final verification after relocation.
        check_cancelled!(token);
        let exe_path = local_path.join(BACKOFFICE_EXE);
        if !exe_path.exists() {
            return Err(LaunchError::DistributionNotFound {
                app_type,
                version: version.to_string(),
            });
        }
        let vendor = app_type.vendor();
        if let Some(company) = metadata::file_company_name(&exe_path) {
            if !vendor.matches_company(&company) {
                // Unlike the pre-download check this is a hard error:
                // re-acquiring would fetch the same wrong archive again.
                return Err(LaunchError::VendorMismatch {
                    expected: vendor.as_str().to_string(),
                    found: company,
                });
            }
        }

        Ok(Outcome::Completed(()))
    }

    /// Removes everything a failed or cancelled staging attempt may have
    /// left behind. The installer root itself is never deleted.
    fn cleanup(&self, temp_archive: &Path, temp_extract: &Path, local_path: &Path) {
        log::debug!("cleaning up staging leftovers");
        fsutil::remove_dir_best_effort(temp_extract);
        fsutil::remove_file_best_effort(temp_archive);
        if local_path.exists() && local_path != self.installer_root {
            fsutil::remove_dir_best_effort(local_path);
        }
    }
}

fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    sink: &dyn EventSink,
    span: ProgressSpan,
    token: &CancellationToken,
) -> StepResult<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|err| {
        LaunchError::CorruptArchive(format!("'{}': {err}", file_name(archive_path)))
    })?;

    let total = archive.len();
    if total == 0 {
        log::warn!("archive '{}' is empty", file_name(archive_path));
    }

    for index in 0..total {
        check_cancelled!(token);
        let mut entry = archive.by_index(index).map_err(|err| {
            LaunchError::CorruptArchive(format!("'{}': {err}", file_name(archive_path)))
        })?;

        // Entries with absolute or parent-escaping paths are dropped
        // rather than written outside the extraction directory.
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("skipping archive entry with unsafe path: '{}'", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| LaunchError::Extraction(err.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| LaunchError::Extraction(err.to_string()))?;
            }
            let mut out = File::create(&target)
                .map_err(|err| LaunchError::Extraction(err.to_string()))?;
            io::copy(&mut entry, &mut out)
                .map_err(|err| LaunchError::Extraction(err.to_string()))?;
        }

        sink.progress(span.at((index + 1) as f64 / total as f64));
    }

    Ok(Outcome::Completed(()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::NullSink;
    use crate::sources::SourceKind;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use zip::write::SimpleFileOptions;

    enum Behavior {
        Fail,
        Skip,
        Deliver(Vec<u8>),
    }

    struct FakeSource {
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn boxed(behavior: Behavior, calls: &Arc<AtomicUsize>) -> Box<dyn InstallerSource> {
            Box::new(FakeSource {
                behavior,
                calls: Arc::clone(calls),
            })
        }
    }

    impl InstallerSource for FakeSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Http
        }

        fn fetch(
            &self,
            _app_type: AppType,
            _version: &str,
            dest: &Path,
            _sink: &dyn EventSink,
            _span: ProgressSpan,
            _token: &CancellationToken,
        ) -> Result<FetchStatus, LaunchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Fail => Err(LaunchError::Transport {
                    kind: SourceKind::Http,
                    message: "unreachable".into(),
                }),
                Behavior::Skip => Ok(FetchStatus::Skipped),
                Behavior::Deliver(bytes) => {
                    fs::write(dest, bytes)?;
                    Ok(FetchStatus::Fetched)
                }
            }
        }
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    struct Fixture {
        _root: tempfile::TempDir,
        _temp: tempfile::TempDir,
        installer_root: PathBuf,
        temp_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let installer_root = root.path().join("Backs");
        let temp_dir = temp.path().to_path_buf();
        Fixture {
            installer_root,
            temp_dir,
            _root: root,
            _temp: temp,
        }
    }

    fn engine_with(
        fx: &Fixture,
        sources: Vec<Box<dyn InstallerSource>>,
    ) -> AcquisitionEngine {
        AcquisitionEngine::with_sources(fx.installer_root.clone(), fx.temp_dir.clone(), sources)
    }

    #[test]
    fn cache_hit_skips_every_source() {
        let fx = fixture();
        let local = fx.installer_root.join("RMSOffice813");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join(BACKOFFICE_EXE), b"dummy exe").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Skip, &calls)]);
        let outcome = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.completed().unwrap(), local);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_source_falls_through_to_the_next() {
        let fx = fixture();
        let zip = build_zip(&[
            ("RMSOffice813/BackOffice.exe", b"exe bytes"),
            ("RMSOffice813/lib/core.dll", b"dll bytes"),
        ]);
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let delivering_calls = Arc::new(AtomicUsize::new(0));
        let unreached_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            &fx,
            vec![
                FakeSource::boxed(Behavior::Fail, &failing_calls),
                FakeSource::boxed(Behavior::Deliver(zip), &delivering_calls),
                FakeSource::boxed(Behavior::Skip, &unreached_calls),
            ],
        );

        let outcome = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap();

        let local = outcome.completed().unwrap();
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(delivering_calls.load(Ordering::SeqCst), 1);
        // A success short-circuits; later sources are never consulted.
        assert_eq!(unreached_calls.load(Ordering::SeqCst), 0);
        // Content was hoisted out of the archive's inner directory.
        assert_eq!(fs::read(local.join(BACKOFFICE_EXE)).unwrap(), b"exe bytes");
        assert_eq!(fs::read(local.join("lib/core.dll")).unwrap(), b"dll bytes");
        assert!(!local.join(TEMP_EXTRACT_DIR).exists());
        assert!(!fx.temp_dir.join("RMSOffice813.zip").exists());
    }

    #[test]
    fn all_sources_skipping_exhausts_and_cleans_up() {
        let fx = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Skip, &calls)]);

        let err = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, LaunchError::ExhaustedSources));
        assert!(!fx.installer_root.join("RMSOffice813").exists());
        assert!(fx.installer_root.exists());
    }

    #[test]
    fn corrupt_archive_is_reported_and_cleaned_up() {
        let fx = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            &fx,
            vec![FakeSource::boxed(
                Behavior::Deliver(b"definitely not a zip".to_vec()),
                &calls,
            )],
        );

        let err = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, LaunchError::CorruptArchive(_)));
        assert!(!fx.installer_root.join("RMSOffice813").exists());
        assert!(!fx.temp_dir.join("RMSOffice813.zip").exists());
    }

    #[test]
    fn archive_without_backoffice_exe_is_not_a_distribution() {
        let fx = fixture();
        let zip = build_zip(&[("readme.txt", b"no executable here")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Deliver(zip), &calls)]);

        let err = engine
            .prepare(
                AppType::SyrveChain,
                "90",
                "ChainSOffice90",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            LaunchError::DistributionNotFound {
                app_type: AppType::SyrveChain,
                ..
            }
        ));
        assert!(!fx.installer_root.join("ChainSOffice90").exists());
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let fx = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Skip, &calls)]);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &token,
            )
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Cancels the shared token the first time progress crosses the given
    /// value, simulating a user cancelling mid-extraction.
    struct CancelAtProgressSink {
        token: CancellationToken,
        threshold: f64,
    }

    impl EventSink for CancelAtProgressSink {
        fn status(&self, _message: &str, _level: StatusLevel) {}

        fn progress(&self, value: f64) {
            if value >= self.threshold {
                self.token.cancel();
            }
        }

        fn text(&self, _blob: &str) {}
    }

    #[test]
    fn cancellation_during_extraction_leaves_no_partial_directories() {
        let fx = fixture();
        let zip = build_zip(&[
            ("BackOffice.exe", b"exe bytes"),
            ("lib/core.dll", b"dll bytes"),
            ("lib/extra.dll", b"more bytes"),
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Deliver(zip), &calls)]);

        // Extraction reports inside the 70..86 sub-range of the 50-90 span;
        // cancelling there stops the loop between archive entries.
        let token = CancellationToken::new();
        let sink = CancelAtProgressSink {
            token: token.clone(),
            threshold: 70.0,
        };

        let outcome = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &sink,
                ProgressSpan::new(50.0, 90.0),
                &token,
            )
            .unwrap();

        assert!(outcome.is_cancelled());
        assert!(!fx.installer_root.join("RMSOffice813").exists());
        assert!(!fx.temp_dir.join("RMSOffice813.zip").exists());
        assert!(fx.installer_root.exists());
    }

    #[test]
    fn stale_local_dir_without_exe_is_restaged() {
        let fx = fixture();
        let local = fx.installer_root.join("RMSOffice813");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("leftover.tmp"), b"junk").unwrap();

        let zip = build_zip(&[("BackOffice.exe", b"fresh exe")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(&fx, vec![FakeSource::boxed(Behavior::Deliver(zip), &calls)]);

        let outcome = engine
            .prepare(
                AppType::IikoRms,
                "813",
                "RMSOffice813",
                &NullSink,
                ProgressSpan::new(50.0, 90.0),
                &CancellationToken::new(),
            )
            .unwrap();

        let local = outcome.completed().unwrap();
        assert_eq!(fs::read(local.join(BACKOFFICE_EXE)).unwrap(), b"fresh exe");
        assert!(!local.join("leftover.tmp").exists());
    }
}
