use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use crate::cancel::{CancellationToken, Outcome, StepResult};
use crate::check_cancelled;
use crate::error::{LaunchError, Result};
use crate::events::{EventSink, StatusLevel};
use crate::progress::ProgressSpan;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How long to wait for a freshly created config file to gain content, and
/// how often to look. The existence wait is configurable; this second phase
/// is short and fixed.
const CONTENT_WAIT: Duration = Duration::from_secs(10);
const CONTENT_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned BackOffice instance the launcher keeps track of.
#[derive(Debug)]
pub struct BackOfficeProcess {
    child: Child,
    pub exe_path: PathBuf,
    pub args: String,
}

/// Starts BackOffice.exe from the given distribution directory.
///
/// The `/AdditionalTmpFolder` flag keys the per-server temp directory; the
/// quotes around the value are part of the argument, matching what the
/// executable parses.
pub fn spawn_backoffice(installer_dir: &Path, sanitized_target: &str) -> Result<BackOfficeProcess> {
    let exe_path = installer_dir.join("BackOffice.exe");
    if !exe_path.exists() {
        return Err(LaunchError::Process(format!(
            "executable not found at '{}'",
            exe_path.display()
        )));
    }

    let args = format!("/AdditionalTmpFolder=\"{sanitized_target}\"");
    log::info!("starting '{}' {args}", exe_path.display());

    let mut command = Command::new(&exe_path);
    command.arg(&args).current_dir(installer_dir);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let child = command.spawn().map_err(|err| {
        LaunchError::Process(format!("could not start '{}': {err}", exe_path.display()))
    })?;

    log::info!("BackOffice started with pid {}", child.id());
    Ok(BackOfficeProcess {
        child,
        exe_path,
        args,
    })
}

impl BackOfficeProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Stops the process if it is still running. Never fails: a process that
    /// already exited or cannot be killed is logged and left alone.
    pub fn stop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                log::info!("BackOffice pid {} already exited ({status})", self.id());
                return;
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("could not query BackOffice pid {}: {err}", self.id());
                return;
            }
        }
        log::info!("stopping BackOffice pid {}", self.id());
        if let Err(err) = self.child.kill() {
            log::warn!("could not stop BackOffice pid {}: {err}", self.id());
            return;
        }
        if let Err(err) = self.child.wait() {
            log::warn!("could not reap BackOffice pid {}: {err}", self.id());
        }
    }
}

/// Waits for `path` to appear and then to contain markup.
///
/// BackOffice creates its config file empty and fills it in a moment later,
/// so the wait has two phases: existence (configurable timeout, first half
/// of the span) and content (fixed short timeout, second half). A timeout in
/// either phase is an error; cancellation unwinds cleanly.
pub fn wait_for_file(
    path: &Path,
    timeout: Duration,
    interval: Duration,
    sink: &dyn EventSink,
    span: ProgressSpan,
    token: &CancellationToken,
) -> StepResult<()> {
    sink.status(
        "Waiting for BackOffice to create its configuration file...",
        StatusLevel::Info,
    );
    log::info!(
        "waiting up to {}s for '{}'",
        timeout.as_secs(),
        path.display()
    );

    let existence_span = span.slice(0.0, 0.5);
    let attempts = (timeout.as_millis() / interval.as_millis().max(1)).max(1);
    let mut found = false;
    for attempt in 0..attempts {
        check_cancelled!(token);
        if path.exists() {
            found = true;
            break;
        }
        sink.progress(existence_span.at((attempt + 1) as f64 / attempts as f64));
        thread::sleep(interval);
    }
    if !found {
        return Err(LaunchError::Timeout(format!(
            "configuration file '{}' did not appear within {}s",
            path.display(),
            timeout.as_secs()
        )));
    }
    sink.progress(existence_span.end());
    log::debug!("'{}' exists, waiting for content", path.display());

    let content_span = span.slice(0.5, 1.0);
    let attempts = (CONTENT_WAIT.as_millis() / CONTENT_INTERVAL.as_millis()).max(1);
    for attempt in 0..attempts {
        check_cancelled!(token);
        if has_markup_preview(path) {
            sink.progress(span.end());
            log::info!("'{}' is ready", path.display());
            return Ok(Outcome::Completed(()));
        }
        sink.progress(content_span.at((attempt + 1) as f64 / attempts as f64));
        thread::sleep(CONTENT_INTERVAL);
    }

    Err(LaunchError::Timeout(format!(
        "configuration file '{}' stayed empty",
        path.display()
    )))
}

/// Peeks at the first bytes of the file looking for the start of an XML tag.
fn has_markup_preview(path: &Path) -> bool {
    let mut preview = [0u8; 100];
    let read = File::open(path).and_then(|mut file| file.read(&mut preview));
    match read {
        Ok(len) => preview[..len].contains(&b'<'),
        Err(err) => {
            log::debug!("could not read '{}': {err}", path.display());
            false
        }
    }
}
