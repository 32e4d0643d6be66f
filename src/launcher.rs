use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::acquire::AcquisitionEngine;
use crate::appdata;
use crate::cancel::{CancellationToken, Outcome, StepResult};
use crate::client_config;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{DialogAnswer, DialogKind, DialogRequest, EventSink, StatusLevel};
use crate::models::{determine_app_variant, AppType, AppVariant, ServerInfo, Vendor};
use crate::probe;
use crate::process::{self, BackOfficeProcess};
use crate::progress::ProgressSpan;
use crate::sources::configured_sources;
use crate::target::{self, ParsedTarget};
use crate::{check_cancelled, try_outcome};

// Progress boundaries of the launch sequence, one span per step.
const STEP_PARSE: ProgressSpan = ProgressSpan::new(0.0, 5.0);
const STEP_PROBE: ProgressSpan = ProgressSpan::new(5.0, 20.0);
const STEP_RESOLVE: ProgressSpan = ProgressSpan::new(20.0, 35.0);
const STEP_STATE: ProgressSpan = ProgressSpan::new(35.0, 40.0);
const STEP_VERSION: ProgressSpan = ProgressSpan::new(40.0, 45.0);
const STEP_DIR_NAME: ProgressSpan = ProgressSpan::new(45.0, 50.0);
const STEP_ACQUIRE: ProgressSpan = ProgressSpan::new(50.0, 90.0);
const STEP_CACHE: ProgressSpan = ProgressSpan::new(90.0, 95.0);
const STEP_FIRST_RUN: ProgressSpan = ProgressSpan::new(95.0, 96.0);
const STEP_CONFIG: ProgressSpan = ProgressSpan::new(96.0, 98.0);
const STEP_RESTART: ProgressSpan = ProgressSpan::new(98.0, 100.0);

const SERVER_READY_STATE: &str = "STARTED_SUCCESSFULLY";
const CLIENT_CONFIG_RELATIVE: &str = "config/backclient.config.xml";

/// Everything learned about the target before the application flavour is
/// known: the parsed address, the raw probe response and the fields pulled
/// out of it.
#[derive(Debug)]
pub struct ProbedSession {
    pub target_input: String,
    pub target: ParsedTarget,
    pub raw_response: serde_json::Value,
    pub info: ServerInfo,
    pub vendor: Vendor,
}

/// A probed session with the flavour resolved, either from the server's
/// edition or from the user's answer.
#[derive(Debug)]
pub struct ResolvedSession {
    pub probed: ProbedSession,
    pub app_type: AppType,
}

/// Where a suspended run stopped. Resuming with the matching answer picks
/// the sequence up at the step after the question.
#[derive(Debug)]
pub enum PausedState {
    AwaitingAppTypeChoice(ProbedSession),
    AwaitingServerConfirmation(ResolvedSession),
}

/// How a launch (or resume) ended. `Suspended` means a dialog must be shown
/// and the run continued through `Launcher::resume`.
#[derive(Debug)]
pub enum LaunchOutcome {
    Completed,
    Cancelled,
    Suspended(DialogRequest),
}

/// Drives the staged launch sequence: parse, probe, resolve the flavour,
/// confirm the server state, acquire the distribution, prepare the cache,
/// first run, config rewrite, restart.
pub struct Launcher {
    config: AppConfig,
    temp_dir: PathBuf,
    appdata_root: Option<PathBuf>,
}

impl Launcher {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            temp_dir: std::env::temp_dir(),
            appdata_root: None,
        }
    }

    /// Like `new`, but with explicit temp and application data roots.
    pub fn with_roots(config: AppConfig, temp_dir: PathBuf, appdata_root: Option<PathBuf>) -> Self {
        Self {
            config,
            temp_dir,
            appdata_root,
        }
    }

    /// Runs the full sequence for a raw target string.
    pub fn run(
        &self,
        target_input: &str,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> Result<LaunchOutcome> {
        if token.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }

        // Step 1: resolve host, port and scheme.
        sink.status(
            &format!("Parsing target address: {target_input}..."),
            StatusLevel::Info,
        );
        let target = target::parse_target_string(target_input)?;
        log::info!(
            "target resolved to {}://{}:{}",
            target.scheme,
            target.host,
            target.port
        );
        sink.progress(STEP_PARSE.end());

        // Step 2: probe the monitoring endpoint.
        if token.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }
        let url = probe::probe_url(&target);
        sink.status(&format!("Requesting server info: {url}..."), StatusLevel::Info);
        sink.progress(STEP_PROBE.at(0.1));
        let raw_response = probe::fetch_server_info(&url, self.config.http_timeout())?;
        sink.progress(STEP_PROBE.end());

        // Step 3: pull out the fields and resolve the flavour.
        if token.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }
        let info = ServerInfo::from_value(&raw_response)?;
        sink.status(
            &format!(
                "Server responded: version {}, edition '{}', state {}.",
                info.version, info.edition, info.server_state
            ),
            StatusLevel::Info,
        );

        match determine_app_variant(target_input, &info.edition) {
            AppVariant::NeedsChoice(vendor) => {
                let session = ProbedSession {
                    target_input: target_input.to_string(),
                    target,
                    raw_response,
                    info,
                    vendor,
                };
                sink.progress(STEP_RESOLVE.at(0.5));
                Ok(LaunchOutcome::Suspended(app_type_dialog(session)))
            }
            AppVariant::Known(app_type) => {
                sink.status(
                    &format!("Application type: {app_type}."),
                    StatusLevel::Info,
                );
                sink.progress(STEP_RESOLVE.end());
                let session = ResolvedSession {
                    probed: ProbedSession {
                        target_input: target_input.to_string(),
                        target,
                        raw_response,
                        info,
                        vendor: app_type.vendor(),
                    },
                    app_type,
                };
                self.run_from_state_check(session, sink, token)
            }
        }
    }

    /// Continues a suspended run with the user's answer.
    pub fn resume(
        &self,
        state: PausedState,
        answer: DialogAnswer,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> Result<LaunchOutcome> {
        match (state, answer) {
            (PausedState::AwaitingAppTypeChoice(probed), DialogAnswer::AppType(choice)) => {
                let app_type = AppType::from_parts(probed.vendor, choice);
                sink.status(
                    &format!("Application type chosen: {app_type}."),
                    StatusLevel::Info,
                );
                sink.progress(STEP_RESOLVE.end());
                let session = ResolvedSession { probed, app_type };
                self.run_from_state_check(session, sink, token)
            }
            (PausedState::AwaitingServerConfirmation(session), DialogAnswer::Confirm(true)) => {
                sink.status(
                    &format!(
                        "Continuing although the server state is {}.",
                        session.probed.info.server_state
                    ),
                    StatusLevel::Warning,
                );
                sink.progress(STEP_STATE.end());
                self.run_from_version(session, sink, token)
            }
            (_, DialogAnswer::Dismissed) | (_, DialogAnswer::Confirm(false)) => {
                log::info!("dialog declined, launch stopped");
                Ok(LaunchOutcome::Cancelled)
            }
            (state, answer) => {
                log::warn!("answer {answer:?} does not match the paused state {state:?}");
                Ok(LaunchOutcome::Cancelled)
            }
        }
    }

    /// Checks the target server and reports its raw monitoring response
    /// without launching anything.
    pub fn check(
        &self,
        target_input: &str,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> StepResult<serde_json::Value> {
        check_cancelled!(token);

        sink.status(
            &format!("Parsing target address: {target_input}..."),
            StatusLevel::Info,
        );
        let target = target::parse_target_string(target_input)?;
        sink.progress(10.0);

        check_cancelled!(token);
        let url = probe::probe_url(&target);
        sink.status(&format!("Requesting server info: {url}..."), StatusLevel::Info);
        sink.progress(ProgressSpan::new(10.0, 90.0).at(0.1));
        let raw_response = probe::fetch_server_info(&url, self.config.http_timeout())?;
        sink.progress(90.0);

        // Validate the shape even though the caller gets the raw value.
        let info = ServerInfo::from_value(&raw_response)?;
        sink.status(
            &format!(
                "Server is reachable: version {}, state {}.",
                info.version, info.server_state
            ),
            StatusLevel::Info,
        );
        Ok(Outcome::Completed(raw_response))
    }

    /// Step 4: require the server to be started, or ask the user.
    fn run_from_state_check(
        &self,
        session: ResolvedSession,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> Result<LaunchOutcome> {
        if token.is_cancelled() {
            return Ok(LaunchOutcome::Cancelled);
        }
        if session.probed.info.server_state != SERVER_READY_STATE {
            log::warn!(
                "server state is '{}', asking for confirmation",
                session.probed.info.server_state
            );
            sink.progress(STEP_STATE.at(0.5));
            return Ok(LaunchOutcome::Suspended(server_state_dialog(session)));
        }
        sink.progress(STEP_STATE.end());
        self.run_from_version(session, sink, token)
    }

    /// Steps 5 through 11, with the first-run process stopped on any exit
    /// that is not success.
    fn run_from_version(
        &self,
        session: ResolvedSession,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> Result<LaunchOutcome> {
        let mut tracked: Option<BackOfficeProcess> = None;
        match self.final_steps(&session, &mut tracked, sink, token) {
            Ok(Outcome::Completed(())) => Ok(LaunchOutcome::Completed),
            Ok(Outcome::Cancelled) => {
                if let Some(mut process) = tracked.take() {
                    process.stop();
                }
                Ok(LaunchOutcome::Cancelled)
            }
            Err(err) => {
                if let Some(mut process) = tracked.take() {
                    process.stop();
                }
                Err(err)
            }
        }
    }

    fn final_steps(
        &self,
        session: &ResolvedSession,
        tracked: &mut Option<BackOfficeProcess>,
        sink: &dyn EventSink,
        token: &CancellationToken,
    ) -> StepResult<()> {
        let probed = &session.probed;
        let app_type = session.app_type;

        // Step 5: short version used in archive and directory names.
        check_cancelled!(token);
        let version = target::format_version(&probed.info.version);
        log::info!("version '{}' formatted as '{version}'", probed.info.version);
        sink.progress(STEP_VERSION.end());

        // Step 6: local distribution directory name.
        check_cancelled!(token);
        let dir_name = self.config.local_installer_names.dir_name(app_type, &version)?;
        sink.status(
            &format!("Distribution directory: {dir_name}."),
            StatusLevel::Info,
        );
        sink.progress(STEP_DIR_NAME.end());

        // Step 7: find or fetch the distribution.
        let engine = AcquisitionEngine::with_sources(
            self.config.settings.installer_root.clone(),
            self.temp_dir.clone(),
            configured_sources(&self.config, self.config.http_timeout()),
        );
        let installer_dir = try_outcome!(engine.prepare(
            app_type,
            &version,
            &dir_name,
            sink,
            STEP_ACQUIRE,
            token
        ));

        // Step 8: remove the stale per-server cache.
        check_cancelled!(token);
        sink.status("Cleaning the application data cache...", StatusLevel::Info);
        sink.progress(STEP_CACHE.at(0.1));
        let appdata_root = match &self.appdata_root {
            Some(root) => root.clone(),
            None => appdata::appdata_root()?,
        };
        let sanitized_target = target::sanitize_for_path(&probed.target.host);
        let cache_dir = appdata::cache_dir(
            &appdata_root,
            probed.vendor,
            app_type,
            &sanitized_target,
            &probed.info.version,
        );
        appdata::clean_cache_dir(&cache_dir);
        sink.progress(STEP_CACHE.end());

        // Step 9: first run, so BackOffice writes its config file.
        check_cancelled!(token);
        sink.status("Starting BackOffice for the first time...", StatusLevel::Info);
        let process = process::spawn_backoffice(&installer_dir, &sanitized_target)?;
        *tracked = Some(process);
        sink.progress(STEP_FIRST_RUN.end());

        // Step 10: wait for the config file, stop the process, point the
        // config at the target server.
        let config_path = cache_dir.join(CLIENT_CONFIG_RELATIVE);
        try_outcome!(process::wait_for_file(
            &config_path,
            Duration::from_secs(self.config.settings.config_file_wait_timeout_sec),
            Duration::from_millis(self.config.settings.config_file_check_interval_ms),
            sink,
            STEP_CONFIG,
            token
        ));
        if let Some(mut process) = tracked.take() {
            log::info!("configuration file created, stopping the first run");
            process.stop();
        }
        // Give the process a moment to release its file handles.
        thread::sleep(Duration::from_secs(1));
        sink.status("Updating the client configuration...", StatusLevel::Info);
        client_config::rewrite_client_config(
            &config_path,
            &probed.target.host,
            probed.target.port,
            probed.target.scheme.as_str(),
            &self.config.settings.default_login,
        )?;
        sink.progress(STEP_CONFIG.end());

        // Step 11: the real start. This instance belongs to the user now,
        // so it is deliberately not tracked or stopped.
        check_cancelled!(token);
        sink.status("Restarting BackOffice...", StatusLevel::Info);
        process::spawn_backoffice(&installer_dir, &sanitized_target)?;
        sink.status("Done! BackOffice is running.", StatusLevel::Info);
        sink.progress(STEP_RESTART.end());

        Ok(Outcome::Completed(()))
    }
}

fn app_type_dialog(session: ProbedSession) -> DialogRequest {
    DialogRequest {
        kind: DialogKind::AppTypeChoice,
        title: "Choose the application type".to_string(),
        message: format!(
            "The server did not report whether it is RMS or Chain (edition '{}'). \
             Which {} application should be started?",
            session.info.edition, session.vendor
        ),
        options: vec!["RMS".to_string(), "Chain".to_string()],
        state: PausedState::AwaitingAppTypeChoice(session),
    }
}

fn server_state_dialog(session: ResolvedSession) -> DialogRequest {
    DialogRequest {
        kind: DialogKind::ServerStateConfirm,
        title: "Server is not ready".to_string(),
        message: format!(
            "The server reports state '{}' instead of '{SERVER_READY_STATE}'. \
             Continue anyway?",
            session.probed.info.server_state
        ),
        options: vec!["Yes".to_string(), "No".to_string()],
        state: PausedState::AwaitingServerConfirmation(session),
    }
}
