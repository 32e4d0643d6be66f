use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::cancel::{CancellationToken, Outcome};
use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::events::{DialogAnswer, EventSink, StatusLevel, WorkerEvent};
use crate::launcher::{LaunchOutcome, Launcher, PausedState};

/// Event sink that forwards to a channel and enforces progress monotonicity.
///
/// Steps report progress as floats inside their spans; the sink rounds to
/// the 0-100 integer scale and emits only strictly increasing values, so
/// nested spans and repeated boundary reports cannot make the bar jump
/// backwards.
pub struct WorkerSink {
    tx: Sender<WorkerEvent>,
    max: AtomicU8,
}

impl WorkerSink {
    fn new(tx: Sender<WorkerEvent>) -> Self {
        Self {
            tx,
            max: AtomicU8::new(0),
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // The receiver hanging up just means nobody is watching anymore.
        if let Err(err) = self.tx.send(event) {
            log::debug!("event receiver is gone: {err}");
        }
    }

    /// Drops the bar back to zero after a cancellation or an error.
    fn reset_progress(&self) {
        self.max.store(0, Ordering::SeqCst);
        self.emit(WorkerEvent::Progress(0));
    }
}

impl EventSink for WorkerSink {
    fn status(&self, message: &str, level: StatusLevel) {
        self.emit(WorkerEvent::Status {
            message: message.to_string(),
            level,
        });
    }

    fn progress(&self, value: f64) {
        let value = value.clamp(0.0, 100.0).round() as u8;
        let previous = self.max.fetch_max(value, Ordering::SeqCst);
        if value > previous {
            self.emit(WorkerEvent::Progress(value));
        }
    }

    fn text(&self, blob: &str) {
        self.emit(WorkerEvent::Text(blob.to_string()));
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("another operation is already running")]
    Busy,
    #[error("failed to start worker thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Clears the busy flag when the worker finishes, however it finishes.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a running worker: the event stream, its cancellation token and
/// the join handle.
pub struct WorkerHandle {
    events: Receiver<WorkerEvent>,
    token: CancellationToken,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            log::error!("worker thread panicked");
        }
    }
}

/// Owns the configuration and runs launch, resume and check flows on a
/// background thread, one at a time.
pub struct LaunchController {
    config: AppConfig,
    busy: Arc<AtomicBool>,
}

impl LaunchController {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> Result<BusyGuard, SpawnError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SpawnError::Busy);
        }
        Ok(BusyGuard(Arc::clone(&self.busy)))
    }

    /// Starts the full launch sequence for a raw target string.
    pub fn spawn_launch(&self, target: String) -> Result<WorkerHandle, SpawnError> {
        self.spawn(move |launcher, sink, token| launcher.run(&target, sink, token))
    }

    /// Continues a suspended launch with the user's dialog answer.
    pub fn spawn_resume(
        &self,
        state: PausedState,
        answer: DialogAnswer,
    ) -> Result<WorkerHandle, SpawnError> {
        self.spawn(move |launcher, sink, token| launcher.resume(state, answer, sink, token))
    }

    /// Probes the target server and reports its raw monitoring response.
    pub fn spawn_check(&self, target: String) -> Result<WorkerHandle, SpawnError> {
        self.spawn(move |launcher, sink, token| {
            let outcome = launcher.check(&target, sink, token)?;
            Ok(match outcome {
                Outcome::Completed(value) => {
                    let pretty = serde_json::to_string_pretty(&value)
                        .unwrap_or_else(|_| value.to_string());
                    sink.text(&pretty);
                    sink.status("Server check finished.", StatusLevel::Info);
                    sink.progress(100.0);
                    LaunchOutcome::Completed
                }
                Outcome::Cancelled => LaunchOutcome::Cancelled,
            })
        })
    }

    fn spawn<F>(&self, job: F) -> Result<WorkerHandle, SpawnError>
    where
        F: FnOnce(&Launcher, &WorkerSink, &CancellationToken) -> Result<LaunchOutcome, LaunchError>
            + Send
            + 'static,
    {
        let guard = self.try_acquire()?;
        let (tx, rx) = mpsc::channel();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let launcher = Launcher::new(self.config.clone());

        let thread = thread::Builder::new()
            .name("launch-worker".to_string())
            .spawn(move || {
                let _guard = guard;
                let sink = WorkerSink::new(tx);
                match job(&launcher, &sink, &worker_token) {
                    Ok(LaunchOutcome::Completed) => {}
                    Ok(LaunchOutcome::Cancelled) => {
                        sink.reset_progress();
                        sink.status("Operation cancelled.", StatusLevel::Info);
                    }
                    Ok(LaunchOutcome::Suspended(request)) => {
                        sink.emit(WorkerEvent::Dialog(request));
                    }
                    Err(err) => {
                        log::error!("worker failed: {}", err.detail());
                        sink.reset_progress();
                        sink.status(&err.to_string(), StatusLevel::Error);
                        sink.emit(WorkerEvent::Error {
                            message: err.to_string(),
                            detail: err.detail(),
                        });
                    }
                }
                sink.emit(WorkerEvent::Finished);
            })?;

        Ok(WorkerHandle {
            events: rx,
            token,
            thread,
        })
    }
}
