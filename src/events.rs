use serde::Serialize;

use crate::launcher::PausedState;
use crate::models::AppTypeChoice;

/// Severity of a status line shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Info => "info",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
        }
    }
}

/// Outward reporting surface of the launch and check flows.
///
/// Steps call this from the worker thread; the worker-side implementation
/// forwards everything over a channel and enforces progress monotonicity.
pub trait EventSink {
    /// A human-readable status line.
    fn status(&self, message: &str, level: StatusLevel);
    /// Overall progress on the 0-100 scale.
    fn progress(&self, value: f64);
    /// A multi-line text blob (raw server response, diagnostics).
    fn text(&self, blob: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    /// The server's edition did not identify RMS vs. Chain.
    AppTypeChoice,
    /// The server is not in the STARTED_SUCCESSFULLY state.
    ServerStateConfirm,
}

/// A question the sequencer needs answered before it can continue. Carries
/// the suspended session so the answer can resume exactly where the run
/// paused.
#[derive(Debug)]
pub struct DialogRequest {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
    pub options: Vec<String>,
    pub state: PausedState,
}

/// The user's reply to a `DialogRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAnswer {
    AppType(AppTypeChoice),
    Confirm(bool),
    /// The dialog was closed without choosing; treated as cancellation.
    Dismissed,
}

/// Everything a worker thread reports back to its owner.
#[derive(Debug)]
pub enum WorkerEvent {
    Status { message: String, level: StatusLevel },
    Progress(u8),
    Text(String),
    Error { message: String, detail: String },
    Dialog(DialogRequest),
    Finished,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{EventSink, StatusLevel};

    /// Sink that drops everything, for steps under test that must not care
    /// about reporting.
    pub struct NullSink;

    impl EventSink for NullSink {
        fn status(&self, _message: &str, _level: StatusLevel) {}
        fn progress(&self, _value: f64) {}
        fn text(&self, _blob: &str) {}
    }

    /// Sink that records every call for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub statuses: Mutex<Vec<(String, StatusLevel)>>,
        pub progress: Mutex<Vec<f64>>,
        pub texts: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn status(&self, message: &str, level: StatusLevel) {
            self.statuses
                .lock()
                .unwrap()
                .push((message.to_string(), level));
        }

        fn progress(&self, value: f64) {
            self.progress.lock().unwrap().push(value);
        }

        fn text(&self, blob: &str) {
            self.texts.lock().unwrap().push(blob.to_string());
        }
    }
}
