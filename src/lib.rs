//! Core of the BackOffice launcher: resolves a target server address,
//! probes its monitoring endpoint, acquires the matching distribution from
//! SMB, HTTP or FTP sources, prepares the per-server cache and drives the
//! two-phase first-run / reconfigure / restart sequence.
//!
//! The crate is UI-agnostic. A frontend hands a target string to
//! [`LaunchController`], consumes [`WorkerEvent`]s from the returned handle
//! and answers [`DialogRequest`]s by resuming the carried [`PausedState`].

pub mod acquire;
pub mod appdata;
pub mod cancel;
pub mod client_config;
pub mod config;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod launcher;
pub mod metadata;
pub mod models;
pub mod probe;
pub mod process;
pub mod progress;
pub mod sources;
pub mod target;
pub mod worker;

pub use cancel::{CancellationToken, Outcome, StepResult};
pub use config::AppConfig;
pub use error::LaunchError;
pub use events::{DialogAnswer, DialogKind, DialogRequest, EventSink, StatusLevel, WorkerEvent};
pub use launcher::{LaunchOutcome, Launcher, PausedState};
pub use progress::ProgressSpan;
pub use worker::{LaunchController, SpawnError, WorkerHandle};
