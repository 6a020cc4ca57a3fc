//! Data refresh: run the external data-generation script under supervision.
//!
//! One request maps to one [`run::RefreshRun`]. The child process exit and a
//! wall-clock timer race through a [`settle::Settlement`] gate so exactly one
//! [`RefreshOutcome`] is produced. [`service::RefreshService`] adds the
//! single-flight layer on top so overlapping requests never start a second
//! script.

pub mod launcher;
pub mod run;
pub mod service;
pub mod settle;
pub mod supervisor;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use self::launcher::{Launcher, ProcessLauncher, ScriptChild, ScriptCommand, ScriptExit};
pub use self::service::{RefreshService, RefreshSettings, RefreshStatus};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("data update already in progress")]
    AlreadyRunning,

    #[error("refresh run ended without an outcome")]
    Abandoned,
}

/// Result shared between every caller attached to one run.
pub type SharedResult = Result<RefreshReport, Arc<RefreshError>>;

/// Terminal outcome of one script run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Exited with status 0 before the deadline.
    Succeeded { stdout: String },
    /// Exited non-zero (or could not be waited on) before the deadline.
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Deadline passed first; the child was killed.
    TimedOut {
        after_secs: u64,
        partial_stdout: String,
        partial_stderr: String,
    },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Succeeded { .. })
    }

    /// Short name used in logs and the status endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Succeeded { .. } => "succeeded",
            RefreshOutcome::Failed { .. } => "failed",
            RefreshOutcome::TimedOut { .. } => "timed_out",
        }
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RefreshOutcome,
}

impl RefreshReport {
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
