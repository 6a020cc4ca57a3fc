//! Single-flight front door for data refreshes.
//!
//! At most one script runs at a time. With [`ConcurrencyPolicy::Join`] a
//! request that arrives mid-run waits for and receives the in-flight result;
//! with [`ConcurrencyPolicy::Reject`] it fails fast with
//! [`RefreshError::AlreadyRunning`].
//!
//! When the service knows the chart configuration, a successful run
//! re-renders the charts before its result is handed out, so a page reload
//! after the response sees the new data.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::launcher::{Launcher, ProcessLauncher, ScriptCommand};
use super::supervisor::supervise;
use super::{RefreshError, RefreshReport, SharedResult};
use crate::charts;
use crate::config::{ChartsConfig, ConcurrencyPolicy, RefreshConfig};

type InFlight = Shared<BoxFuture<'static, SharedResult>>;

/// Runtime settings for the refresh service.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub interpreter: String,
    pub script: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub concurrency: ConcurrencyPolicy,
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
            working_dir: config.working_dir.clone(),
            timeout: config.timeout(),
            concurrency: config.concurrency,
        }
    }
}

/// Snapshot served by `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
}

#[derive(Clone)]
pub struct RefreshService {
    inner: Arc<Inner>,
}

struct Inner {
    launcher: Arc<dyn Launcher>,
    settings: RefreshSettings,
    charts: OnceLock<Arc<ChartsConfig>>,
    inflight: Mutex<Option<InFlight>>,
    history: RwLock<History>,
}

#[derive(Default)]
struct History {
    last_report: Option<RefreshReport>,
    last_success: Option<DateTime<Utc>>,
}

impl RefreshService {
    pub fn new(settings: RefreshSettings) -> Self {
        Self::with_launcher(settings, Arc::new(ProcessLauncher))
    }

    pub fn with_launcher(settings: RefreshSettings, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                settings,
                charts: OnceLock::new(),
                inflight: Mutex::new(None),
                history: RwLock::new(History::default()),
            }),
        }
    }

    /// Re-render the charts described by `charts` after every successful run.
    ///
    /// Shared by every clone of the service. Only the first configuration
    /// sticks.
    pub fn with_charts(self, charts: Arc<ChartsConfig>) -> Self {
        if self.inner.charts.set(charts).is_err() {
            debug!("chart regeneration already configured");
        }
        self
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    /// Start a refresh, or attach to the one already running.
    pub async fn trigger(&self) -> SharedResult {
        let run = {
            let mut slot = self
                .inner
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) => match self.inner.settings.concurrency {
                    ConcurrencyPolicy::Join => {
                        debug!("joining in-flight data refresh");
                        existing.clone()
                    }
                    ConcurrencyPolicy::Reject => {
                        info!("rejecting data refresh, one is already running");
                        return Err(Arc::new(RefreshError::AlreadyRunning));
                    }
                },
                None => {
                    let run = self.start().boxed().shared();
                    *slot = Some(run.clone());
                    run
                }
            }
        };
        run.await
    }

    /// Spawn the supervised run on its own task so it outlives any caller.
    fn start(&self) -> impl std::future::Future<Output = SharedResult> + Send + 'static {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let _slot = ClearSlot(&inner.inflight);
            let result = inner.run_once().await;
            if matches!(&result, Ok(report) if report.outcome.is_success()) {
                inner.render_charts().await;
            }
            inner.finish(&result);
            result
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "data refresh task aborted");
                    Err(Arc::new(RefreshError::Abandoned))
                }
            }
        }
    }

    pub fn status(&self) -> RefreshStatus {
        let running = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        let history = self
            .inner
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        RefreshStatus {
            running,
            last_success: history.last_success,
            last_outcome: history
                .last_report
                .as_ref()
                .map(|r| r.outcome.label().to_string()),
        }
    }

    pub fn last_report(&self) -> Option<RefreshReport> {
        self.inner
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_report
            .clone()
    }
}

impl Inner {
    async fn run_once(&self) -> SharedResult {
        let command = ScriptCommand::resolve(
            &self.settings.interpreter,
            &self.settings.script,
            self.settings.working_dir.as_deref(),
        )
        .map_err(Arc::new)?;
        supervise(self.launcher.as_ref(), &command, self.settings.timeout)
            .await
            .map_err(Arc::new)
    }

    fn finish(&self, result: &SharedResult) {
        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            if let Ok(report) = result {
                if report.outcome.is_success() {
                    history.last_success = Some(report.finished_at);
                }
                history.last_report = Some(report.clone());
            }
        }
        if let Err(e) = result {
            error!(error = %e, "data refresh could not run");
        }
    }

    /// Regenerate every chart from the freshly written data files.
    async fn render_charts(&self) {
        let Some(config) = self.charts.get().cloned() else {
            return;
        };
        match tokio::task::spawn_blocking(move || charts::generate_all(&config)).await {
            Ok(Ok(report)) => info!(
                rendered = report.count("rendered"),
                no_data = report.count("no_data"),
                failed = report.count("failed"),
                "charts regenerated after refresh"
            ),
            Ok(Err(e)) => warn!(error = %e, "chart regeneration failed"),
            Err(e) => error!(error = %e, "chart regeneration task aborted"),
        }
    }
}

/// Empties the in-flight slot when the run task ends, panics included.
struct ClearSlot<'a>(&'a Mutex<Option<InFlight>>);

impl Drop for ClearSlot<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
