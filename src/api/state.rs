use std::sync::Arc;

use crate::config::ChartsConfig;
use crate::refresh::RefreshService;

#[derive(Clone)]
pub struct AppState {
    pub refresh: RefreshService,
    pub charts: Arc<ChartsConfig>,
}

impl AppState {
    /// Successful refreshes re-render the charts served from `charts.output_dir`.
    pub fn new(refresh: RefreshService, charts: ChartsConfig) -> Self {
        let charts = Arc::new(charts);
        Self {
            refresh: refresh.with_charts(charts.clone()),
            charts,
        }
    }
}
