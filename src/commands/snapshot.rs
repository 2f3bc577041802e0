use serde::Serialize;

use crate::dashboard::{Dashboard, ViewState};
use crate::types::data::SourceHealth;
use crate::types::metric::DeltaMetric;
use crate::types::snapshot::Snapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    pub view: ViewState,
    pub sources: Vec<SourceHealth>,
    pub pending_updates: usize,
}

/// Latest published snapshot, if any.
pub fn snapshot_get(dashboard: &Dashboard) -> Option<Snapshot> {
    dashboard.get_snapshot().map(|snapshot| (*snapshot).clone())
}

pub fn deltas_get(dashboard: &Dashboard) -> Option<Vec<DeltaMetric>> {
    dashboard.get_deltas()
}

pub fn dashboard_status(dashboard: &Dashboard) -> DashboardStatus {
    DashboardStatus {
        view: dashboard.view_state(),
        sources: dashboard.source_health(),
        pending_updates: dashboard.scheduler().pending(),
    }
}

/// Run a refresh on behalf of a host shell.
pub async fn snapshot_refresh(dashboard: &Dashboard) -> Result<Snapshot, String> {
    dashboard
        .refresh()
        .await
        .map(|snapshot| (*snapshot).clone())
        .map_err(|e| e.to_string())
}
