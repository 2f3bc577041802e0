//! Orchestration shell: runs aggregations, publishes snapshots, computes the
//! visit deltas once per session and feeds visual updates to the scheduler.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::adapters::field_claims;
use crate::aggregator::{AggregateError, Aggregation, Aggregator};
use crate::clock::Clock;
use crate::commands::sources;
use crate::db::DbPool;
use crate::delta::compute_deltas;
use crate::scheduler::{AnimationTask, RenderScheduler, RenderSink, TaskHandle};
use crate::store::{SnapshotStore, VisitMarker};
use crate::types::config::PipelineConfig;
use crate::types::data::SourceHealth;
use crate::types::metric::DeltaMetric;
use crate::types::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ViewState {
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("every source failed")]
    NoData,
}

struct DashboardState {
    started: bool,
    snapshot: Option<Arc<Snapshot>>,
    deltas: Option<Vec<DeltaMetric>>,
    view: ViewState,
    /// Marker as read at session start; consumed by the first successful refresh.
    session_marker: Option<VisitMarker>,
    deltas_done: bool,
    health: Vec<SourceHealth>,
}

pub struct Dashboard {
    aggregator: Aggregator,
    store: SnapshotStore,
    scheduler: RenderScheduler,
    sink: Arc<dyn RenderSink>,
    clock: Arc<dyn Clock>,
    animation: Duration,
    poll_interval: Duration,
    health_pool: Option<DbPool>,
    state: Mutex<DashboardState>,
}

impl Dashboard {
    pub fn new(
        aggregator: Aggregator,
        store: SnapshotStore,
        sink: Arc<dyn RenderSink>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        let health = field_claims()
            .into_iter()
            .map(|(source, _)| SourceHealth::new(source))
            .collect();
        Self {
            aggregator,
            store,
            scheduler: RenderScheduler::new(),
            sink,
            clock,
            animation: config.animation(),
            poll_interval: config.poll_interval(),
            health_pool: None,
            state: Mutex::new(DashboardState {
                started: false,
                snapshot: None,
                deltas: None,
                view: ViewState::Loading,
                session_marker: None,
                deltas_done: false,
                health,
            }),
        }
    }

    /// Persist source health to `pool` after every refresh, seeded from what
    /// is already stored there.
    pub fn with_health_pool(mut self, pool: DbPool) -> Self {
        match sources::sources_health_db(&pool) {
            Ok(stored) => {
                let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
                for entry in state.health.iter_mut() {
                    if let Some(previous) = stored.get(&entry.source_id) {
                        *entry = previous.clone();
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to load stored source health"),
        }
        self.health_pool = Some(pool);
        self
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Show the cached snapshot if it is still fresh and read the visit
    /// marker for this session. Later calls do nothing.
    pub fn start(&self) {
        let cached = {
            let mut state = self.lock();
            if std::mem::replace(&mut state.started, true) {
                return;
            }
            state.session_marker = self.store.load_visit_marker();
            let cached = self.store.load().map(Arc::new);
            if let Some(snapshot) = &cached {
                state.snapshot = Some(snapshot.clone());
                state.view = ViewState::Ready;
            }
            cached
        };
        match cached {
            Some(snapshot) => {
                info!("Showing cached snapshot");
                self.render_all(&snapshot);
            }
            None => debug!("No fresh cached snapshot"),
        }
    }

    /// Run one aggregation and publish the result.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, RefreshError> {
        self.start();
        let run = match self.aggregator.aggregate().await {
            Ok(run) => run,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.record_health(&run);
        if run.failed_sources().count() == run.sources.len() {
            return Err(self.fail(RefreshError::NoData));
        }

        let next = Arc::new(run.snapshot);
        self.store.save(&next);

        let (previous, marker) = {
            let mut state = self.lock();
            let previous = state.snapshot.replace(next.clone());
            state.view = ViewState::Ready;
            let marker = if std::mem::replace(&mut state.deltas_done, true) {
                None
            } else {
                Some(state.session_marker.take())
            };
            (previous, marker)
        };

        if let Some(marker) = marker {
            let deltas = compute_deltas(
                &next,
                marker.as_ref(),
                self.clock.now_ms(),
                self.store.min_gap(),
            );
            debug!(count = deltas.as_ref().map(Vec::len), "Computed visit deltas");
            self.lock().deltas = deltas;
            self.store.save_visit_marker(&next);
        }

        match previous {
            Some(previous) => self.animate_changes(&previous, &next),
            None => self.render_all(&next),
        }
        Ok(next)
    }

    /// Refresh every poll interval until `shutdown` turns true or its sender
    /// is dropped. Pending visual updates are dropped on the way out.
    pub async fn poll(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.poll_interval.as_secs(), "Polling started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let dropped = self.scheduler.clear();
        info!(dropped, "Polling stopped");
    }

    pub fn get_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.lock().snapshot.clone()
    }

    pub fn get_deltas(&self) -> Option<Vec<DeltaMetric>> {
        self.lock().deltas.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.lock().view.clone()
    }

    pub fn source_health(&self) -> Vec<SourceHealth> {
        self.lock().health.clone()
    }

    pub fn enqueue_visual_update(&self, task: AnimationTask) -> TaskHandle {
        self.scheduler.enqueue(task)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail(&self, err: RefreshError) -> RefreshError {
        error!(error = %err, "Refresh failed");
        let mut state = self.lock();
        if state.snapshot.is_none() {
            state.view = ViewState::Error(err.to_string());
        }
        err
    }

    fn record_health(&self, run: &Aggregation) {
        let health = {
            let mut state = self.lock();
            for outcome in &run.sources {
                let Some(entry) = state.health.iter_mut().find(|h| h.source_id == outcome.source)
                else {
                    continue;
                };
                match &outcome.error {
                    None => entry.record_success(run.finished_at, outcome.latency_ms),
                    Some(reason) => {
                        entry.record_failure(run.finished_at, outcome.latency_ms, reason)
                    }
                }
            }
            state.health.clone()
        };
        if let Some(pool) = &self.health_pool {
            if let Err(e) = sources::sources_health_save_all(pool, &health) {
                warn!(error = %e, "Failed to persist source health");
            }
        }
    }

    fn render_all(&self, snapshot: &Snapshot) {
        for field in Snapshot::FIELDS {
            let Some(text) = snapshot.rendered(field) else {
                continue;
            };
            if let Err(e) = self.sink.apply(field, &text) {
                warn!(field, error = %e, "Render failed");
            }
        }
    }

    fn animate_changes(&self, previous: &Snapshot, next: &Snapshot) {
        let changed = previous.changed_fields(next);
        debug!(changed = changed.len(), "Animating changed fields");
        for field in changed {
            let Some(text) = next.rendered(field) else {
                continue;
            };
            self.scheduler
                .enqueue(AnimationTask::flip(self.sink.clone(), field, text, self.animation));
        }
    }
}
