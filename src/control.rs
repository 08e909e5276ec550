use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::actions::ActionController;
use crate::config::Config;
use crate::event::RouteKey;
use crate::exporter::SnapshotExporter;
use crate::hypothesis::{analyze, Hypothesis};
use crate::memory::ConfidenceStore;
use crate::routing::RoutingSurface;
use crate::window::{MetricsSnapshot, WindowedAggregator};

/// Orchestrates one detection-decision-mitigation-learning pass per tick.
/// Ticks run strictly sequentially; the only state shared with the
/// ingestion task is the aggregator's window.
pub struct ControlLoop {
    aggregator: Arc<WindowedAggregator>,
    controller: ActionController,
    memory: ConfidenceStore,
    exporter: SnapshotExporter,
    last_snapshot: Option<MetricsSnapshot>,
    tick_period: Duration,
}

impl ControlLoop {
    pub fn new(
        aggregator: Arc<WindowedAggregator>,
        routing: Arc<RoutingSurface>,
        memory: ConfidenceStore,
        exporter: SnapshotExporter,
        config: &Config,
    ) -> Self {
        Self {
            aggregator,
            controller: ActionController::new(
                routing,
                config.max_shift,
                Duration::from_secs(config.action_duration_seconds),
            ),
            memory,
            exporter,
            last_snapshot: None,
            tick_period: Duration::from_secs(config.tick_seconds),
        }
    }

    /// One full pass at time `now`: snapshot, score, act, expire, export,
    /// learn. Returns the hypotheses produced this tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Hypothesis> {
        let snapshot = self.aggregator.snapshot();

        for (route, m) in &snapshot {
            info!(
                route = %route,
                total = m.total,
                success_rate = m.success_rate,
                avg_latency_ms = m.avg_latency_ms,
                "route health"
            );
        }

        let memory = &mut self.memory;
        let hypotheses = analyze(&snapshot, |route| memory.get(route).confidence);

        for h in &hypotheses {
            info!(
                route = %h.route,
                probability = h.probability,
                impact_percent = h.impact_percent,
                action = ?h.suggested_action,
                "degradation hypothesis"
            );
            self.controller.apply(h, now);
        }

        let restored = self.controller.expire_elapsed(now);
        if !restored.is_empty() {
            debug!(count = restored.len(), "mitigations rolled back this tick");
        }

        self.exporter.export_metrics(&snapshot);
        self.exporter.export_decisions(&hypotheses);

        if let Some(previous) = &self.last_snapshot {
            self.memory.update_from_snapshots(previous, &snapshot);
        }
        self.last_snapshot = Some(snapshot);

        hypotheses
    }

    /// Run forever on a fixed cadence. Missed ticks are skipped rather than
    /// bunched, so ticks never overlap.
    pub async fn run(mut self) {
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_seconds = self.tick_period.as_secs(), "control loop started");

        loop {
            ticker.tick().await;
            self.tick(Utc::now());
        }
    }

    pub fn mitigation_active(&self, route: &RouteKey) -> bool {
        self.controller.is_active(route)
    }

    pub fn active_mitigations(&self) -> usize {
        self.controller.active_count()
    }

    pub fn learned_routes(&self) -> usize {
        self.memory.len()
    }
}
