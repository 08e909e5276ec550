use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::error;

use crate::hypothesis::Hypothesis;
use crate::memory::atomic_write_json;
use crate::window::MetricsSnapshot;

/// Publishes the per-tick metrics and decision snapshots for external
/// consumers (dashboards). Whole-file replacement on every tick; a reader
/// always sees one complete, consistent document. Failures are logged and
/// never abort the tick.
pub struct SnapshotExporter {
    metrics_path: PathBuf,
    decisions_path: PathBuf,
}

impl SnapshotExporter {
    pub fn new(metrics_path: impl Into<PathBuf>, decisions_path: impl Into<PathBuf>) -> Self {
        Self {
            metrics_path: metrics_path.into(),
            decisions_path: decisions_path.into(),
        }
    }

    /// Write the latest route metrics keyed by "bank-card".
    pub fn export_metrics(&self, snapshot: &MetricsSnapshot) {
        let keyed: BTreeMap<String, _> = snapshot
            .iter()
            .map(|(route, metrics)| (route.dash_key(), metrics))
            .collect();
        if let Err(err) = atomic_write_json(&self.metrics_path, &keyed) {
            error!(path = %self.metrics_path.display(), %err, "metrics export failed");
        }
    }

    /// Write the latest hypothesis list.
    pub fn export_decisions(&self, hypotheses: &[Hypothesis]) {
        if let Err(err) = atomic_write_json(&self.decisions_path, &hypotheses) {
            error!(path = %self.decisions_path.display(), %err, "decisions export failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RouteKey;
    use crate::hypothesis::SuggestedAction;
    use crate::window::RouteMetrics;

    #[test]
    fn metrics_export_is_keyed_by_dash_route() {
        let dir = tempfile::tempdir().unwrap();
        let metrics_path = dir.path().join("live_metrics.json");
        let exporter = SnapshotExporter::new(&metrics_path, dir.path().join("live_decisions.json"));

        let snapshot: MetricsSnapshot = std::iter::once((
            RouteKey::new("HDFC", "VISA"),
            RouteMetrics {
                total: 12,
                success_rate: 0.75,
                failure_rate: 0.25,
                avg_latency_ms: 812.3,
                error_code_histogram: BTreeMap::from([("timeout".to_string(), 3)]),
            },
        ))
        .collect();

        exporter.export_metrics(&snapshot);

        let raw = std::fs::read_to_string(&metrics_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["HDFC-VISA"]["total"], 12);
        assert_eq!(value["HDFC-VISA"]["success_rate"], 0.75);
        assert_eq!(value["HDFC-VISA"]["error_code_histogram"]["timeout"], 3);
    }

    #[test]
    fn decisions_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let decisions_path = dir.path().join("live_decisions.json");
        let exporter = SnapshotExporter::new(dir.path().join("live_metrics.json"), &decisions_path);

        let hypotheses = vec![Hypothesis {
            route: RouteKey::new("SBI", "RUPAY"),
            probability: 0.85,
            impact_percent: 20.0,
            avg_latency_ms: 1600.0,
            error_code_histogram: BTreeMap::new(),
            suggested_action: SuggestedAction::PartialReroute,
        }];
        exporter.export_decisions(&hypotheses);

        let raw = std::fs::read_to_string(&decisions_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["bank"], "SBI");
        assert_eq!(value[0]["suggested_action"], "partial_reroute");
    }

    #[test]
    fn export_failure_does_not_panic() {
        let exporter = SnapshotExporter::new("/nonexistent-dir/m.json", "/nonexistent-dir/d.json");
        exporter.export_metrics(&MetricsSnapshot::new());
        exporter.export_decisions(&[]);
    }
}
