use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::event::RouteKey;
use crate::window::MetricsSnapshot;

const CONFIDENCE_STEP: f64 = 0.05;
const CONFIDENCE_MIN: f64 = 0.1;
const CONFIDENCE_MAX: f64 = 1.0;

/// Per-route learned trust. Confidence moves slowly: one small step per
/// observed tick-over-tick outcome, clamped to [0.1, 1.0].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    pub confidence: f64,
    pub times_seen: u64,
}

impl Default for ConfidenceRecord {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            times_seen: 0,
        }
    }
}

/// Durable route -> confidence map. Loaded once at startup; every mutation
/// rewrites the whole file (temp file + rename, so a reader never observes
/// a partial write). Write failures are logged and swallowed: confidence
/// durability is best-effort and must never abort a control tick.
pub struct ConfidenceStore {
    path: PathBuf,
    records: BTreeMap<String, ConfidenceRecord>,
}

impl ConfidenceStore {
    /// Load from `path`; a missing or unreadable file starts an empty map.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(err) => {
                    warn!(path = %path.display(), %err, "confidence store unparseable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no confidence store yet, starting empty");
                BTreeMap::new()
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "confidence store unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, records }
    }

    /// Fetch the record for a route, creating (and persisting) the default
    /// on first reference. Records are never deleted.
    pub fn get(&mut self, route: &RouteKey) -> ConfidenceRecord {
        let key = route.memory_key();
        if let Some(record) = self.records.get(&key) {
            return record.clone();
        }
        let record = ConfidenceRecord::default();
        self.records.insert(key, record.clone());
        self.persist();
        record
    }

    /// One learning step: bump confidence on improvement, decay otherwise,
    /// and write through.
    pub fn record_outcome(&mut self, route: &RouteKey, improved: bool) {
        let record = self
            .records
            .entry(route.memory_key())
            .or_default();
        record.times_seen += 1;
        record.confidence = if improved {
            (record.confidence + CONFIDENCE_STEP).min(CONFIDENCE_MAX)
        } else {
            (record.confidence - CONFIDENCE_STEP).max(CONFIDENCE_MIN)
        };
        self.persist();
    }

    /// Compare two successive snapshots and learn from every route present
    /// in both. Routes with no previous baseline are skipped; they get one
    /// on the next tick.
    pub fn update_from_snapshots(
        &mut self,
        previous: &MetricsSnapshot,
        current: &MetricsSnapshot,
    ) {
        for (route, now) in current {
            if let Some(prev) = previous.get(route) {
                self.record_outcome(route, now.success_rate > prev.success_rate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) {
        if let Err(err) = self.try_persist() {
            error!(path = %self.path.display(), %err, "confidence store write failed");
        }
    }

    fn try_persist(&self) -> Result<()> {
        atomic_write_json(&self.path, &self.records)
    }
}

/// Serialize `value` and replace `path` in one rename, so concurrent readers
/// always see a complete document.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing snapshot")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::RouteMetrics;

    fn store_in(dir: &tempfile::TempDir) -> ConfidenceStore {
        ConfidenceStore::load(dir.path().join("memory.json"))
    }

    fn snapshot_with(rate: f64) -> MetricsSnapshot {
        std::iter::once((
            RouteKey::new("HDFC", "VISA"),
            RouteMetrics {
                total: 10,
                success_rate: rate,
                failure_rate: 1.0 - rate,
                avg_latency_ms: 500.0,
                error_code_histogram: BTreeMap::new(),
            },
        ))
        .collect()
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
    }

    #[test]
    fn get_creates_and_persists_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let route = RouteKey::new("HDFC", "VISA");
        assert_eq!(store.get(&route), ConfidenceRecord::default());

        let reloaded = ConfidenceStore::load(dir.path().join("memory.json"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn outcome_steps_up_then_back_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let route = RouteKey::new("HDFC", "VISA");

        store.record_outcome(&route, true);
        let record = store.get(&route);
        assert_eq!(record.confidence, 0.55);
        assert_eq!(record.times_seen, 1);

        store.record_outcome(&route, false);
        let record = store.get(&route);
        assert_eq!(record.confidence, 0.5);
        assert_eq!(record.times_seen, 2);
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let route = RouteKey::new("SBI", "RUPAY");

        for _ in 0..50 {
            store.record_outcome(&route, false);
        }
        assert_eq!(store.get(&route).confidence, 0.1);

        for _ in 0..50 {
            store.record_outcome(&route, true);
        }
        assert_eq!(store.get(&route).confidence, 1.0);
        assert_eq!(store.get(&route).times_seen, 100);
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let route = RouteKey::new("AXIS", "VISA");

        let mut store = ConfidenceStore::load(&path);
        store.record_outcome(&route, true);
        drop(store);

        let mut reloaded = ConfidenceStore::load(&path);
        let record = reloaded.get(&route);
        assert_eq!(record.confidence, 0.55);
        assert_eq!(record.times_seen, 1);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        fs::write(&path, "{not json").unwrap();
        let store = ConfidenceStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_comparison_learns_direction() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let route = RouteKey::new("HDFC", "VISA");

        store.update_from_snapshots(&snapshot_with(0.8), &snapshot_with(0.9));
        assert_eq!(store.get(&route).confidence, 0.55);

        store.update_from_snapshots(&snapshot_with(0.9), &snapshot_with(0.85));
        assert_eq!(store.get(&route).confidence, 0.5);
    }

    #[test]
    fn routes_without_baseline_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store.update_from_snapshots(&MetricsSnapshot::new(), &snapshot_with(0.9));
        assert!(store.is_empty());
    }
}
