use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};

use crate::event::{PaymentEvent, PaymentStatus, RouteKey};

/// Per-route aggregate over the current window. Recomputed from scratch on
/// every snapshot; valid only at computation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub total: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub avg_latency_ms: f64,
    pub error_code_histogram: BTreeMap<String, u64>,
}

/// A snapshot of every route with at least one retained event.
pub type MetricsSnapshot = BTreeMap<RouteKey, RouteMetrics>;

struct StampedEvent {
    at: DateTime<Utc>,
    event: PaymentEvent,
}

struct EventWindow {
    events: VecDeque<StampedEvent>,
    span: Duration,
}

impl EventWindow {
    fn push(&mut self, at: DateTime<Utc>, event: PaymentEvent) {
        if let Some(back) = self.events.back() {
            if at < back.at {
                debug!(
                    route = %event.route(),
                    "event timestamp went backwards; window bound is relative to newest retained event"
                );
            }
        }
        self.events.push_back(StampedEvent { at, event });
        self.prune();
    }

    /// Evict from the front everything older than the newest retained event
    /// minus the window span. Front-only eviction assumes timestamps arrive
    /// roughly in order.
    fn prune(&mut self) {
        let newest = match self.events.back() {
            Some(e) => e.at,
            None => return,
        };
        let cutoff = newest - chrono::Duration::from_std(self.span).unwrap_or_else(|_| chrono::Duration::zero());
        while let Some(front) = self.events.front() {
            if front.at < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Trailing time-window aggregator over the raw transaction stream. The
/// window is the only state shared between the ingestion task and the
/// control tick, so it lives behind a single mutex.
pub struct WindowedAggregator {
    inner: Mutex<EventWindow>,
}

impl WindowedAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Mutex::new(EventWindow {
                events: VecDeque::new(),
                span: window,
            }),
        }
    }

    /// Append one event and evict everything that fell out of the window.
    /// Events with an unparseable timestamp are dropped, never fatal.
    /// Returns whether the event was retained.
    pub fn ingest(&self, event: PaymentEvent) -> bool {
        let at = match event.parsed_timestamp() {
            Some(at) => at,
            None => {
                warn!(
                    payment_id = %event.payment_id,
                    timestamp = %event.timestamp,
                    "dropping event with unparseable timestamp"
                );
                return false;
            }
        };
        self.inner.lock().push(at, event);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group the retained events by route and compute the per-route
    /// aggregates. Pure read of the current window; recomputing fully each
    /// time keeps eviction trivially correct and the window is small.
    pub fn snapshot(&self) -> MetricsSnapshot {
        struct Acc {
            total: u64,
            success: u64,
            fail: u64,
            latency_sum: u64,
            errors: BTreeMap<String, u64>,
        }

        let inner = self.inner.lock();
        let mut stats: BTreeMap<RouteKey, Acc> = BTreeMap::new();

        for stamped in &inner.events {
            let e = &stamped.event;
            let acc = stats.entry(e.route()).or_insert_with(|| Acc {
                total: 0,
                success: 0,
                fail: 0,
                latency_sum: 0,
                errors: BTreeMap::new(),
            });

            acc.total += 1;
            acc.latency_sum += e.latency_ms;

            match e.status {
                PaymentStatus::Success => acc.success += 1,
                PaymentStatus::Fail => {
                    acc.fail += 1;
                    let code = e.error_code.clone().unwrap_or_else(|| "unknown".to_string());
                    *acc.errors.entry(code).or_insert(0) += 1;
                }
            }
        }

        stats
            .into_iter()
            .map(|(route, acc)| {
                let total = acc.total as f64;
                let metrics = RouteMetrics {
                    total: acc.total,
                    success_rate: round_to(acc.success as f64 / total, 3),
                    failure_rate: round_to(acc.fail as f64 / total, 3),
                    avg_latency_ms: round_to(acc.latency_sum as f64 / total, 1),
                    error_code_histogram: acc.errors,
                };
                (route, metrics)
            })
            .collect()
    }

    /// True iff every retained event is within the window span of the
    /// newest retained event. Exposed for invariant checks in tests.
    pub fn window_bound_holds(&self) -> bool {
        let inner = self.inner.lock();
        let newest = match inner.events.back() {
            Some(e) => e.at,
            None => return true,
        };
        let span = chrono::Duration::from_std(inner.span).unwrap_or_else(|_| chrono::Duration::zero());
        inner.events.iter().all(|e| newest - e.at <= span)
    }
}

pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(secs: i64, bank: &str, card: &str, status: PaymentStatus, latency: u64) -> PaymentEvent {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        PaymentEvent {
            payment_id: format!("p-{secs}-{bank}-{card}"),
            timestamp: ts.to_rfc3339(),
            bank: bank.to_string(),
            card: card.to_string(),
            amount: 100.0,
            latency_ms: latency,
            status,
            error_code: match status {
                PaymentStatus::Fail => Some("timeout".to_string()),
                PaymentStatus::Success => None,
            },
        }
    }

    #[test]
    fn window_bound_holds_after_every_ingest() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        for secs in (0..300).step_by(7) {
            agg.ingest(event_at(secs, "HDFC", "VISA", PaymentStatus::Success, 400));
            assert!(agg.window_bound_holds());
        }
        // The last event landed at t=294; nothing older than t=234 survives.
        assert!(agg.len() <= 60 / 7 + 1);
    }

    #[test]
    fn old_events_evicted_from_front() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        agg.ingest(event_at(0, "SBI", "VISA", PaymentStatus::Success, 300));
        agg.ingest(event_at(30, "SBI", "VISA", PaymentStatus::Success, 300));
        assert_eq!(agg.len(), 2);
        agg.ingest(event_at(100, "SBI", "VISA", PaymentStatus::Success, 300));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn malformed_timestamp_dropped_without_panic() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        let mut bad = event_at(0, "AXIS", "RUPAY", PaymentStatus::Success, 300);
        bad.timestamp = "garbage".to_string();
        assert!(!agg.ingest(bad));
        assert!(agg.is_empty());
    }

    #[test]
    fn snapshot_math_and_rounding() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        agg.ingest(event_at(0, "HDFC", "VISA", PaymentStatus::Success, 400));
        agg.ingest(event_at(1, "HDFC", "VISA", PaymentStatus::Success, 500));
        agg.ingest(event_at(2, "HDFC", "VISA", PaymentStatus::Fail, 1500));

        let snap = agg.snapshot();
        let m = &snap[&RouteKey::new("HDFC", "VISA")];
        assert_eq!(m.total, 3);
        assert_eq!(m.success_rate, 0.667);
        assert_eq!(m.failure_rate, 0.333);
        assert_eq!(m.avg_latency_ms, 800.0);
        assert_eq!(m.error_code_histogram.get("timeout"), Some(&1));
    }

    #[test]
    fn histogram_counts_failed_events_only() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        agg.ingest(event_at(0, "HDFC", "VISA", PaymentStatus::Success, 400));
        let snap = agg.snapshot();
        let m = &snap[&RouteKey::new("HDFC", "VISA")];
        assert!(m.error_code_histogram.is_empty());
    }

    #[test]
    fn snapshot_is_deterministic_without_ingest() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        for secs in 0..10 {
            let status = if secs % 3 == 0 { PaymentStatus::Fail } else { PaymentStatus::Success };
            agg.ingest(event_at(secs, "ICICI", "MASTERCARD", status, 600));
            agg.ingest(event_at(secs, "AXIS", "VISA", PaymentStatus::Success, 350));
        }
        assert_eq!(agg.snapshot(), agg.snapshot());
    }

    #[test]
    fn empty_window_snapshots_to_empty_map() {
        let agg = WindowedAggregator::new(Duration::from_secs(60));
        assert!(agg.snapshot().is_empty());
    }

    #[test]
    fn rounding_helper() {
        assert_eq!(round_to(2.0 / 3.0, 3), 0.667);
        assert_eq!(round_to(812.34, 1), 812.3);
        assert_eq!(round_to(0.854999, 2), 0.85);
    }
}
