use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::RouteKey;
use crate::window::{round_to, MetricsSnapshot};

/// A route only becomes a candidate below this success rate or above this
/// latency.
const TRIGGER_SUCCESS_RATE: f64 = 0.90;
const TRIGGER_LATENCY_MS: f64 = 1500.0;

const BASE_PROBABILITY: f64 = 0.6;
const SIGNATURE_ERROR_BUMP: f64 = 0.2;
const HIGH_LATENCY_BUMP: f64 = 0.1;
const HIGH_LATENCY_MS: f64 = 2000.0;
const CONFIDENCE_WEIGHT: f64 = 0.1;
const PROBABILITY_CEILING: f64 = 0.95;

/// Error codes that point at infrastructure rather than issuer declines.
const SIGNATURE_ERRORS: [&str; 2] = ["timeout", "network_error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    DoNothing,
    MonitorAndAlert,
    PartialReroute,
}

/// A scored judgment that one route is degrading, produced fresh each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    #[serde(flatten)]
    pub route: RouteKey,
    pub probability: f64,
    pub impact_percent: f64,
    pub avg_latency_ms: f64,
    pub error_code_histogram: BTreeMap<String, u64>,
    pub suggested_action: SuggestedAction,
}

/// Score every triggered route in the snapshot. Pure: the same snapshot and
/// the same confidence values always produce the same hypotheses, in the
/// snapshot's (route-sorted) iteration order. Routes that do not meet the
/// trigger emit nothing.
pub fn analyze(
    snapshot: &MetricsSnapshot,
    mut confidence: impl FnMut(&RouteKey) -> f64,
) -> Vec<Hypothesis> {
    let mut hypotheses = Vec::new();

    for (route, metrics) in snapshot {
        let triggered = metrics.success_rate < TRIGGER_SUCCESS_RATE
            || metrics.avg_latency_ms > TRIGGER_LATENCY_MS;
        if !triggered {
            continue;
        }

        let mut prob = BASE_PROBABILITY;
        if SIGNATURE_ERRORS
            .iter()
            .any(|code| metrics.error_code_histogram.contains_key(*code))
        {
            prob += SIGNATURE_ERROR_BUMP;
        }
        if metrics.avg_latency_ms > HIGH_LATENCY_MS {
            prob += HIGH_LATENCY_BUMP;
        }
        prob = (prob + confidence(route) * CONFIDENCE_WEIGHT).min(PROBABILITY_CEILING);

        let impact_percent = round_to((1.0 - metrics.success_rate) * 100.0, 1);
        let probability = round_to(prob, 2);

        hypotheses.push(Hypothesis {
            route: route.clone(),
            probability,
            impact_percent,
            avg_latency_ms: metrics.avg_latency_ms,
            error_code_histogram: metrics.error_code_histogram.clone(),
            suggested_action: suggest_action(probability, impact_percent),
        });
    }

    hypotheses
}

fn suggest_action(probability: f64, impact_percent: f64) -> SuggestedAction {
    if probability > 0.8 && impact_percent > 10.0 {
        SuggestedAction::PartialReroute
    } else if probability > 0.6 && impact_percent > 5.0 {
        SuggestedAction::MonitorAndAlert
    } else {
        SuggestedAction::DoNothing
    }
}
