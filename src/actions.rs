use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::event::RouteKey;
use crate::hypothesis::{Hypothesis, SuggestedAction};
use crate::routing::RoutingSurface;

/// A live traffic-health reduction on one route. Created on an accepted
/// reroute, destroyed when its age reaches the action duration.
#[derive(Debug, Clone)]
pub struct ActiveMitigation {
    pub route: RouteKey,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// A new mitigation was created and the health multiplier written.
    Applied,
    /// A mitigation is already live for this route; nothing changed.
    AlreadyActive,
    /// Alert-only action; no mitigation state.
    Alerted,
    /// do_nothing, or an action kind the controller does not act on.
    Skipped,
}

/// Applies and expires time-bounded mitigations. Per route the state machine
/// is Idle -> Active -> Idle; at most one mitigation is ever live per route.
pub struct ActionController {
    routing: Arc<RoutingSurface>,
    active: HashMap<RouteKey, ActiveMitigation>,
    max_shift: f64,
    duration: chrono::Duration,
}

impl ActionController {
    pub fn new(routing: Arc<RoutingSurface>, max_shift: f64, duration: Duration) -> Self {
        Self {
            routing,
            active: HashMap::new(),
            max_shift,
            duration: chrono::Duration::from_std(duration).unwrap_or_else(|_| {
                warn!("action duration out of range, falling back to 60s");
                chrono::Duration::seconds(60)
            }),
        }
    }

    /// Act on one hypothesis at simulated time `now`. Only partial_reroute
    /// mutates anything; a reroute for a route that already has a live
    /// mitigation is rejected without side effects.
    pub fn apply(&mut self, hypothesis: &Hypothesis, now: DateTime<Utc>) -> ActionOutcome {
        let route = &hypothesis.route;
        match hypothesis.suggested_action {
            SuggestedAction::PartialReroute => {
                if self.active.contains_key(route) {
                    return ActionOutcome::AlreadyActive;
                }
                info!(
                    route = %route,
                    probability = hypothesis.probability,
                    impact_percent = hypothesis.impact_percent,
                    shift = self.max_shift,
                    "rerouting traffic away from degraded route"
                );
                self.routing.set_health(route, 1.0 - self.max_shift);
                self.active.insert(
                    route.clone(),
                    ActiveMitigation {
                        route: route.clone(),
                        started_at: now,
                    },
                );
                ActionOutcome::Applied
            }
            SuggestedAction::MonitorAndAlert => {
                warn!(
                    route = %route,
                    probability = hypothesis.probability,
                    impact_percent = hypothesis.impact_percent,
                    "route looks unstable, monitoring"
                );
                ActionOutcome::Alerted
            }
            SuggestedAction::DoNothing => ActionOutcome::Skipped,
        }
    }

    /// Roll back every mitigation whose age has reached the action duration:
    /// health goes back to exactly 1.0 (full restore) and the mitigation is
    /// removed. Returns the routes that were restored.
    pub fn expire_elapsed(&mut self, now: DateTime<Utc>) -> Vec<RouteKey> {
        let expired: Vec<RouteKey> = self
            .active
            .values()
            .filter(|m| now - m.started_at >= self.duration)
            .map(|m| m.route.clone())
            .collect();

        for route in &expired {
            info!(route = %route, "mitigation elapsed, restoring normal routing");
            self.routing.set_health(route, 1.0);
            self.active.remove(route);
        }
        expired
    }

    pub fn is_active(&self, route: &RouteKey) -> bool {
        self.active.contains_key(route)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
