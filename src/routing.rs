use dashmap::DashMap;

use crate::event::RouteKey;

/// In-process routing/health collaborator. The action controller writes
/// per-route health multipliers here; the traffic source reads them when
/// deciding an outcome. `1.0` means the route carries full traffic.
#[derive(Debug, Default)]
pub struct RoutingSurface {
    health: DashMap<RouteKey, f64>,
}

impl RoutingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only mutation the action controller performs externally.
    pub fn set_health(&self, route: &RouteKey, multiplier: f64) {
        self.health.insert(route.clone(), multiplier);
    }

    pub fn health_of(&self, route: &RouteKey) -> f64 {
        self.health.get(route).map(|h| *h).unwrap_or(1.0)
    }

    /// Restore every known route to full health. Run at startup: a previous
    /// process may have died with a mitigation live, and nothing else would
    /// ever expire it.
    pub fn reset_all(&self) {
        for mut entry in self.health.iter_mut() {
            *entry.value_mut() = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_route_is_fully_healthy() {
        let surface = RoutingSurface::new();
        assert_eq!(surface.health_of(&RouteKey::new("HDFC", "VISA")), 1.0);
    }

    #[test]
    fn set_and_reset() {
        let surface = RoutingSurface::new();
        let route = RouteKey::new("SBI", "RUPAY");
        surface.set_health(&route, 0.5);
        assert_eq!(surface.health_of(&route), 0.5);
        surface.reset_all();
        assert_eq!(surface.health_of(&route), 1.0);
    }
}
