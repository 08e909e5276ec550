use chrono::Utc;
use parking_lot::RwLock;
use rand::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{PaymentEvent, PaymentStatus, RouteKey};
use crate::routing::RoutingSurface;

const BANKS: [&str; 4] = ["HDFC", "SBI", "ICICI", "AXIS"];
const CARDS: [&str; 3] = ["VISA", "MASTERCARD", "RUPAY"];
const ERROR_CODES: [&str; 3] = ["timeout", "issuer_decline", "network_error"];
const DEFAULT_BASE_SUCCESS: f64 = 0.95;

/// An injected fault: the matching route's success probability is multiplied
/// by `severity` until cleared.
#[derive(Debug, Clone)]
pub struct Outage {
    pub route: RouteKey,
    pub severity: f64,
}

/// Synthetic payment traffic source. Stands in for the real telemetry feed:
/// it pushes well-formed events through the same channel a production
/// producer would, and it honors the routing surface's health multipliers so
/// mitigations visibly change the generated traffic.
pub struct PaymentSimulator {
    routing: Arc<RoutingSurface>,
    base_success: HashMap<RouteKey, f64>,
    outage: RwLock<Option<Outage>>,
}

impl PaymentSimulator {
    pub fn new(routing: Arc<RoutingSurface>) -> Self {
        let mut base_success = HashMap::new();
        for (bank, card, rate) in [
            ("HDFC", "VISA", 0.96),
            ("HDFC", "MASTERCARD", 0.95),
            ("SBI", "VISA", 0.97),
            ("SBI", "MASTERCARD", 0.96),
            ("ICICI", "VISA", 0.95),
            ("ICICI", "MASTERCARD", 0.95),
            ("AXIS", "VISA", 0.94),
            ("AXIS", "MASTERCARD", 0.94),
        ] {
            base_success.insert(RouteKey::new(bank, card), rate);
        }
        Self {
            routing,
            base_success,
            outage: RwLock::new(None),
        }
    }

    pub fn set_outage(&self, route: RouteKey, severity: f64) {
        info!(route = %route, severity, "injecting outage");
        *self.outage.write() = Some(Outage { route, severity });
    }

    pub fn clear_outage(&self) {
        *self.outage.write() = None;
    }

    /// Draw one payment outcome against the current health and outage state.
    pub fn generate(&self) -> PaymentEvent {
        let mut rng = rand::thread_rng();

        let bank = *BANKS.choose(&mut rng).unwrap_or(&BANKS[0]);
        let card = *CARDS.choose(&mut rng).unwrap_or(&CARDS[0]);
        let route = RouteKey::new(bank, card);

        let base = self
            .base_success
            .get(&route)
            .copied()
            .unwrap_or(DEFAULT_BASE_SUCCESS);
        let mut success_prob = base * self.routing.health_of(&route);

        if let Some(outage) = self.outage.read().as_ref() {
            if outage.route == route {
                success_prob *= outage.severity;
            }
        }

        let success = rng.gen::<f64>() < success_prob;

        let mut latency_ms = rng.gen_range(300..=2000);
        if !success {
            latency_ms += rng.gen_range(500..=2000);
        }

        let error_code = if success {
            None
        } else {
            ERROR_CODES.choose(&mut rng).map(|c| c.to_string())
        };

        PaymentEvent {
            payment_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            bank: bank.to_string(),
            card: card.to_string(),
            amount: (rng.gen_range(10.0f64..500.0) * 100.0).round() / 100.0,
            latency_ms,
            status: if success {
                PaymentStatus::Success
            } else {
                PaymentStatus::Fail
            },
            error_code,
        }
    }

    /// Stream generated payments into `tx` at roughly `events_per_sec` until
    /// the receiving side goes away.
    pub async fn run(self: Arc<Self>, tx: mpsc::Sender<PaymentEvent>, events_per_sec: u64) {
        let period = Duration::from_secs_f64(1.0 / events_per_sec.max(1) as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(events_per_sec, "payment simulator started");
        loop {
            ticker.tick().await;
            if tx.send(self.generate()).await.is_err() {
                warn!("event channel closed, simulator stopping");
                break;
            }
        }
    }
}
