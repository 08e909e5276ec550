use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::event::RouteKey;

/// Outage injected against the simulator some time after startup, parsed
/// from `DEMO_OUTAGE=bank:card:severity:delay_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoOutage {
    pub bank: String,
    pub card: String,
    pub severity: f64,
    pub delay_seconds: u64,
}

impl DemoOutage {
    pub fn route(&self) -> RouteKey {
        RouteKey::new(self.bank.clone(), self.card.clone())
    }

    fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 4 {
            bail!("expected bank:card:severity:delay_seconds, got {raw:?}");
        }
        Ok(Self {
            bank: parts[0].to_string(),
            card: parts[1].to_string(),
            severity: parts[2].parse().context("severity")?,
            delay_seconds: parts[3].parse().context("delay_seconds")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Window and tick cadence
    pub window_seconds: u64,
    pub tick_seconds: u64,

    // Mitigation policy
    pub action_duration_seconds: u64,
    pub max_shift: f64,

    // Persistence and export paths
    pub memory_file: String,
    pub metrics_export_file: String,
    pub decisions_export_file: String,

    // Telemetry source
    pub simulator_enabled: bool,
    pub events_per_sec: u64,
    pub event_channel_capacity: usize,
    pub demo_outage: Option<DemoOutage>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            window_seconds: env::var("WINDOW_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            tick_seconds: env::var("TICK_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            action_duration_seconds: env::var("ACTION_DURATION_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            max_shift: env::var("MAX_SHIFT")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            memory_file: env::var("MEMORY_FILE").unwrap_or_else(|_| "memory.json".to_string()),

            metrics_export_file: env::var("METRICS_EXPORT_FILE")
                .unwrap_or_else(|_| "live_metrics.json".to_string()),

            decisions_export_file: env::var("DECISIONS_EXPORT_FILE")
                .unwrap_or_else(|_| "live_decisions.json".to_string()),

            simulator_enabled: env::var("SIMULATOR_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            events_per_sec: env::var("EVENTS_PER_SEC")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            event_channel_capacity: env::var("EVENT_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()?,

            demo_outage: match env::var("DEMO_OUTAGE") {
                Ok(raw) if !raw.is_empty() => Some(DemoOutage::parse(&raw)?),
                _ => None,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            tick_seconds: 10,
            action_duration_seconds: 60,
            max_shift: 0.5,
            memory_file: "memory.json".to_string(),
            metrics_export_file: "live_metrics.json".to_string(),
            decisions_export_file: "live_decisions.json".to_string(),
            simulator_enabled: true,
            events_per_sec: 10,
            event_channel_capacity: 1024,
            demo_outage: None,
        }
    }
}
