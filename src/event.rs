use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a payment corridor: the (issuing bank, card network) pair.
/// All aggregation, scoring, and mitigation state is keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub bank: String,
    pub card: String,
}

impl RouteKey {
    pub fn new(bank: impl Into<String>, card: impl Into<String>) -> Self {
        Self {
            bank: bank.into(),
            card: card.into(),
        }
    }

    /// Key used in exported metric snapshots, e.g. "HDFC-VISA".
    pub fn dash_key(&self) -> String {
        format!("{}-{}", self.bank, self.card)
    }

    /// Key used in the durable confidence store, e.g. "HDFC_VISA".
    pub fn memory_key(&self) -> String {
        format!("{}_{}", self.bank, self.card)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.bank, self.card)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Fail,
}

/// A single transaction outcome as pushed by the telemetry source.
/// The timestamp stays a string on the wire; ingestion parses it and
/// rejects events it cannot parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: String,
    pub timestamp: String,
    pub bank: String,
    pub card: String,
    pub amount: f64,
    pub latency_ms: u64,
    pub status: PaymentStatus,
    pub error_code: Option<String>,
}

impl PaymentEvent {
    pub fn route(&self) -> RouteKey {
        RouteKey::new(self.bank.clone(), self.card.clone())
    }

    /// Parse the ISO-8601 wire timestamp. `None` means the event is
    /// malformed and must be dropped, not propagated.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .parse::<DateTime<Utc>>()
            .ok()
            .or_else(|| {
                // Naive timestamps (no offset) are treated as UTC, matching
                // what upstream producers emit.
                chrono::NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            })
    }
}
