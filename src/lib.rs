//! Closed-loop payment route health monitor.
//!
//! Transaction outcomes stream into a trailing-window aggregator; each
//! control tick turns the window into per-route metrics, scores degradation
//! hypotheses against a durable confidence memory, applies time-bounded
//! traffic mitigations (at most one per route), rolls them back when they
//! elapse, and feeds tick-over-tick outcomes back into the memory.

pub mod actions;
pub mod config;
pub mod control;
pub mod event;
pub mod exporter;
pub mod hypothesis;
pub mod memory;
pub mod routing;
pub mod simulator;
pub mod window;

pub use actions::{ActionController, ActionOutcome, ActiveMitigation};
pub use config::Config;
pub use control::ControlLoop;
pub use event::{PaymentEvent, PaymentStatus, RouteKey};
pub use exporter::SnapshotExporter;
pub use hypothesis::{analyze, Hypothesis, SuggestedAction};
pub use memory::{ConfidenceRecord, ConfidenceStore};
pub use routing::RoutingSurface;
pub use simulator::PaymentSimulator;
pub use window::{MetricsSnapshot, RouteMetrics, WindowedAggregator};
