// Domain models: poll targets, per-node samples, network snapshots, history queries

mod node;
mod query;
mod snapshot;

pub use node::{NodeMetrics, NodeSample, NodeTarget};
pub use query::{HistoryQuery, HistoryQueryError, Interval, Period};
pub use snapshot::{HistoryPoint, NetworkSnapshot, NodeHistoryPoint};
