//! Periodic export of banner show/click events to a message broker.

#![warn(clippy::unwrap_used)]

pub mod broker;
pub mod exporter;
pub mod nats;

pub use broker::{Broker, BrokerError, CaptureBroker, PublishChannel};
pub use exporter::{CycleOutcome, CycleReport, ExporterState, StatisticsExporter};
pub use nats::NatsBroker;
