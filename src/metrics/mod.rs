// src/metrics/mod.rs
mod collector;
mod events;

pub use collector::{MetricsCollector, MetricsRegistry};
pub use events::{CloseReason, Event, EventSink, Fanout, TracingSink};

#[cfg(test)]
pub(crate) use events::test_support;
