//! Copying collection between the two spaces of a scope.

mod collector;

pub use collector::{CollectError, CollectStats, Collector, CollectorOptions, compact};
