//! Declarative admission rules.
//!
//! Rules are evaluated against a [`MetricsSnapshot`](crate::monitor::MetricsSnapshot)
//! and gate every phase transition of the orchestrator:
//! - **Transcode admission**: may another item be dispatched right now?
//! - **Organize admission**: may the library be taken offline and rewritten?
//! - **Capacity**: has the transcode cache filled up (back-pressure)?
//! - **Rescan window**: is it a good time to ask the library for a rescan?
//!
//! Metric fields form a closed set per category and are validated when the
//! configuration is deserialized, so evaluation never meets an unknown field.

mod evaluator;
mod types;

pub use evaluator::{any_matches, item_matches, satisfied, satisfied_at, within_windows};
pub use types::{
    Comparator, FailureReason, ItemField, ItemRule, ItemValue, MetricCategory, MetricKey,
    MetricRule, Rule, RuleError, TimeWindow,
};
