//! Rule set evaluation.

use chrono::{Local, NaiveTime};

use crate::library::MediaItem;
use crate::monitor::MetricsSnapshot;

use super::types::{Comparator, FailureReason, ItemRule, ItemValue, MetricRule, Rule, TimeWindow};

/// Evaluates a rule set against the snapshot at the current local time.
///
/// Returns the first failing rule as the error.
pub fn satisfied(rules: &[Rule], snapshot: &MetricsSnapshot) -> Result<(), FailureReason> {
    satisfied_at(rules, snapshot, Local::now().time())
}

/// Evaluates a rule set with an explicit wall-clock time for window rules.
pub fn satisfied_at(
    rules: &[Rule],
    snapshot: &MetricsSnapshot,
    now: NaiveTime,
) -> Result<(), FailureReason> {
    for rule in rules {
        match rule {
            Rule::Metric(metric) => {
                if metric.op.is_skip() {
                    continue;
                }
                let actual = snapshot.value(metric.key);
                if !metric.op.holds(actual, metric.value) {
                    return Err(metric_failure(metric, actual));
                }
            }
            Rule::Window { windows } => {
                if !within_windows(windows, now) {
                    return Err(FailureReason {
                        category: "time".to_string(),
                        field: "window".to_string(),
                        required: windows
                            .iter()
                            .map(|w| w.to_string())
                            .collect::<Vec<_>>()
                            .join(" | "),
                        actual: now.format("%H:%M:%S").to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// True when at least one non-skipped metric rule holds.
///
/// Used for the capacity back-pressure signal, where each rule describes one
/// way the cache can be full.
pub fn any_matches(rules: &[MetricRule], snapshot: &MetricsSnapshot) -> bool {
    rules
        .iter()
        .filter(|rule| !rule.op.is_skip())
        .any(|rule| rule.op.holds(snapshot.value(rule.key), rule.value))
}

/// True when `now` lies inside any window. An empty list never matches.
pub fn within_windows(windows: &[TimeWindow], now: NaiveTime) -> bool {
    windows.iter().any(|w| w.contains(now))
}

/// True when the item passes every filter rule.
///
/// Missing metadata fails a rule, so unknown items are never transcoded by
/// accident.
pub fn item_matches(rules: &[ItemRule], item: &MediaItem) -> bool {
    rules.iter().all(|rule| {
        if rule.op.is_skip() {
            return true;
        }
        match &rule.value {
            ItemValue::Text(expected) => match item.text_field(rule.field) {
                Some(actual) => {
                    let equal = actual.eq_ignore_ascii_case(expected);
                    if rule.op == Comparator::Eq {
                        equal
                    } else {
                        !equal
                    }
                }
                None => false,
            },
            ItemValue::Number(threshold) => match item.numeric_field(rule.field) {
                Some(actual) => rule.op.holds(actual, *threshold),
                None => false,
            },
        }
    })
}

fn metric_failure(rule: &MetricRule, actual: f64) -> FailureReason {
    FailureReason {
        category: rule.key.category().as_str().to_string(),
        field: rule.key.field().to_string(),
        required: format!("{} {}", rule.op.symbol(), rule.value),
        actual: actual.to_string(),
    }
}
