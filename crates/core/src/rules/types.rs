//! Rule types and their configuration representation.

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while turning configured rules into typed rules.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    /// The category is not one of `sys`, `library`, `storage`, `gpu`, `veto`.
    #[error("unknown metric category: {0}")]
    UnknownCategory(String),

    /// The field does not exist in the given category.
    #[error("unknown field '{field}' in category '{category}'")]
    UnknownField { category: String, field: String },

    /// A time could not be parsed.
    #[error("invalid time '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    /// Text item fields only support equality comparisons.
    #[error("comparator '{op}' cannot be applied to text field '{field}'")]
    TextComparator { field: String, op: String },

    /// The value type does not match the field type.
    #[error("field '{field}' expects a {expected} value")]
    ValueType { field: String, expected: String },
}

/// Comparison applied between a measured value and a configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Neq,
    /// Never evaluated; lets an operator keep a rule in the file but disabled.
    #[serde(alias = "ignore")]
    Skip,
}

impl Comparator {
    /// Applies the comparator as `actual <op> threshold`.
    ///
    /// `Skip` always holds.
    pub fn holds(self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => actual >= threshold,
            Self::Gt => actual > threshold,
            Self::Lte => actual <= threshold,
            Self::Lt => actual < threshold,
            Self::Eq => (actual - threshold).abs() < f64::EPSILON,
            Self::Neq => (actual - threshold).abs() >= f64::EPSILON,
            Self::Skip => true,
        }
    }

    pub fn is_skip(self) -> bool {
        matches!(self, Self::Skip)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gte => ">=",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Skip => "skip",
        }
    }
}

/// Category of a metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Sys,
    Library,
    Storage,
    Gpu,
    Veto,
}

impl MetricCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sys => "sys",
            Self::Library => "library",
            Self::Storage => "storage",
            Self::Gpu => "gpu",
            Self::Veto => "veto",
        }
    }

    fn parse(s: &str) -> Result<Self, RuleError> {
        match s {
            "sys" => Ok(Self::Sys),
            "library" => Ok(Self::Library),
            "storage" => Ok(Self::Storage),
            "gpu" => Ok(Self::Gpu),
            "veto" => Ok(Self::Veto),
            other => Err(RuleError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed accessor for one value in a [`MetricsSnapshot`](crate::monitor::MetricsSnapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    SysCpu,
    SysMemory,
    SysLoadAvg,
    LibraryPlayingSessions,
    LibraryTranscodeSessions,
    LibraryHostCpu,
    LibraryHostMemory,
    LibraryProcessCpu,
    LibraryProcessMemory,
    LibraryItems,
    LibraryInFlight,
    LibrarySucceeded,
    LibraryPendingOrganize,
    LibraryFailed,
    StorageCacheSize,
    StorageDiskTotal,
    StorageDiskUsed,
    StorageDiskFree,
    GpuLoad,
    GpuMemory,
    GpuTemperature,
    VetoActive,
}

impl MetricKey {
    const ALL: [MetricKey; 22] = [
        Self::SysCpu,
        Self::SysMemory,
        Self::SysLoadAvg,
        Self::LibraryPlayingSessions,
        Self::LibraryTranscodeSessions,
        Self::LibraryHostCpu,
        Self::LibraryHostMemory,
        Self::LibraryProcessCpu,
        Self::LibraryProcessMemory,
        Self::LibraryItems,
        Self::LibraryInFlight,
        Self::LibrarySucceeded,
        Self::LibraryPendingOrganize,
        Self::LibraryFailed,
        Self::StorageCacheSize,
        Self::StorageDiskTotal,
        Self::StorageDiskUsed,
        Self::StorageDiskFree,
        Self::GpuLoad,
        Self::GpuMemory,
        Self::GpuTemperature,
        Self::VetoActive,
    ];

    /// Resolves a configured `(category, field)` pair.
    pub fn parse(category: &str, field: &str) -> Result<Self, RuleError> {
        let category = MetricCategory::parse(category)?;
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.category() == category && key.field() == field)
            .ok_or_else(|| RuleError::UnknownField {
                category: category.as_str().to_string(),
                field: field.to_string(),
            })
    }

    pub fn category(self) -> MetricCategory {
        match self {
            Self::SysCpu | Self::SysMemory | Self::SysLoadAvg => MetricCategory::Sys,
            Self::LibraryPlayingSessions
            | Self::LibraryTranscodeSessions
            | Self::LibraryHostCpu
            | Self::LibraryHostMemory
            | Self::LibraryProcessCpu
            | Self::LibraryProcessMemory
            | Self::LibraryItems
            | Self::LibraryInFlight
            | Self::LibrarySucceeded
            | Self::LibraryPendingOrganize
            | Self::LibraryFailed => MetricCategory::Library,
            Self::StorageCacheSize
            | Self::StorageDiskTotal
            | Self::StorageDiskUsed
            | Self::StorageDiskFree => MetricCategory::Storage,
            Self::GpuLoad | Self::GpuMemory | Self::GpuTemperature => MetricCategory::Gpu,
            Self::VetoActive => MetricCategory::Veto,
        }
    }

    /// Field name as written in configuration files.
    pub fn field(self) -> &'static str {
        match self {
            Self::SysCpu => "cpu",
            Self::SysMemory => "memory",
            Self::SysLoadAvg => "load_avg",
            Self::LibraryPlayingSessions => "playing_sessions",
            Self::LibraryTranscodeSessions => "transcode_sessions",
            Self::LibraryHostCpu => "host_cpu",
            Self::LibraryHostMemory => "host_memory",
            Self::LibraryProcessCpu => "process_cpu",
            Self::LibraryProcessMemory => "process_memory",
            Self::LibraryItems => "items",
            Self::LibraryInFlight => "in_flight",
            Self::LibrarySucceeded => "succeeded",
            Self::LibraryPendingOrganize => "pending_organize",
            Self::LibraryFailed => "failed",
            Self::StorageCacheSize => "cache_size",
            Self::StorageDiskTotal => "disk_total",
            Self::StorageDiskUsed => "disk_used",
            Self::StorageDiskFree => "disk_free",
            Self::GpuLoad => "load",
            Self::GpuMemory => "memory",
            Self::GpuTemperature => "temperature",
            Self::VetoActive => "active",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category(), self.field())
    }
}

/// `actual <op> threshold` over one snapshot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetricRule", into = "RawMetricRule")]
pub struct MetricRule {
    pub key: MetricKey,
    pub op: Comparator,
    pub value: f64,
}

impl MetricRule {
    pub fn new(key: MetricKey, op: Comparator, value: f64) -> Self {
        Self { key, op, value }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMetricRule {
    category: String,
    field: String,
    op: Comparator,
    #[serde(default)]
    value: f64,
}

impl TryFrom<RawMetricRule> for MetricRule {
    type Error = RuleError;

    fn try_from(raw: RawMetricRule) -> Result<Self, Self::Error> {
        Ok(Self {
            key: MetricKey::parse(&raw.category, &raw.field)?,
            op: raw.op,
            value: raw.value,
        })
    }
}

impl From<MetricRule> for RawMetricRule {
    fn from(rule: MetricRule) -> Self {
        Self {
            category: rule.key.category().as_str().to_string(),
            field: rule.key.field().to_string(),
            op: rule.op,
            value: rule.value,
        }
    }
}

/// Half-open daily interval `[start, end)`.
///
/// `start > end` wraps midnight; `start == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindow", into = "RawTimeWindow")]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parses `HH:MM` or `HH:MM:SS` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, RuleError> {
        Ok(Self {
            start: parse_time(start)?,
            end: parse_time(end)?,
        })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, RuleError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| RuleError::InvalidTime(s.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTimeWindow {
    start: String,
    end: String,
}

impl TryFrom<RawTimeWindow> for TimeWindow {
    type Error = RuleError;

    fn try_from(raw: RawTimeWindow) -> Result<Self, Self::Error> {
        Self::parse(&raw.start, &raw.end)
    }
}

impl From<TimeWindow> for RawTimeWindow {
    fn from(window: TimeWindow) -> Self {
        Self {
            start: window.start.format("%H:%M:%S").to_string(),
            end: window.end.format("%H:%M:%S").to_string(),
        }
    }
}

/// One entry of a rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Metric(MetricRule),
    /// Passes if the current time falls inside any of the windows.
    Window { windows: Vec<TimeWindow> },
}

impl Rule {
    pub fn metric(key: MetricKey, op: Comparator, value: f64) -> Self {
        Self::Metric(MetricRule::new(key, op, value))
    }
}

/// The first rule that did not hold, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub category: String,
    pub field: String,
    pub required: String,
    pub actual: String,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} must be {} (have {})",
            self.category, self.field, self.required, self.actual
        )
    }
}

/// Media item attribute usable in the per-item candidate filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    Container,
    VideoCodec,
    VideoResolution,
    Width,
    Height,
    Bitrate,
    Size,
    Duration,
}

impl ItemField {
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::Container | Self::VideoCodec | Self::VideoResolution
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::VideoCodec => "video_codec",
            Self::VideoResolution => "video_resolution",
            Self::Width => "width",
            Self::Height => "height",
            Self::Bitrate => "bitrate",
            Self::Size => "size",
            Self::Duration => "duration",
        }
    }
}

/// Threshold for an [`ItemRule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Number(f64),
    Text(String),
}

/// Per-item filter rule, e.g. `video_codec neq "hevc"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawItemRule", into = "RawItemRule")]
pub struct ItemRule {
    pub field: ItemField,
    pub op: Comparator,
    pub value: ItemValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawItemRule {
    field: ItemField,
    op: Comparator,
    value: ItemValue,
}

impl TryFrom<RawItemRule> for ItemRule {
    type Error = RuleError;

    fn try_from(raw: RawItemRule) -> Result<Self, Self::Error> {
        let field = raw.field.as_str().to_string();
        match (&raw.value, raw.field.is_text()) {
            (ItemValue::Text(_), true) => {
                if !matches!(raw.op, Comparator::Eq | Comparator::Neq | Comparator::Skip) {
                    return Err(RuleError::TextComparator {
                        field,
                        op: raw.op.symbol().to_string(),
                    });
                }
            }
            (ItemValue::Number(_), false) => {}
            (_, true) => {
                return Err(RuleError::ValueType {
                    field,
                    expected: "text".to_string(),
                })
            }
            (_, false) => {
                return Err(RuleError::ValueType {
                    field,
                    expected: "numeric".to_string(),
                })
            }
        }
        Ok(Self {
            field: raw.field,
            op: raw.op,
            value: raw.value,
        })
    }
}

impl From<ItemRule> for RawItemRule {
    fn from(rule: ItemRule) -> Self {
        Self {
            field: rule.field,
            op: rule.op,
            value: rule.value,
        }
    }
}
