//! Node annotation key space and the timestamped-value codec.
//!
//! Load values are written as `"<value>,<timestamp>"` under well-known
//! keys. The timestamp is local time rendered with a literal `Z` suffix;
//! the format is part of the external wire surface and is kept verbatim.
//! Consumers decode eagerly and gate every read on an *active duration*:
//! a value older than its metric's sync period plus five minutes is
//! indistinguishable from absent.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use thiserror::Error;

use crate::spec::SyncPolicy;

/// Prefix for observed load values (written by the metric-sync loop).
pub const BALANCE_LOAD_PREFIX: &str = "balance-load.scheduling.crane.io";
/// Prefix for overload thresholds (derived from node resource policies).
pub const BALANCE_TARGET_PREFIX: &str = "balance-target.scheduling.crane.io";
/// Prefix for resource expansion ratios.
pub const EXPANSION_PREFIX: &str = "expansion.scheduling.crane.io";

/// Key (under the balance-load prefix) of the hot-value annotation.
pub const NODE_HOT_VALUE_KEY: &str = "node_hot_value";

/// Validity window of the hot-value annotation.
pub const HOT_VALUE_ACTIVE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Extra validity granted on top of a metric's sync period.
pub const EXTRA_ACTIVE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Shortest plausible timestamp; anything shorter is malformed.
const MIN_TIMESTAMP_LEN: usize = 5;

/// Wire timestamp layout. The `Z` is literal: historical deployments
/// write local time with this suffix and readers must follow suit.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Time zone used when the process has no `TZ` set.
pub const DEFAULT_TIME_ZONE: &str = "Asia/Shanghai";

/// Pin `TZ` before chrono first resolves the local zone so annotation
/// timestamps are consistent across replicas. Call once at startup.
pub fn ensure_local_timezone() {
    if std::env::var("TZ").map(|v| v.is_empty()).unwrap_or(true) {
        std::env::set_var("TZ", DEFAULT_TIME_ZONE);
    }
}

/// Current local time in the wire format.
pub fn local_time_string() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    #[error("annotation key {0} not found")]
    Missing(String),

    #[error("malformed annotation value {0:?}")]
    Malformed(String),

    #[error("annotation value {0:?} is expired")]
    Expired(String),
}

/// A decoded load annotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedValue {
    pub value: f64,
    pub updated_at: DateTime<Local>,
}

impl TimestampedValue {
    pub fn now(value: f64) -> Self {
        Self {
            value,
            updated_at: Local::now(),
        }
    }

    /// Encode to the wire tuple. Whole-number values render without a
    /// fractional part, matching what the annotator writes.
    pub fn encode(&self) -> String {
        format!(
            "{},{}",
            format_value(self.value),
            self.updated_at.format(TIME_FORMAT)
        )
    }

    /// Decode a wire tuple. Negative values, short or unparseable
    /// timestamps and anything that is not exactly `value,timestamp`
    /// count as malformed.
    pub fn decode(raw: &str) -> Result<Self, AnnotationError> {
        let mut parts = raw.split(',');
        let (Some(value_str), Some(ts_str), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AnnotationError::Malformed(raw.to_string()));
        };
        if ts_str.len() < MIN_TIMESTAMP_LEN {
            return Err(AnnotationError::Malformed(raw.to_string()));
        }

        let value: f64 = value_str
            .parse()
            .map_err(|_| AnnotationError::Malformed(raw.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(AnnotationError::Malformed(raw.to_string()));
        }

        let naive = NaiveDateTime::parse_from_str(ts_str, TIME_FORMAT)
            .map_err(|_| AnnotationError::Malformed(raw.to_string()))?;
        let updated_at = Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| AnnotationError::Malformed(raw.to_string()))?;

        Ok(Self { value, updated_at })
    }

    /// True while the value is younger than its active duration.
    pub fn is_active(&self, active_duration: Duration, now: DateTime<Local>) -> bool {
        let deadline = self.updated_at
            + chrono::Duration::from_std(active_duration).unwrap_or(chrono::Duration::zero());
        now < deadline
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// `<prefix>/<name>`, the annotation key layout shared by all three
/// prefixes.
pub fn build_annotation_key(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// Active duration of a metric: its sync period plus the fixed extra
/// window. `None` when the metric has no (or a zero) sync period.
pub fn active_duration(sync_periods: &[SyncPolicy], name: &str) -> Option<Duration> {
    sync_periods
        .iter()
        .find(|s| s.name == name && s.period != Duration::ZERO)
        .map(|s| s.period + EXTRA_ACTIVE_DURATION)
}

/// Read a load metric from node annotations and normalize to `[0, 1]`.
pub fn resource_usage(
    annotations: &BTreeMap<String, String>,
    metric_name: &str,
    active: Duration,
    now: DateTime<Local>,
) -> Result<f64, AnnotationError> {
    let key = build_annotation_key(BALANCE_LOAD_PREFIX, metric_name);
    let raw = annotations
        .get(&key)
        .ok_or(AnnotationError::Missing(key))?;
    let decoded = TimestampedValue::decode(raw)?;
    if !decoded.is_active(active, now) {
        return Err(AnnotationError::Expired(raw.clone()));
    }
    Ok(decoded.value / 100.0)
}

/// Read the node hot value (raw, not normalized).
pub fn node_hot_value(
    annotations: &BTreeMap<String, String>,
    now: DateTime<Local>,
) -> Result<f64, AnnotationError> {
    let key = build_annotation_key(BALANCE_LOAD_PREFIX, NODE_HOT_VALUE_KEY);
    let raw = annotations
        .get(&key)
        .ok_or(AnnotationError::Missing(key))?;
    let decoded = TimestampedValue::decode(raw)?;
    if !decoded.is_active(HOT_VALUE_ACTIVE_DURATION, now) {
        return Err(AnnotationError::Expired(raw.clone()));
    }
    Ok(decoded.value)
}

/// Read the overload threshold for a metric and normalize to a ratio.
///
/// Threshold annotations are keyed by resource (`cpu`, `memory`) while
/// load metrics are keyed by policy name (`cpu_usage_avg_5m`), so a
/// missing exact key falls back by substring. Negative thresholds are
/// returned as-is; callers treat them as "metric disabled".
pub fn resource_target_threshold(
    annotations: &BTreeMap<String, String>,
    metric_name: &str,
) -> Result<f64, AnnotationError> {
    let exact = build_annotation_key(BALANCE_TARGET_PREFIX, metric_name);
    let raw = match annotations.get(&exact) {
        Some(raw) => raw,
        None => {
            let fallback = if metric_name.contains("cpu") {
                "cpu"
            } else if metric_name.contains("mem") {
                "memory"
            } else {
                return Err(AnnotationError::Missing(exact));
            };
            let key = build_annotation_key(BALANCE_TARGET_PREFIX, fallback);
            annotations
                .get(&key)
                .ok_or(AnnotationError::Missing(key))?
        }
    };

    let percent: i64 = raw
        .parse()
        .map_err(|_| AnnotationError::Malformed(raw.clone()))?;
    Ok(percent as f64 / 100.0)
}

/// Filter annotations down to the keys the static reconciler owns
/// (expansion + balance-target prefixes).
pub fn static_owned_annotations(
    annotations: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    filter_by_prefixes(annotations, &[EXPANSION_PREFIX, BALANCE_TARGET_PREFIX])
}

/// Filter annotations to those under any of the given prefixes.
pub fn filter_by_prefixes(
    annotations: &BTreeMap<String, String>,
    prefixes: &[&str],
) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter(|(key, _)| {
            prefixes
                .iter()
                .any(|prefix| key.starts_with(&format!("{prefix}/")))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anns(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn codec_round_trip() {
        let original = TimestampedValue::now(37.5);
        let decoded = TimestampedValue::decode(&original.encode()).unwrap();
        assert_eq!(decoded.value, 37.5);
        // Sub-second precision is lost in the textual format.
        assert!((decoded.updated_at - original.updated_at).num_seconds().abs() <= 1);
    }

    #[test]
    fn whole_values_encode_without_fraction() {
        let value = TimestampedValue {
            value: 30.0,
            updated_at: Local::now(),
        };
        assert!(value.encode().starts_with("30,"));
    }

    #[test]
    fn malformed_values_rejected() {
        for raw in [
            "",
            "30",
            "30,",
            "abc,2026-01-01T00:00:00Z",
            "-3,2026-01-01T00:00:00Z",
            "30,2026-01-01T00:00:00Z,extra",
            "30,zzz",
        ] {
            assert!(TimestampedValue::decode(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn activity_window() {
        let now = Local::now();
        let fresh = TimestampedValue { value: 1.0, updated_at: now };
        assert!(fresh.is_active(Duration::from_secs(60), now));

        let stale = TimestampedValue {
            value: 1.0,
            updated_at: now - chrono::Duration::minutes(30),
        };
        assert!(!stale.is_active(Duration::from_secs(8 * 60), now));
    }

    #[test]
    fn usage_reads_and_normalizes() {
        let now = Local::now();
        let encoded = TimestampedValue { value: 30.0, updated_at: now }.encode();
        let annotations = anns(&[(
            "balance-load.scheduling.crane.io/cpu_usage_avg_5m",
            encoded.as_str(),
        )]);
        let usage =
            resource_usage(&annotations, "cpu_usage_avg_5m", Duration::from_secs(480), now)
                .unwrap();
        assert!((usage - 0.30).abs() < 1e-9);
    }

    #[test]
    fn expired_usage_is_an_error() {
        let now = Local::now();
        let encoded = TimestampedValue {
            value: 30.0,
            updated_at: now - chrono::Duration::minutes(30),
        }
        .encode();
        let annotations = anns(&[(
            "balance-load.scheduling.crane.io/cpu_usage_avg_5m",
            encoded.as_str(),
        )]);
        let err =
            resource_usage(&annotations, "cpu_usage_avg_5m", Duration::from_secs(480), now)
                .unwrap_err();
        assert!(matches!(err, AnnotationError::Expired(_)));
    }

    #[test]
    fn threshold_fallback_by_substring() {
        let annotations = anns(&[
            ("balance-target.scheduling.crane.io/cpu", "50"),
            ("balance-target.scheduling.crane.io/memory", "60"),
        ]);
        assert_eq!(
            resource_target_threshold(&annotations, "cpu_usage_avg_5m").unwrap(),
            0.5
        );
        assert_eq!(
            resource_target_threshold(&annotations, "mem_usage_max_avg_1h").unwrap(),
            0.6
        );
        assert!(resource_target_threshold(&annotations, "disk_io").is_err());
    }

    #[test]
    fn threshold_divides_as_float() {
        let annotations = anns(&[("balance-target.scheduling.crane.io/cpu", "45")]);
        let threshold = resource_target_threshold(&annotations, "cpu_usage_avg_5m").unwrap();
        assert!((threshold - 0.45).abs() < 1e-9);
    }

    #[test]
    fn negative_threshold_passes_through() {
        let annotations = anns(&[("balance-target.scheduling.crane.io/cpu", "-1")]);
        assert_eq!(
            resource_target_threshold(&annotations, "cpu_usage_avg_5m").unwrap(),
            -0.01
        );
    }

    #[test]
    fn active_duration_requires_sync_period() {
        let periods = vec![SyncPolicy {
            name: "cpu_usage_avg_5m".into(),
            period: Duration::from_secs(180),
        }];
        assert_eq!(
            active_duration(&periods, "cpu_usage_avg_5m"),
            Some(Duration::from_secs(180 + 300))
        );
        assert_eq!(active_duration(&periods, "mem_usage_avg_5m"), None);

        let zero = vec![SyncPolicy {
            name: "cpu_usage_avg_5m".into(),
            period: Duration::ZERO,
        }];
        assert_eq!(active_duration(&zero, "cpu_usage_avg_5m"), None);
    }

    #[test]
    fn prefix_filtering() {
        let annotations = anns(&[
            ("expansion.scheduling.crane.io/cpu", "2"),
            ("balance-target.scheduling.crane.io/cpu", "50"),
            ("balance-load.scheduling.crane.io/cpu_usage_avg_5m", "30,x"),
            ("expansion.scheduling.crane.io.fake/cpu", "9"),
            ("unrelated", "1"),
        ]);
        let owned = static_owned_annotations(&annotations);
        assert_eq!(owned.len(), 2);
        assert!(owned.contains_key("expansion.scheduling.crane.io/cpu"));
        assert!(owned.contains_key("balance-target.scheduling.crane.io/cpu"));
    }
}
