//! The declarative scheduling policy document.
//!
//! Loaded once at startup from a YAML file shaped like the cluster-side
//! `DynamicSchedulerPolicy` object:
//!
//! ```yaml
//! apiVersion: scheduling.crane.io/v1alpha1
//! kind: DynamicSchedulerPolicy
//! spec:
//!   syncPeriod:
//!     - name: cpu_usage_avg_5m
//!       period: 3m
//!   predicate:
//!     - name: cpu_usage_avg_5m
//!   priority:
//!     - name: cpu_usage_avg_5m
//!       weight: 1
//!   hotValue:
//!     - timeRange: 5m
//!       count: 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Top-level file wrapper; only `spec` is meaningful.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PolicyDocument {
    api_version: String,
    kind: String,
    spec: PolicySpec,
}

/// One tracked metric and its pull cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub name: String,
    #[serde(
        deserialize_with = "deserialize_go_duration",
        serialize_with = "serialize_go_duration"
    )]
    pub period: Duration,
}

/// A metric whose load is compared against its target threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicatePolicy {
    pub name: String,
}

/// A metric contributing to the balance score with a weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityPolicy {
    pub name: String,
    pub weight: f64,
}

/// One hot-value window: bindings within `time_range`, divided by `count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotValuePolicy {
    #[serde(
        deserialize_with = "deserialize_go_duration",
        serialize_with = "serialize_go_duration"
    )]
    pub time_range: Duration,
    pub count: u64,
}

/// The full scheduling policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySpec {
    #[serde(alias = "syncPolicy")]
    pub sync_period: Vec<SyncPolicy>,
    pub predicate: Vec<PredicatePolicy>,
    pub priority: Vec<PriorityPolicy>,
    pub hot_value: Vec<HotValuePolicy>,
}

impl PolicySpec {
    /// Load and validate a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse and validate a policy document from YAML text.
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_yaml::from_str(raw)?;
        let spec = doc.spec;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), PolicyError> {
        for priority in &self.priority {
            if priority.weight < 0.0 {
                return Err(PolicyError::Invalid(format!(
                    "priority metric {} has negative weight {}",
                    priority.name, priority.weight
                )));
            }
        }
        for hot in &self.hot_value {
            if hot.count == 0 {
                return Err(PolicyError::Invalid(
                    "hotValue entry with count 0 would divide by zero".to_string(),
                ));
            }
        }

        // A predicate/priority metric without a sync period never becomes
        // active; surface it loudly but let the policy load.
        for name in self
            .predicate
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.priority.iter().map(|p| p.name.as_str()))
        {
            if !self.sync_period.iter().any(|s| s.name == name) {
                warn!(metric = name, "metric referenced without a sync period; values will be treated as missing");
            }
        }
        Ok(())
    }

    /// The sync period configured for a metric, if any.
    pub fn sync_period_of(&self, name: &str) -> Option<Duration> {
        self.sync_period
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.period)
    }

    /// The longest hot-value window, used as the GC horizon for binding
    /// records.
    pub fn max_hot_value_time_range(&self) -> Duration {
        self.hot_value
            .iter()
            .map(|h| h.time_range)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Parse Go-style duration strings (`"300ms"`, `"90s"`, `"3m"`, `"1h30m"`).
pub fn parse_go_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let mut unit = c.to_string();
        if c == 'm' && chars.peek() == Some(&'s') {
            chars.next();
            unit.push('s');
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("bad number in duration {raw:?}"))?;
        number.clear();
        let unit_secs = match unit.as_str() {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown duration unit {other:?} in {raw:?}")),
        };
        total += Duration::from_secs_f64(value * unit_secs);
    }
    if !number.is_empty() {
        return Err(format!("duration {raw:?} missing a unit"));
    }
    Ok(total)
}

fn deserialize_go_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    parse_go_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_go_duration<S: serde::Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&format!("{}s", d.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_YAML: &str = r#"
apiVersion: scheduling.crane.io/v1alpha1
kind: DynamicSchedulerPolicy
spec:
  syncPeriod:
    - name: cpu_usage_avg_5m
      period: 3m
    - name: mem_usage_avg_5m
      period: 3m
    - name: cpu_usage_max_avg_1h
      period: 15m
  predicate:
    - name: cpu_usage_avg_5m
    - name: mem_usage_avg_5m
  priority:
    - name: cpu_usage_avg_5m
      weight: 1
    - name: mem_usage_avg_5m
      weight: 1
  hotValue:
    - timeRange: 5m
      count: 5
    - timeRange: 1m
      count: 2
"#;

    #[test]
    fn parses_full_policy() {
        let spec = PolicySpec::parse(POLICY_YAML).unwrap();
        assert_eq!(spec.sync_period.len(), 3);
        assert_eq!(spec.sync_period[0].period, Duration::from_secs(180));
        assert_eq!(spec.predicate.len(), 2);
        assert_eq!(spec.priority[0].weight, 1.0);
        assert_eq!(spec.hot_value[0].count, 5);
        assert_eq!(spec.max_hot_value_time_range(), Duration::from_secs(300));
    }

    #[test]
    fn sync_policy_alias_accepted() {
        let yaml = r#"
spec:
  syncPolicy:
    - name: cpu_usage_avg_5m
      period: 5m
"#;
        let spec = PolicySpec::parse(yaml).unwrap();
        assert_eq!(spec.sync_period_of("cpu_usage_avg_5m"), Some(Duration::from_secs(300)));
    }

    #[test]
    fn negative_weight_rejected() {
        let yaml = r#"
spec:
  priority:
    - name: cpu_usage_avg_5m
      weight: -1
"#;
        assert!(matches!(
            PolicySpec::parse(yaml),
            Err(PolicyError::Invalid(_))
        ));
    }

    #[test]
    fn zero_hot_value_count_rejected() {
        let yaml = r#"
spec:
  hotValue:
    - timeRange: 1m
      count: 0
"#;
        assert!(matches!(
            PolicySpec::parse(yaml),
            Err(PolicyError::Invalid(_))
        ));
    }

    #[test]
    fn go_duration_parsing() {
        assert_eq!(parse_go_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_go_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_go_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_go_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_go_duration("5").is_err());
        assert!(parse_go_duration("5x").is_err());
        assert!(parse_go_duration("").is_err());
    }

    #[test]
    fn empty_max_time_range_is_zero() {
        assert_eq!(PolicySpec::default().max_hot_value_time_range(), Duration::ZERO);
    }
}
