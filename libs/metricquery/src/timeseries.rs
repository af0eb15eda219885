//! The common time-series shape every adapter returns.

use serde::{Deserialize, Serialize};

/// A single label on a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// One observation. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// A labelled series of samples, ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, name: &str, value: &str) -> Self {
        self.labels.push(Label {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn push_sample(&mut self, timestamp: i64, value: f64) {
        self.samples.push(Sample { timestamp, value });
    }

    /// The most recent sample, relying on timestamp ordering.
    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Comparison operator in a source-native query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "in")]
    In,
}

/// A dimension filter passed to sources that take structured conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl QueryCondition {
    pub fn equal(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            operator: Operator::Equal,
            values: vec![value.to_string()],
        }
    }
}
