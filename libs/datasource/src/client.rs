//! Latest-value client used by the metric-sync loop.

use std::sync::Arc;

use tracing::debug;

use housekeeper_cluster::Node;
use housekeeper_metricquery::{node_metric, Metric, Sample, TimeSeries};

use crate::error::DataSourceError;
use crate::DataSource;

/// Resolves "the current value of metric M on node N" against whichever
/// data source is configured.
#[derive(Clone)]
pub struct NodeMetricsClient {
    source: Arc<dyn DataSource>,
    cluster_id: String,
}

impl NodeMetricsClient {
    pub fn new(source: Arc<dyn DataSource>, cluster_id: &str) -> Self {
        Self {
            source,
            cluster_id: cluster_id.to_string(),
        }
    }

    fn namer(&self, metric_name: &str, node: &Node) -> Metric {
        node_metric(&self.cluster_id, node.name(), "", "", metric_name)
    }

    /// Latest observation for `(metric_name, node)`.
    ///
    /// Multiple series can come back (one per upstream dimension split);
    /// we take the last sample of the series with the most samples, ties
    /// broken by first occurrence.
    pub async fn query_node_metric_latest(
        &self,
        metric_name: &str,
        node: &Node,
    ) -> Result<Sample, DataSourceError> {
        let namer = self.namer(metric_name, node);
        let series = self.source.query_latest_time_series(&namer).await?;
        let sample = pick_latest(&series).ok_or_else(|| {
            DataSourceError::NoData(format!("{metric_name}{{node={}}}", node.name()))
        })?;
        debug!(
            metric = metric_name,
            node = %node.name(),
            value = sample.value,
            timestamp = sample.timestamp,
            "resolved latest node metric"
        );
        Ok(sample)
    }
}

fn pick_latest(series: &[TimeSeries]) -> Option<Sample> {
    let longest = series.iter().max_by(|a, b| {
        a.samples
            .len()
            .cmp(&b.samples.len())
            // max_by returns the *last* maximal element; invert equality
            // so the first occurrence wins on ties.
            .then(std::cmp::Ordering::Greater)
    })?;
    longest.last_sample().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(samples: &[(i64, f64)]) -> TimeSeries {
        let mut s = TimeSeries::new();
        for (ts, v) in samples {
            s.push_sample(*ts, *v);
        }
        s
    }

    #[test]
    fn picks_last_sample_of_longest_series() {
        let all = vec![
            series(&[(10, 1.0)]),
            series(&[(10, 2.0), (20, 3.0), (30, 4.0)]),
            series(&[(10, 5.0), (20, 6.0)]),
        ];
        let sample = pick_latest(&all).unwrap();
        assert_eq!(sample.timestamp, 30);
        assert_eq!(sample.value, 4.0);
    }

    #[test]
    fn ties_break_to_first_series() {
        let all = vec![
            series(&[(10, 1.0), (20, 2.0)]),
            series(&[(10, 3.0), (20, 4.0)]),
        ];
        let sample = pick_latest(&all).unwrap();
        assert_eq!(sample.value, 2.0);
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(pick_latest(&[]).is_none());
        assert!(pick_latest(&[series(&[])]).is_none());
    }
}
