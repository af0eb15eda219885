//! Well-known metric names shared with the scheduling policy.

pub const METRIC_CPU_USAGE_PERCENT: &str = "cpu_usage_percent";
pub const METRIC_MEM_USAGE_PERCENT: &str = "mem_usage_percent";

pub const METRIC_CPU_USAGE_AVG_5M: &str = "cpu_usage_avg_5m";
pub const METRIC_CPU_USAGE_MAX_AVG_1H: &str = "cpu_usage_max_avg_1h";
pub const METRIC_CPU_USAGE_MAX_AVG_1D: &str = "cpu_usage_max_avg_1d";
pub const METRIC_MEM_USAGE_AVG_5M: &str = "mem_usage_avg_5m";
pub const METRIC_MEM_USAGE_MAX_AVG_1H: &str = "mem_usage_max_avg_1h";
pub const METRIC_MEM_USAGE_MAX_AVG_1D: &str = "mem_usage_max_avg_1d";

pub const METRIC_CPU_REQUEST: &str = "cpu_request";
pub const METRIC_CPU_LIMIT: &str = "cpu_limit";
pub const METRIC_MEM_REQUEST: &str = "mem_request";
pub const METRIC_MEM_LIMIT: &str = "mem_limit";
pub const METRIC_WORKLOAD_REPLICAS: &str = "replicas";
