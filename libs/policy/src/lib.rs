//! # housekeeper-policy
//!
//! The shared brain of the load-aware scheduling pair:
//!
//! - the declarative scheduling policy (sync periods, predicate metrics,
//!   weighted priority metrics, hot-value windows)
//! - the node annotation key space and the timestamped-value codec, with
//!   active-duration freshness semantics
//! - cluster node resource policies and their derived annotation sets
//! - the scoring algorithms the extender runs at schedule time
//!
//! Both the annotator (writer side) and the extender (reader side) depend
//! on this crate; keeping the codec and the freshness rules in one place
//! is what makes stale-tolerant reads safe.

pub mod annotations;
pub mod node_resource;
pub mod scope;
pub mod scoring;
pub mod spec;

pub use annotations::{
    active_duration, build_annotation_key, local_time_string, AnnotationError, TimestampedValue,
    BALANCE_LOAD_PREFIX, BALANCE_TARGET_PREFIX, EXPANSION_PREFIX, HOT_VALUE_ACTIVE_DURATION,
    NODE_HOT_VALUE_KEY,
};
pub use node_resource::{ClusterNodeResourcePolicy, NodeResourcePolicyList, CNRP_COLLECTION_PATH};
pub use scope::{
    is_daemonset_pod, is_dynamic_scheduler_node, is_managed_node, is_scoped_pod,
    parse_apply_scope, ANNOTATION_POD_SCHEDULING_SCOPE, APPLY_SCOPE_CONFIG_MAP,
    LABEL_MANAGED_NODE_KEY, LABEL_MANAGED_NODE_VALUE, SCOPE_HOUSEKEEPER, SYSTEM_NAMESPACE,
    WILDCARD,
};
pub use scoring::{is_overloaded, node_score_with_hot_penalty, ScoringConfig, MAX_NODE_SCORE};
pub use spec::{HotValuePolicy, PolicyError, PolicySpec, PredicatePolicy, PriorityPolicy, SyncPolicy};
