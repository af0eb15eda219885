//! # housekeeper-cluster
//!
//! Typed contracts for the orchestrator API, shared by the annotator,
//! the scheduler extender and the cleanup tool:
//!
//! - Object shapes (nodes, pods, events, config maps) with the metadata
//!   fields the schedulers actually read
//! - Label-selector matching for cluster-scoped policies
//! - JSON-patch construction for annotation reconciliation
//! - A thin REST client over `reqwest`
//! - Lease-based leader election
//!
//! Watch/informer machinery is deliberately absent; callers poll with
//! cursors or tickers and rely on value freshness for correctness.

mod client;
mod error;
mod lease;
mod objects;
mod patch;
mod scheduler;
mod selector;

pub use client::{ClusterClient, ClusterConfig, ObjectList};
pub use error::ClusterError;
pub use lease::{LeaderElector, LeaseConfig};
pub use objects::{
    ConfigMap, Event, EventList, ListMeta, Node, ObjectMeta, ObjectReference, OwnerReference, Pod,
    PodSpec,
};
pub use patch::{annotation_patch_path, build_patch, escape_json_pointer, PatchOp};
pub use scheduler::{ExtenderArgs, ExtenderFilterResult, HostPriority, NodeList};
pub use selector::{LabelSelector, LabelSelectorRequirement};
