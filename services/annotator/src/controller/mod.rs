//! The annotator's reconcile loops.
//!
//! Three queue-driven controllers share one context:
//!
//! - `node`: pulls metrics on each sync-period tick and patches
//!   balance-load and hot-value annotations
//! - `policy`: reconciles cluster node resource policies into static
//!   expansion/threshold annotations
//! - `event`: tails pod-scheduled events into the binding window

mod event;
mod node;
mod policy;

use std::sync::Arc;

use housekeeper_cluster::ClusterClient;
use housekeeper_datasource::NodeMetricsClient;
use housekeeper_policy::PolicySpec;

use crate::bindings::BindingRecords;

pub use event::EventController;
pub use node::NodeController;
pub use policy::PolicyController;

/// Shared state for all controllers.
pub struct Context {
    pub cluster: ClusterClient,
    pub metrics: NodeMetricsClient,
    pub policy: PolicySpec,
    pub bindings: Arc<BindingRecords>,
}
