//! Binding-event controller.
//!
//! Tails pod `Scheduled` events and feeds the binding window. Without
//! watch plumbing we poll the events API with a timestamp watermark:
//! each pass processes only events newer than the last one seen, so
//! re-listed events do not double-count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use housekeeper_cluster::Event;

use super::Context;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const SCHEDULED_FIELD_SELECTOR: &str = "reason=Scheduled,involvedObject.kind=Pod";

pub struct EventController {
    context: Arc<Context>,
}

impl EventController {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub fn start(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("binding event poller started");
            // Only count bindings that happen from now on; history would
            // skew hot values at startup.
            let mut watermark = Utc::now();
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        watermark = self.poll_once(watermark).await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("binding event poller shutting down");
                            return;
                        }
                    }
                }
            }
        })
    }

    async fn poll_once(&self, watermark: DateTime<Utc>) -> DateTime<Utc> {
        let events = match self
            .context
            .cluster
            .list_events(SCHEDULED_FIELD_SELECTOR, None)
            .await
        {
            Ok(list) => list.items,
            Err(e) => {
                warn!(error = %e, "failed to list scheduled events");
                return watermark;
            }
        };

        let mut new_watermark = watermark;
        let mut inserted = 0usize;
        for event in &events {
            let Some(timestamp) = event_timestamp(event) else {
                continue;
            };
            if timestamp <= watermark {
                continue;
            }
            let Some(node) = bound_node(event) else {
                continue;
            };
            self.context.bindings.insert(&node, timestamp);
            inserted += 1;
            if timestamp > new_watermark {
                new_watermark = timestamp;
            }
        }

        if inserted > 0 {
            debug!(inserted, window = self.context.bindings.len(), "recorded pod bindings");
        }
        new_watermark
    }
}

fn event_timestamp(event: &Event) -> Option<DateTime<Utc>> {
    event.last_timestamp.or(event.event_time)
}

/// The scheduler's binding events carry the target node only in the
/// message: `Successfully assigned <ns>/<pod> to <node>`.
fn bound_node(event: &Event) -> Option<String> {
    let (_, node) = event.message.rsplit_once(" to ")?;
    let node = node.trim();
    if node.is_empty() {
        return None;
    }
    Some(node.to_string())
}
