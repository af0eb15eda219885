//! Application state shared across request handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use housekeeper_policy::{scope, PolicySpec, ScoringConfig};

/// Shared state: the scheduling policy (immutable after startup) and the
/// apply-scope snapshot (replaced wholesale by the scope controller).
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    policy: PolicySpec,
    scoring: ScoringConfig,
    scope: Mutex<HashMap<String, bool>>,
}

impl AppState {
    pub fn new(policy: PolicySpec, scoring: ScoringConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                policy,
                scoring,
                scope: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> &PolicySpec {
        &self.inner.policy
    }

    pub fn scoring(&self) -> ScoringConfig {
        self.inner.scoring
    }

    /// Replace the apply-scope snapshot.
    pub fn update_scope(&self, namespaces: HashMap<String, bool>) {
        *self.inner.scope.lock().expect("scope lock poisoned") = namespaces;
    }

    /// Does the current scope cover `namespace`?
    pub fn scope_covers(&self, namespace: &str) -> bool {
        let scope = self.inner.scope.lock().expect("scope lock poisoned");
        scope::scope_covers(&scope, namespace)
    }
}
