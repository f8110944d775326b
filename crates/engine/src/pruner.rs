//! Subscription pruner: retires endpoints the push service reported as gone.

use std::sync::Arc;

use crate::registry::SubscriptionRegistry;

/// Deactivates permanently dead endpoints.
///
/// Pruning is idempotent: overlapping campaigns may report the same endpoint
/// as gone concurrently and both calls settle on the same inactive state.
#[derive(Clone)]
pub struct SubscriptionPruner {
    registry: Arc<dyn SubscriptionRegistry>,
}

impl SubscriptionPruner {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Deactivate `endpoint`. Never fails; registry errors are logged.
    pub async fn prune(&self, endpoint: &str) {
        match self.registry.deactivate(endpoint).await {
            Ok(true) => {
                tracing::info!(endpoint = %endpoint, "Pruned dead push subscription");
            }
            Ok(false) => {
                tracing::debug!(endpoint = %endpoint, "Subscription already inactive or unknown");
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    error = %e,
                    "Failed to prune dead push subscription"
                );
            }
        }
    }
}
