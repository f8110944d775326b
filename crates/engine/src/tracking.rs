//! Tracking flow: delivered/clicked/failed acknowledgements from devices.
//!
//! Events only ever add to campaign counters and bump the reporting
//! subscription's `last_activity`; they never move a campaign's status.

use std::sync::Arc;

use chrono::Utc;

use pushfleet_common::error::AppError;
use pushfleet_common::types::TrackingEvent;

use crate::recorder::CampaignRecorder;
use crate::registry::SubscriptionRegistry;

#[derive(Clone)]
pub struct TrackingService {
    registry: Arc<dyn SubscriptionRegistry>,
    recorder: Arc<dyn CampaignRecorder>,
}

impl TrackingService {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>, recorder: Arc<dyn CampaignRecorder>) -> Self {
        Self { registry, recorder }
    }

    /// Apply one tracking event.
    ///
    /// Unknown campaigns are reported as `NotFound`. The activity touch is
    /// best-effort and never fails the call.
    pub async fn record(&self, event: &TrackingEvent) -> Result<(), AppError> {
        if let Some(endpoint) = event.endpoint.as_deref().filter(|e| !e.trim().is_empty())
            && let Err(e) = self.registry.touch_activity(endpoint, Utc::now()).await
        {
            tracing::warn!(error = %e, "Failed to update subscription activity");
        }

        if let Some(campaign_id) = event.campaign_id {
            self.recorder
                .increment_stats(campaign_id, event.event.delta())
                .await?;
            tracing::debug!(campaign_id = %campaign_id, event = ?event.event, "Tracking event recorded");
        }

        Ok(())
    }
}
