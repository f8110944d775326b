//! Shared application state for the Axum API server.

use std::sync::Arc;

use pushfleet_common::config::AppConfig;
use pushfleet_engine::dispatcher::{DeliveryDispatcher, DispatcherConfig};
use pushfleet_engine::recorder::CampaignRecorder;
use pushfleet_engine::registry::SubscriptionRegistry;
use pushfleet_engine::tracking::TrackingService;
use pushfleet_engine::transport::PushTransport;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn SubscriptionRegistry>,
    pub recorder: Arc<dyn CampaignRecorder>,
    /// `None` when push is not configured; sends answer 503.
    pub dispatcher: Option<Arc<DeliveryDispatcher>>,
    pub tracking: TrackingService,
    pub vapid_public_key: Option<String>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        recorder: Arc<dyn CampaignRecorder>,
        transport: Option<Arc<dyn PushTransport>>,
        vapid_public_key: Option<String>,
        config: AppConfig,
    ) -> Self {
        let dispatcher = transport.map(|transport| {
            Arc::new(DeliveryDispatcher::new(
                Arc::clone(&registry),
                Arc::clone(&recorder),
                transport,
                DispatcherConfig::from(&config),
            ))
        });
        let tracking = TrackingService::new(Arc::clone(&registry), Arc::clone(&recorder));

        Self {
            registry,
            recorder,
            dispatcher,
            tracking,
            vapid_public_key,
            config,
        }
    }
}
