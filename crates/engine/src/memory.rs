//! In-memory implementations of the registry and recorder traits.
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests. State
//! lives in `HashMap`s behind `tokio::sync::RwLock`: reads share the lock,
//! every mutation takes the write lock, so concurrent prunes and counter
//! updates are serialized. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{
    AudienceFilter, Campaign, CampaignStats, CampaignStatus, NewCampaign, NewSubscription,
    StatsDelta, Subscription,
};

use crate::recorder::{CampaignRecorder, MAX_LIST_LIMIT, check_delta, check_terminal};
use crate::registry::SubscriptionRegistry;

/// Subscriptions keyed by endpoint.
#[derive(Default)]
pub struct InMemorySubscriptionRegistry {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a subscription regardless of its active flag.
    pub async fn get(&self, endpoint: &str) -> Option<Subscription> {
        self.subscriptions.read().await.get(endpoint).cloned()
    }
}

#[async_trait]
impl SubscriptionRegistry for InMemorySubscriptionRegistry {
    async fn active_subscriptions(
        &self,
        filter: &AudienceFilter,
    ) -> Result<Vec<Subscription>, AppError> {
        let guard = self.subscriptions.read().await;
        let mut subs: Vec<Subscription> = guard
            .values()
            .filter(|s| s.is_active && filter.matches(s))
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn deactivate(&self, endpoint: &str) -> Result<bool, AppError> {
        let mut guard = self.subscriptions.write().await;
        match guard.get_mut(endpoint) {
            Some(sub) if sub.is_active => {
                sub.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_activity(&self, endpoint: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(sub) = self.subscriptions.write().await.get_mut(endpoint) {
            sub.last_activity = Some(at);
        }
        Ok(())
    }

    async fn register(&self, params: &NewSubscription) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let mut guard = self.subscriptions.write().await;

        let sub = guard
            .entry(params.endpoint.clone())
            .and_modify(|existing| {
                existing.user_id = params.user_id;
                existing.username = params.username.clone();
                existing.role = params.role;
                existing.p256dh = params.p256dh.clone();
                existing.auth = params.auth.clone();
                existing.device_type = params.device_type;
                existing.user_agent = params.user_agent.clone();
                existing.is_active = true;
                existing.last_activity = Some(now);
            })
            .or_insert_with(|| Subscription {
                id: Uuid::new_v4(),
                user_id: params.user_id,
                username: params.username.clone(),
                role: params.role,
                endpoint: params.endpoint.clone(),
                p256dh: params.p256dh.clone(),
                auth: params.auth.clone(),
                device_type: params.device_type,
                user_agent: params.user_agent.clone(),
                is_active: true,
                last_activity: Some(now),
                created_at: now,
            })
            .clone();

        tracing::info!(
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            device_type = %sub.device_type,
            "Push subscription registered"
        );

        Ok(sub)
    }

    async fn deactivate_for_user(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError> {
        let mut guard = self.subscriptions.write().await;
        match guard.get_mut(endpoint) {
            Some(sub) if sub.is_active && sub.user_id == user_id => {
                sub.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Campaigns keyed by id.
#[derive(Default)]
pub struct InMemoryCampaignRecorder {
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
}

impl InMemoryCampaignRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignRecorder for InMemoryCampaignRecorder {
    async fn create(&self, campaign: &NewCampaign) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let record = Campaign {
            id,
            payload: Json(campaign.payload.clone()),
            audience: Json(campaign.audience.clone()),
            issued_by: campaign.issuer.user_id,
            issued_by_name: campaign.issuer.username.clone(),
            status: CampaignStatus::Pending,
            stats: CampaignStats::default(),
            created_at: Utc::now(),
            completed_at: None,
        };
        self.campaigns.write().await.insert(id, record);

        tracing::info!(
            campaign_id = %id,
            issued_by = %campaign.issuer.username,
            "Campaign created"
        );

        Ok(id)
    }

    async fn mark_sending(&self, campaign_id: Uuid) -> Result<(), AppError> {
        if let Some(campaign) = self.campaigns.write().await.get_mut(&campaign_id)
            && campaign.status == CampaignStatus::Pending
        {
            campaign.status = CampaignStatus::Sending;
        }
        Ok(())
    }

    async fn finalize(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
        sent: i64,
        failed: i64,
    ) -> Result<bool, AppError> {
        check_terminal(status)?;

        let mut guard = self.campaigns.write().await;
        let campaign = guard
            .get_mut(&campaign_id)
            .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", campaign_id)))?;

        if !campaign.status.can_transition_to(status) {
            return Ok(false);
        }

        campaign.status = status;
        campaign.stats.sent += sent;
        campaign.stats.failed += failed;
        campaign.completed_at = Some(Utc::now());

        tracing::info!(campaign_id = %campaign_id, %status, sent, failed, "Campaign finalized");
        Ok(true)
    }

    async fn increment_stats(&self, campaign_id: Uuid, delta: StatsDelta) -> Result<(), AppError> {
        check_delta(&delta)?;

        let mut guard = self.campaigns.write().await;
        let campaign = guard
            .get_mut(&campaign_id)
            .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", campaign_id)))?;

        campaign.stats.delivered += delta.delivered;
        campaign.stats.clicked += delta.clicked;
        campaign.stats.failed += delta.failed;
        Ok(())
    }

    async fn get(&self, campaign_id: Uuid) -> Result<Campaign, AppError> {
        self.campaigns
            .read()
            .await
            .get(&campaign_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", campaign_id)))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Campaign>, AppError> {
        let mut campaigns: Vec<Campaign> = self.campaigns.read().await.values().cloned().collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns.truncate(limit.clamp(1, MAX_LIST_LIMIT) as usize);
        Ok(campaigns)
    }
}
