//! Campaign recorder: history rows and their delivery statistics.
//!
//! Status only ever moves forward (`pending -> sending -> sent|failed`).
//! Counters only ever grow; the tracking flow may keep adding to them after a
//! campaign reached its terminal status.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{Campaign, CampaignStatus, NewCampaign, StatsDelta};

/// Maximum page size for campaign listings.
pub const MAX_LIST_LIMIT: i64 = 200;

#[async_trait]
pub trait CampaignRecorder: Send + Sync {
    /// Insert a `pending` campaign and return its id.
    async fn create(&self, campaign: &NewCampaign) -> Result<Uuid, AppError>;

    /// Move a `pending` campaign to `sending`. No-op in any other state.
    async fn mark_sending(&self, campaign_id: Uuid) -> Result<(), AppError>;

    /// Write the terminal status and the dispatch counts.
    ///
    /// Counts are added to whatever tracking events already contributed.
    /// Returns `false` when the campaign was already terminal.
    async fn finalize(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
        sent: i64,
        failed: i64,
    ) -> Result<bool, AppError>;

    /// Add to the delivered/clicked/failed counters. Never touches status.
    async fn increment_stats(&self, campaign_id: Uuid, delta: StatsDelta) -> Result<(), AppError>;

    async fn get(&self, campaign_id: Uuid) -> Result<Campaign, AppError>;

    /// Most recent campaigns first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<Campaign>, AppError>;
}

pub(crate) fn check_terminal(status: CampaignStatus) -> Result<(), AppError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Campaign cannot be finalized with non-terminal status '{}'",
            status
        )))
    }
}

pub(crate) fn check_delta(delta: &StatsDelta) -> Result<(), AppError> {
    if delta.delivered < 0 || delta.clicked < 0 || delta.failed < 0 {
        return Err(AppError::Validation(
            "Campaign counters can only be incremented".to_string(),
        ));
    }
    Ok(())
}

/// PostgreSQL-backed recorder.
#[derive(Clone)]
pub struct PgCampaignRecorder {
    pool: PgPool,
}

impl PgCampaignRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRecorder for PgCampaignRecorder {
    async fn create(&self, campaign: &NewCampaign) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO push_campaigns (id, payload, audience, issued_by, issued_by_name, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(Json(&campaign.payload))
        .bind(Json(&campaign.audience))
        .bind(campaign.issuer.user_id)
        .bind(&campaign.issuer.username)
        .bind(CampaignStatus::Pending)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            campaign_id = %id,
            issued_by = %campaign.issuer.username,
            "Campaign created"
        );

        Ok(id)
    }

    async fn mark_sending(&self, campaign_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE push_campaigns SET status = $2 WHERE id = $1 AND status = $3")
            .bind(campaign_id)
            .bind(CampaignStatus::Sending)
            .bind(CampaignStatus::Pending)
            .execute(&self.pool)
            .await?;

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

        let result = sqlx::query(
            r#"
            UPDATE push_campaigns
            SET status = $2,
                sent = sent + $3,
                failed = failed + $4,
                completed_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'sending')
            "#,
        )
        .bind(campaign_id)
        .bind(status)
        .bind(sent)
        .bind(failed)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            tracing::info!(campaign_id = %campaign_id, %status, sent, failed, "Campaign finalized");
        }

        Ok(applied)
    }

    async fn increment_stats(&self, campaign_id: Uuid, delta: StatsDelta) -> Result<(), AppError> {
        check_delta(&delta)?;

        let result = sqlx::query(
            r#"
            UPDATE push_campaigns
            SET delivered = delivered + $2,
                clicked = clicked + $3,
                failed = failed + $4
            WHERE id = $1
            "#,
        )
        .bind(campaign_id)
        .bind(delta.delivered)
        .bind(delta.clicked)
        .bind(delta.failed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Campaign {} not found",
                campaign_id
            )));
        }

        Ok(())
    }

    async fn get(&self, campaign_id: Uuid) -> Result<Campaign, AppError> {
        let campaign: Campaign = sqlx::query_as("SELECT * FROM push_campaigns WHERE id = $1")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", campaign_id)))?;

        Ok(campaign)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Campaign>, AppError> {
        let campaigns: Vec<Campaign> =
            sqlx::query_as("SELECT * FROM push_campaigns ORDER BY created_at DESC LIMIT $1")
                .bind(limit.clamp(1, MAX_LIST_LIMIT))
                .fetch_all(&self.pool)
                .await?;

        Ok(campaigns)
    }
}
