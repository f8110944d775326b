//! Subscription registry: durable store of device push subscriptions.
//!
//! The dispatcher consumes it through [`SubscriptionRegistry`]; the API uses
//! the same trait to register and remove devices.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{AudienceFilter, NewSubscription, Subscription};

#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Active subscriptions matching any role or user id in `filter`, or every
    /// active subscription when the filter is a broadcast.
    async fn active_subscriptions(
        &self,
        filter: &AudienceFilter,
    ) -> Result<Vec<Subscription>, AppError>;

    /// Mark the endpoint inactive. Unknown or already inactive endpoints are a
    /// no-op; returns whether this call changed anything.
    async fn deactivate(&self, endpoint: &str) -> Result<bool, AppError>;

    /// Record activity on an endpoint. Unknown endpoints are ignored.
    async fn touch_activity(&self, endpoint: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Insert or re-activate the subscription for `params.endpoint`.
    async fn register(&self, params: &NewSubscription) -> Result<Subscription, AppError>;

    /// Deactivate an endpoint only if it belongs to `user_id`.
    async fn deactivate_for_user(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError>;
}

/// PostgreSQL-backed registry.
#[derive(Clone)]
pub struct PgSubscriptionRegistry {
    pool: PgPool,
}

impl PgSubscriptionRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRegistry for PgSubscriptionRegistry {
    async fn active_subscriptions(
        &self,
        filter: &AudienceFilter,
    ) -> Result<Vec<Subscription>, AppError> {
        if filter.is_broadcast() {
            let subs: Vec<Subscription> = sqlx::query_as(
                "SELECT * FROM push_subscriptions WHERE is_active = true ORDER BY created_at",
            )
            .fetch_all(&self.pool)
            .await?;
            return Ok(subs);
        }

        let roles: Vec<String> = filter.roles.iter().map(|r| r.to_string()).collect();

        let subs: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT *
            FROM push_subscriptions
            WHERE is_active = true
              AND (role = ANY($1) OR user_id = ANY($2))
            ORDER BY created_at
            "#,
        )
        .bind(&roles)
        .bind(&filter.user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    async fn deactivate(&self, endpoint: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_subscriptions
            SET is_active = false, updated_at = NOW()
            WHERE endpoint = $1 AND is_active = true
            "#,
        )
        .bind(endpoint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_activity(&self, endpoint: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE push_subscriptions SET last_activity = $2 WHERE endpoint = $1")
            .bind(endpoint)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn register(&self, params: &NewSubscription) -> Result<Subscription, AppError> {
        let sub: Subscription = sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions
                (id, user_id, username, role, endpoint, p256dh, auth, device_type, user_agent,
                 is_active, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true, NOW())
            ON CONFLICT (endpoint) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                username = EXCLUDED.username,
                role = EXCLUDED.role,
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                device_type = EXCLUDED.device_type,
                user_agent = EXCLUDED.user_agent,
                is_active = true,
                last_activity = NOW(),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.user_id)
        .bind(&params.username)
        .bind(params.role)
        .bind(&params.endpoint)
        .bind(&params.p256dh)
        .bind(&params.auth)
        .bind(params.device_type)
        .bind(&params.user_agent)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            device_type = %sub.device_type,
            "Push subscription registered"
        );

        Ok(sub)
    }

    async fn deactivate_for_user(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE push_subscriptions
            SET is_active = false, updated_at = NOW()
            WHERE endpoint = $1 AND user_id = $2 AND is_active = true
            "#,
        )
        .bind(endpoint)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let deactivated = result.rows_affected() > 0;
        if deactivated {
            tracing::info!(user_id = %user_id, "Push subscription removed by owner");
        }

        Ok(deactivated)
    }
}
