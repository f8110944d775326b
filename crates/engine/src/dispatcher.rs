//! Delivery dispatcher: the fan-out core of the engine.
//!
//! For one send:
//! 1. Resolve the audience through the registry (empty → no-recipients result)
//! 2. Optionally record a `pending` campaign and stamp its id into the payload
//! 3. Deliver to every subscription concurrently, bounded by a semaphore
//! 4. Join every attempt, classify outcomes, prune endpoints reported gone
//! 5. Finalize the campaign once with its terminal status and counts
//!
//! Per-recipient failures never surface as errors; they are folded into the
//! returned [`CampaignResult`]. Counts are reduced by the coordinating task
//! alone as it drains the `JoinSet`, so no counter is shared between attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use pushfleet_common::config::AppConfig;
use pushfleet_common::error::AppError;
use pushfleet_common::types::{
    AudienceFilter, CampaignResult, DeliveryAttemptResult, FailureClass, Issuer, NewCampaign,
    NotificationPayload, SendCommand, Subscription,
};

use crate::payload::PayloadBuilder;
use crate::pruner::SubscriptionPruner;
use crate::recorder::CampaignRecorder;
use crate::registry::SubscriptionRegistry;
use crate::transport::{DeliveryError, PushTransport};

/// Default number of in-flight deliveries per campaign.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Default per-attempt timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on concurrent deliveries (at least 1).
    pub max_concurrency: usize,
    /// Timed-out attempts count as transient failures. `None` waits forever.
    pub delivery_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            delivery_timeout: Some(DEFAULT_DELIVERY_TIMEOUT),
        }
    }
}

impl From<&AppConfig> for DispatcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrency: config.push_max_concurrency.max(1),
            delivery_timeout: config.delivery_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct DeliveryDispatcher {
    registry: Arc<dyn SubscriptionRegistry>,
    recorder: Arc<dyn CampaignRecorder>,
    transport: Arc<dyn PushTransport>,
    pruner: SubscriptionPruner,
    builder: PayloadBuilder,
    config: DispatcherConfig,
}

/// Per-dispatch accumulator, owned by the coordinating task.
#[derive(Debug, Default)]
struct Tally {
    sent: u32,
    failed: u32,
    errors: Vec<String>,
}

impl Tally {
    fn record(&mut self, outcome: DeliveryAttemptResult) {
        if outcome.success {
            self.sent += 1;
            return;
        }
        self.failed += 1;
        let reason = outcome.error.unwrap_or_else(|| "unknown error".to_string());
        let line = match outcome.failure {
            Some(FailureClass::Permanent) => format!(
                "Delivery to {} ({}) failed: {} (subscription removed)",
                outcome.username, outcome.endpoint, reason
            ),
            _ => format!(
                "Delivery to {} ({}) failed: {}",
                outcome.username, outcome.endpoint, reason
            ),
        };
        self.errors.push(line);
    }

    fn record_join_error(&mut self, err: JoinError) {
        self.failed += 1;
        self.errors
            .push(format!("Delivery task did not complete: {}", err));
    }

    fn into_result(self) -> CampaignResult {
        CampaignResult {
            success: self.sent > 0,
            sent: self.sent,
            failed: self.failed,
            errors: self.errors,
            campaign_id: None,
        }
    }
}

impl DeliveryDispatcher {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        recorder: Arc<dyn CampaignRecorder>,
        transport: Arc<dyn PushTransport>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            pruner: SubscriptionPruner::new(Arc::clone(&registry)),
            registry,
            recorder,
            transport,
            builder: PayloadBuilder::new(),
            config,
        }
    }

    /// Validate a raw command and dispatch it.
    ///
    /// Validation happens before anything else touches the registry, the
    /// recorder or the transport.
    pub async fn send(
        &self,
        command: &SendCommand,
        issuer: &Issuer,
    ) -> Result<CampaignResult, AppError> {
        let payload = self.builder.build(command)?;
        self.dispatch(payload, command.audience(), issuer, command.record_history())
            .await
    }

    /// Deliver `payload` to every active subscription matching `audience`.
    ///
    /// The campaign runs on its own task: dropping the returned future does
    /// not cancel in-flight deliveries, and the campaign is still finalized.
    pub async fn dispatch(
        &self,
        payload: NotificationPayload,
        audience: AudienceFilter,
        issuer: &Issuer,
        record_history: bool,
    ) -> Result<CampaignResult, AppError> {
        let dispatcher = self.clone();
        let issuer = issuer.clone();

        tokio::spawn(async move {
            dispatcher
                .run(payload, audience, &issuer, record_history)
                .await
        })
        .await
        .map_err(|e| AppError::Internal(format!("Dispatch task did not complete: {}", e)))?
    }

    async fn run(
        &self,
        payload: NotificationPayload,
        audience: AudienceFilter,
        issuer: &Issuer,
        record_history: bool,
    ) -> Result<CampaignResult, AppError> {
        let subscriptions = self.registry.active_subscriptions(&audience).await?;

        if subscriptions.is_empty() {
            tracing::info!(
                broadcast = audience.is_broadcast(),
                "No active subscriptions for audience, nothing dispatched"
            );
            return Ok(CampaignResult::no_recipients());
        }

        let (payload, campaign_id) = if record_history {
            self.open_campaign(payload, audience, issuer).await
        } else {
            (payload, None)
        };

        if let Some(id) = campaign_id
            && let Err(e) = self.recorder.mark_sending(id).await
        {
            tracing::warn!(campaign_id = %id, error = %e, "Failed to mark campaign as sending");
        }

        let total = subscriptions.len();
        let tally = self.fan_out(subscriptions, Arc::new(payload)).await;
        let mut result = tally.into_result();
        result.campaign_id = campaign_id;

        tracing::info!(
            campaign_id = ?campaign_id,
            recipients = total,
            sent = result.sent,
            failed = result.failed,
            "Dispatch complete"
        );

        if let Some(id) = campaign_id {
            let status = result.terminal_status();
            if let Err(e) = self
                .recorder
                .finalize(id, status, i64::from(result.sent), i64::from(result.failed))
                .await
            {
                tracing::warn!(campaign_id = %id, error = %e, "Failed to finalize campaign");
            }
        }

        Ok(result)
    }

    /// Record the campaign. History is best-effort: on failure the payload
    /// goes out without a campaign id.
    async fn open_campaign(
        &self,
        payload: NotificationPayload,
        audience: AudienceFilter,
        issuer: &Issuer,
    ) -> (NotificationPayload, Option<uuid::Uuid>) {
        let campaign = NewCampaign {
            payload,
            audience,
            issuer: issuer.clone(),
        };

        match self.recorder.create(&campaign).await {
            Ok(id) => (self.builder.with_campaign_id(campaign.payload, id), Some(id)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record campaign, dispatching without history");
                (campaign.payload, None)
            }
        }
    }

    async fn fan_out(
        &self,
        subscriptions: Vec<Subscription>,
        payload: Arc<NotificationPayload>,
    ) -> Tally {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut tally = Tally::default();

        for subscription in subscriptions {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    // Never closed while dispatching
                    tally.failed += 1;
                    tally.errors.push(format!(
                        "Delivery to {} ({}) not attempted: {}",
                        subscription.username, subscription.endpoint, e
                    ));
                    continue;
                }
            };

            let transport = Arc::clone(&self.transport);
            let pruner = self.pruner.clone();
            let payload = Arc::clone(&payload);
            let timeout = self.config.delivery_timeout;

            tasks.spawn(async move {
                let outcome =
                    attempt(&*transport, &pruner, &subscription, &payload, timeout).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => tally.record(outcome),
                Err(e) => tally.record_join_error(e),
            }
        }

        tally
    }
}

/// One delivery attempt, including the prune for a gone endpoint.
async fn attempt(
    transport: &dyn PushTransport,
    pruner: &SubscriptionPruner,
    subscription: &Subscription,
    payload: &NotificationPayload,
    timeout: Option<Duration>,
) -> DeliveryAttemptResult {
    let delivery = transport.deliver(subscription, payload);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, delivery).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(limit)),
        },
        None => delivery.await,
    };

    match result {
        Ok(()) => {
            tracing::debug!(subscription_id = %subscription.id, "Push delivered");
            DeliveryAttemptResult {
                endpoint: subscription.endpoint.clone(),
                username: subscription.username.clone(),
                success: true,
                failure: None,
                error: None,
            }
        }
        Err(e) => {
            let class = e.class();
            match class {
                FailureClass::Permanent => pruner.prune(&subscription.endpoint).await,
                FailureClass::Transient => tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Push delivery failed"
                ),
            }
            DeliveryAttemptResult {
                endpoint: subscription.endpoint.clone(),
                username: subscription.username.clone(),
                success: false,
                failure: Some(class),
                error: Some(e.to_string()),
            }
        }
    }
}
