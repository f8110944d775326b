//! Production [`PushTransport`] backed by the `web-push` crate.

use std::sync::Arc;

use async_trait::async_trait;
use web_push::WebPushError;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{NotificationPayload, Subscription};
use pushfleet_engine::transport::{DeliveryError, PushTransport};

use crate::vapid::VapidConfig;

/// Encrypts, signs and posts notifications to browser push services.
#[derive(Clone)]
pub struct WebPushTransport {
    vapid: VapidConfig,
    ttl_seconds: u32,
    client: Arc<web_push::WebPushClient>,
}

impl WebPushTransport {
    pub fn new(vapid: VapidConfig, ttl_seconds: u32) -> Result<Self, AppError> {
        let client = web_push::WebPushClient::new()
            .map_err(|e| AppError::Push(format!("Failed to create push client: {}", e)))?;

        Ok(Self {
            vapid,
            ttl_seconds,
            client: Arc::new(client),
        })
    }

    fn build_message(
        &self,
        subscription: &Subscription,
        message: &str,
    ) -> Result<web_push::WebPushMessage, WebPushError> {
        let subscription_info = web_push::SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );
        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, message.as_bytes());
        builder.set_ttl(self.ttl_seconds);

        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);

        builder.build()
    }
}

/// Map a push-service error onto the dispatcher's failure classes.
///
/// Only "endpoint not found / gone" is permanent; everything else, including
/// authorization and payload-size rejections, is counted as transient.
pub fn classify(err: WebPushError) -> DeliveryError {
    if matches!(
        err,
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. }
    ) {
        DeliveryError::Gone(err.to_string())
    } else {
        DeliveryError::Transient(err.to_string())
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let message = payload
            .to_push_message()
            .map_err(|e| DeliveryError::Transient(format!("payload serialization failed: {}", e)))?;

        let request = self.build_message(subscription, &message).map_err(classify)?;
        self.client.send(request).await.map_err(classify)?;

        tracing::debug!(
            subscription_id = %subscription.id,
            username = %subscription.username,
            "Push message accepted"
        );

        Ok(())
    }
}
