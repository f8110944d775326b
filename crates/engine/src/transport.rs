//! Outbound push transport seam.
//!
//! The dispatcher only knows this trait; the web-push implementation lives in
//! `pushfleet-notifier` and tests plug in scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use pushfleet_common::types::{FailureClass, NotificationPayload, Subscription};

/// Classified failure of a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The push service reported the endpoint as permanently gone (404/410).
    #[error("endpoint gone: {0}")]
    Gone(String),

    /// Any other failure: network, unexpected status, bad keys, ...
    #[error("{0}")]
    Transient(String),

    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}

impl DeliveryError {
    pub fn class(&self) -> FailureClass {
        match self {
            DeliveryError::Gone(_) => FailureClass::Permanent,
            DeliveryError::Transient(_) | DeliveryError::TimedOut(_) => FailureClass::Transient,
        }
    }
}

/// Sends one notification to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError>;
}
