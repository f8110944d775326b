//! Push-notification delivery engine.
//!
//! A send flows through [`payload::PayloadBuilder`] into the
//! [`dispatcher::DeliveryDispatcher`], which resolves the audience through a
//! [`registry::SubscriptionRegistry`], fans deliveries out over a
//! [`transport::PushTransport`], prunes dead endpoints via
//! [`pruner::SubscriptionPruner`] and records the outcome with a
//! [`recorder::CampaignRecorder`].

pub mod dispatcher;
pub mod memory;
pub mod payload;
pub mod pruner;
pub mod recorder;
pub mod registry;
pub mod tracking;
pub mod transport;
