//! Web-push delivery for PushFleet.
//!
//! [`vapid`] turns configuration into signing material and generates new key
//! pairs; [`sender::WebPushTransport`] is the production
//! [`PushTransport`](pushfleet_engine::transport::PushTransport).

pub mod sender;
pub mod vapid;
