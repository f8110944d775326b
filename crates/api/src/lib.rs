//! PushFleet HTTP API.
//!
//! Endpoints:
//! - `GET  /health`
//! - `GET  /api/push/vapid-public-key`
//! - `POST /api/push/subscribe`, `POST /api/push/unsubscribe` (authenticated)
//! - `POST /api/push/track` (public, called by service workers)
//! - `POST /api/push/send` (admin)
//! - `GET  /api/push/campaigns`, `GET /api/push/campaigns/{id}` (admin)

pub mod middleware;
pub mod routes;
pub mod state;
