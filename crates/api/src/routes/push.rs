//! Push notification routes: device registration, sends, tracking and history.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{
    Campaign, CampaignResult, DeviceType, NewSubscription, SendCommand, Subscription,
    TrackingEvent,
};
use pushfleet_engine::recorder::MAX_LIST_LIMIT;

use crate::middleware::auth::{AdminUser, AuthUser};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const PUSH_NOT_CONFIGURED: &str = "Push notifications are not configured.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/push/vapid-public-key", get(vapid_public_key))
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
        .route("/api/push/send", post(send))
        .route("/api/push/track", post(track))
        .route("/api/push/campaigns", get(list_campaigns))
        .route("/api/push/campaigns/{id}", get(get_campaign))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub device_type: Option<DeviceType>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub limit: Option<i64>,
}

/// GET /api/push/vapid-public-key: Key devices need to subscribe.
async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = state
        .vapid_public_key
        .as_deref()
        .ok_or_else(|| AppError::Unavailable(PUSH_NOT_CONFIGURED.to_string()))?;
    Ok(Json(json!({ "publicKey": key })))
}

/// POST /api/push/subscribe: Register (or re-activate) the caller's device.
async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<Subscription>, AppError> {
    let endpoint = request.endpoint.trim();
    if endpoint.is_empty() {
        return Err(AppError::Validation("endpoint is required".to_string()));
    }
    if request.keys.p256dh.trim().is_empty() || request.keys.auth.trim().is_empty() {
        return Err(AppError::Validation(
            "keys.p256dh and keys.auth are required".to_string(),
        ));
    }

    let user_agent = request.user_agent.or_else(|| {
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let device_type = request
        .device_type
        .unwrap_or_else(|| DeviceType::from_user_agent(user_agent.as_deref()));

    let subscription = state
        .registry
        .register(&NewSubscription {
            user_id: auth.user_id,
            username: auth.username.clone(),
            role: auth.role,
            endpoint: endpoint.to_string(),
            p256dh: request.keys.p256dh.trim().to_string(),
            auth: request.keys.auth.trim().to_string(),
            device_type,
            user_agent,
        })
        .await?;

    Ok(Json(subscription))
}

/// POST /api/push/unsubscribe: Deactivate one of the caller's devices.
async fn unsubscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.endpoint.trim().is_empty() {
        return Err(AppError::Validation("endpoint is required".to_string()));
    }

    let removed = state
        .registry
        .deactivate_for_user(auth.user_id, request.endpoint.trim())
        .await?;

    Ok(Json(json!({ "success": true, "removed": removed })))
}

/// POST /api/push/send: Send a notification campaign (admin only).
async fn send(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(command): Json<SendCommand>,
) -> Result<Json<CampaignResult>, AppError> {
    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| AppError::Unavailable(PUSH_NOT_CONFIGURED.to_string()))?;

    let result = dispatcher.send(&command, &admin.issuer()).await?;
    Ok(Json(result))
}

/// POST /api/push/track: Delivered/clicked/failed report from a service worker.
async fn track(
    State(state): State<AppState>,
    Json(event): Json<TrackingEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.tracking.record(&event).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/push/campaigns: Most recent campaigns first (admin only).
async fn list_campaigns(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<Vec<Campaign>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let campaigns = state.recorder.list_recent(limit).await?;
    Ok(Json(campaigns))
}

/// GET /api/push/campaigns/:id: One campaign with its stats (admin only).
async fn get_campaign(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, AppError> {
    let campaign = state.recorder.get(id).await?;
    Ok(Json(campaign))
}
