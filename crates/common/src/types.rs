use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Error line reported when an audience resolves to nothing.
pub const NO_ACTIVE_SUBSCRIPTIONS: &str = "No active subscriptions found";

/// Application roles carried by users and copied onto their subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Kind of device a subscription was registered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    /// Best-effort guess from a browser user agent string.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent else {
            return DeviceType::Unknown;
        };
        let ua = ua.to_ascii_lowercase();
        if ua.is_empty() {
            DeviceType::Unknown
        } else if ua.contains("ipad") || ua.contains("tablet") {
            DeviceType::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Desktop => write!(f, "desktop"),
            DeviceType::Mobile => write!(f, "mobile"),
            DeviceType::Tablet => write!(f, "tablet"),
            DeviceType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A device's registered push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub endpoint: String,
    /// Client public key (URL-safe base64)
    pub p256dh: String,
    /// Client auth secret (URL-safe base64)
    pub auth: String,
    pub device_type: DeviceType,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for registering (or re-activating) a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub device_type: DeviceType,
    pub user_agent: Option<String>,
}

/// A clickable action rendered by the service worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Data block attached to every notification.
///
/// `url` is always present; `campaignId` once history is recorded. Any other
/// caller-supplied keys ride along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadData {
    pub url: String,
    #[serde(
        rename = "campaignId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub campaign_id: Option<Uuid>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Canonical, validated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub url: String,
    pub tag: String,
    pub require_interaction: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    pub data: PayloadData,
}

/// Wire envelope the service worker expects: `{"notification": {...}}`.
#[derive(Debug, Serialize)]
pub struct PushEnvelope<'a> {
    pub notification: PushNotification<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub icon: &'a str,
    pub badge: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<&'a str>,
    pub tag: &'a str,
    pub require_interaction: bool,
    pub actions: &'a [NotificationAction],
    pub data: &'a PayloadData,
}

impl NotificationPayload {
    pub fn envelope(&self) -> PushEnvelope<'_> {
        PushEnvelope {
            notification: PushNotification {
                title: &self.title,
                body: &self.body,
                icon: &self.icon,
                badge: &self.badge,
                image: self.image.as_deref(),
                tag: &self.tag,
                require_interaction: self.require_interaction,
                actions: &self.actions,
                data: &self.data,
            },
        }
    }

    /// Serialized envelope handed to the transport.
    pub fn to_push_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.envelope())
    }
}

/// Who a campaign is sent to. Both lists empty means everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceFilter {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

impl AudienceFilter {
    pub fn is_broadcast(&self) -> bool {
        self.roles.is_empty() && self.user_ids.is_empty()
    }

    pub fn matches(&self, subscription: &Subscription) -> bool {
        self.is_broadcast()
            || self.roles.contains(&subscription.role)
            || self.user_ids.contains(&subscription.user_id)
    }
}

/// Raw send command as received from an administrator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommand {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub tag: Option<String>,
    pub require_interaction: Option<bool>,
    pub actions: Option<Vec<NotificationAction>>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub target_roles: Option<Vec<Role>>,
    pub target_users: Option<Vec<Uuid>>,
    pub save_to_history: Option<bool>,
}

impl SendCommand {
    pub fn audience(&self) -> AudienceFilter {
        AudienceFilter {
            roles: self.target_roles.clone().unwrap_or_default(),
            user_ids: self.target_users.clone().unwrap_or_default(),
        }
    }

    /// History is recorded unless the caller opts out.
    pub fn record_history(&self) -> bool {
        self.save_to_history.unwrap_or(true)
    }
}

/// Identity of the administrator issuing a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    pub user_id: Uuid,
    pub username: String,
}

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Failed)
    }

    /// `pending -> sending -> {sent | failed}`; pending may also finish directly.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        match (self, next) {
            (CampaignStatus::Pending, CampaignStatus::Sending) => true,
            (CampaignStatus::Pending | CampaignStatus::Sending, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Pending => write!(f, "pending"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Sent => write!(f, "sent"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate delivery counters of a campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignStats {
    pub sent: i64,
    pub delivered: i64,
    pub clicked: i64,
    pub failed: i64,
}

/// A recorded campaign (one logical send).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub payload: Json<NotificationPayload>,
    pub audience: Json<AudienceFilter>,
    pub issued_by: Uuid,
    pub issued_by_name: String,
    pub status: CampaignStatus,
    #[sqlx(flatten)]
    pub stats: CampaignStats,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for recording a new campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub payload: NotificationPayload,
    pub audience: AudienceFilter,
    pub issuer: Issuer,
}

/// Additive counter update from the tracking flow. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub delivered: i64,
    pub clicked: i64,
    pub failed: i64,
}

/// How a failed delivery should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// The endpoint will never work again; prune it.
    Permanent,
    /// Anything else. Counted, never pruned, never retried.
    Transient,
}

/// Outcome of one delivery attempt. Lives only for the dispatch call.
#[derive(Debug, Clone)]
pub struct DeliveryAttemptResult {
    pub endpoint: String,
    pub username: String,
    pub success: bool,
    pub failure: Option<FailureClass>,
    pub error: Option<String>,
}

/// Result returned to the caller of a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResult {
    pub success: bool,
    pub sent: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
}

impl CampaignResult {
    pub fn no_recipients() -> Self {
        Self {
            success: false,
            sent: 0,
            failed: 0,
            errors: vec![NO_ACTIVE_SUBSCRIPTIONS.to_string()],
            campaign_id: None,
        }
    }

    pub fn terminal_status(&self) -> CampaignStatus {
        if self.success {
            CampaignStatus::Sent
        } else {
            CampaignStatus::Failed
        }
    }
}

/// Client acknowledgement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingEventKind {
    Delivered,
    Clicked,
    Failed,
}

impl TrackingEventKind {
    pub fn delta(self) -> StatsDelta {
        match self {
            TrackingEventKind::Delivered => StatsDelta {
                delivered: 1,
                ..StatsDelta::default()
            },
            TrackingEventKind::Clicked => StatsDelta {
                clicked: 1,
                ..StatsDelta::default()
            },
            TrackingEventKind::Failed => StatsDelta {
                failed: 1,
                ..StatsDelta::default()
            },
        }
    }
}

/// Asynchronous client report about a notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub campaign_id: Option<Uuid>,
    pub event: TrackingEventKind,
    pub endpoint: Option<String>,
}
