//! Payload builder: validates a raw send command and normalizes it into a
//! canonical [`NotificationPayload`].
//!
//! Pure: no I/O, deterministic for a given input.

use std::collections::BTreeMap;

use uuid::Uuid;

use pushfleet_common::error::AppError;
use pushfleet_common::types::{NotificationPayload, PayloadData, SendCommand};

pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/icons/badge-72x72.png";
pub const DEFAULT_TAG: &str = "general";
pub const DEFAULT_URL: &str = "/";

/// Builder for canonical notification payloads.
#[derive(Debug, Clone, Copy)]
pub struct PayloadBuilder;

impl PayloadBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validate `command` and fill in defaults.
    ///
    /// Fails with [`AppError::Validation`] naming the field when `title` or
    /// `body` is missing or blank.
    pub fn build(&self, command: &SendCommand) -> Result<NotificationPayload, AppError> {
        let title = Self::required(command.title.as_deref(), "title")?;
        let body = Self::required(command.body.as_deref(), "body")?;

        let mut extra: BTreeMap<String, serde_json::Value> = command
            .data
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        // Reserved keys live in typed fields
        let data_url = extra.remove("url");
        extra.remove("campaignId");

        let url = Self::optional(command.url.as_deref())
            .or_else(|| {
                data_url
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .and_then(|s| Self::optional(Some(s)))
            })
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(NotificationPayload {
            title,
            body,
            icon: Self::optional(command.icon.as_deref())
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            badge: Self::optional(command.badge.as_deref())
                .unwrap_or_else(|| DEFAULT_BADGE.to_string()),
            image: Self::optional(command.image.as_deref()),
            url: url.clone(),
            tag: Self::optional(command.tag.as_deref()).unwrap_or_else(|| DEFAULT_TAG.to_string()),
            require_interaction: command.require_interaction.unwrap_or(false),
            actions: command.actions.clone().unwrap_or_default(),
            data: PayloadData {
                url,
                campaign_id: None,
                extra,
            },
        })
    }

    /// Fold a campaign id into the payload's data block.
    pub fn with_campaign_id(
        &self,
        mut payload: NotificationPayload,
        campaign_id: Uuid,
    ) -> NotificationPayload {
        payload.data.campaign_id = Some(campaign_id);
        payload
    }

    fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
        Self::optional(value).ok_or_else(|| AppError::Validation(format!("{} is required", field)))
    }

    fn optional(value: Option<&str>) -> Option<String> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushfleet_common::types::NotificationAction;

    fn command(title: Option<&str>, body: Option<&str>) -> SendCommand {
        SendCommand {
            title: title.map(str::to_string),
            body: body.map(str::to_string),
            ..SendCommand::default()
        }
    }

    #[test]
    fn test_missing_title_rejected() {
        let err = PayloadBuilder::new()
            .build(&command(None, Some("body")))
            .unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("title")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_blank_body_rejected() {
        let err = PayloadBuilder::new()
            .build(&command(Some("Title"), Some("   ")))
            .unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("body")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_defaults_filled() {
        let payload = PayloadBuilder::new()
            .build(&command(Some("  Title "), Some("Body")))
            .unwrap();
        assert_eq!(payload.title, "Title");
        assert_eq!(payload.icon, DEFAULT_ICON);
        assert_eq!(payload.badge, DEFAULT_BADGE);
        assert_eq!(payload.tag, DEFAULT_TAG);
        assert_eq!(payload.url, "/");
        assert_eq!(payload.data.url, "/");
        assert!(payload.data.campaign_id.is_none());
        assert!(!payload.require_interaction);
        assert!(payload.actions.is_empty());
    }

    #[test]
    fn test_caller_data_merged_with_url() {
        let mut cmd = command(Some("Title"), Some("Body"));
        cmd.url = Some("/orders/7".to_string());
        cmd.data = Some(
            serde_json::json!({"orderId": 7, "url": "/ignored", "campaignId": "bogus"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        cmd.actions = Some(vec![NotificationAction {
            action: "view".to_string(),
            title: "View".to_string(),
            icon: Some("/icons/view.png".to_string()),
        }]);

        let payload = PayloadBuilder::new().build(&cmd).unwrap();
        assert_eq!(payload.data.url, "/orders/7");
        assert_eq!(payload.data.extra.get("orderId"), Some(&serde_json::json!(7)));
        assert!(!payload.data.extra.contains_key("url"));
        assert!(!payload.data.extra.contains_key("campaignId"));
        assert_eq!(payload.actions, cmd.actions.unwrap());
    }

    #[test]
    fn test_data_url_used_when_top_level_absent() {
        let mut cmd = command(Some("Title"), Some("Body"));
        cmd.data = Some(
            serde_json::json!({"url": "/reports"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let payload = PayloadBuilder::new().build(&cmd).unwrap();
        assert_eq!(payload.url, "/reports");
        assert_eq!(payload.data.url, "/reports");
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut cmd = command(Some("Title"), Some("Body"));
        cmd.tag = Some("inventory".to_string());
        let builder = PayloadBuilder::new();
        assert_eq!(builder.build(&cmd).unwrap(), builder.build(&cmd).unwrap());
    }

    #[test]
    fn test_with_campaign_id() {
        let builder = PayloadBuilder::new();
        let payload = builder.build(&command(Some("T"), Some("B"))).unwrap();
        let id = Uuid::new_v4();
        let payload = builder.with_campaign_id(payload, id);
        assert_eq!(payload.data.campaign_id, Some(id));
        assert_eq!(payload.data.url, "/");
    }
}
