//! Slack Web API client.
//!
//! Thin REST wrapper over the handful of methods the bot needs. Every
//! response is checked for Slack's `"ok"` envelope field; an `ok: false`
//! body surfaces the `error` string.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::warn;

use crate::config::MessageTemplate;
use crate::error::{DirectoryError, SlackError};
use crate::scheduler::Outbound;

/// Slack Web API base URL.
const SLACK_API_BASE: &str = "https://slack.com/api";

/// Page size for `conversations.list`.
const CHANNEL_PAGE_LIMIT: &str = "200";

/// Maximum pages fetched from `conversations.list`.
const MAX_CHANNEL_PAGES: usize = 50;

/// Bot identity resolved via `auth.test`.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: String,
    pub user: Option<String>,
}

/// Web API client holding the bot token.
pub struct SlackApi {
    http: reqwest::Client,
    bot_token: SecretString,
}

impl SlackApi {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
        }
    }

    fn api_url(method: &str) -> String {
        format!("{SLACK_API_BASE}/{method}")
    }

    /// POST a JSON body to a Web API method and return the checked body.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, SlackError> {
        let resp = self
            .http
            .post(Self::api_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| SlackError::http(method, e))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| SlackError::http(method, e))?;
        check_ok(method, body)
    }

    /// Confirm credentials and resolve the bot's identity.
    pub async fn auth_test(&self) -> Result<BotIdentity, SlackError> {
        let body = self.call("auth.test", &json!({})).await?;
        let user_id = body["user_id"]
            .as_str()
            .ok_or_else(|| SlackError::api("auth.test", "no user_id in response"))?
            .to_string();
        let user = body["user"].as_str().map(String::from);
        Ok(BotIdentity { user_id, user })
    }

    /// List all public and private channels the bot can see, following
    /// pagination cursors up to a page cap.
    pub async fn list_channels(&self) -> Result<Vec<(String, String)>, DirectoryError> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1.. {
            let mut query = vec![
                ("types", "public_channel,private_channel".to_string()),
                ("limit", CHANNEL_PAGE_LIMIT.to_string()),
            ];
            if let Some(ref next) = cursor {
                query.push(("cursor", next.clone()));
            }

            let resp = self
                .http
                .get(Self::api_url("conversations.list"))
                .bearer_auth(self.bot_token.expose_secret())
                .query(&query)
                .send()
                .await
                .map_err(|e| DirectoryError::ListFailed(e.to_string()))?;

            let body: Value = resp
                .json()
                .await
                .map_err(|e| DirectoryError::ListFailed(e.to_string()))?;
            let body = check_ok("conversations.list", body)
                .map_err(|e| DirectoryError::ListFailed(e.to_string()))?;

            if let Some(list) = body["channels"].as_array() {
                for channel in list {
                    if let (Some(id), Some(name)) =
                        (channel["id"].as_str(), channel["name"].as_str())
                    {
                        channels.push((id.to_string(), name.to_string()));
                    }
                }
            }

            cursor = body["response_metadata"]["next_cursor"]
                .as_str()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToOwned::to_owned);

            if cursor.is_none() {
                break;
            }
            if page >= MAX_CHANNEL_PAGES {
                warn!(
                    pages = MAX_CHANNEL_PAGES,
                    "conversations.list reached page limit; channel list may be incomplete"
                );
                break;
            }
        }

        Ok(channels)
    }

    /// Call `apps.connections.open` (app-token auth) for a Socket Mode
    /// WebSocket URL.
    pub async fn connections_open(&self, app_token: &SecretString) -> Result<String, SlackError> {
        let method = "apps.connections.open";
        let resp = self
            .http
            .post(Self::api_url(method))
            .bearer_auth(app_token.expose_secret())
            .send()
            .await
            .map_err(|e| SlackError::http(method, e))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| SlackError::http(method, e))?;
        let body = check_ok(method, body)?;

        let url = body["url"]
            .as_str()
            .ok_or_else(|| SlackError::api(method, "no url in response"))?;
        if !url.starts_with("wss://") {
            return Err(SlackError::api(method, format!("unexpected URL: {url}")));
        }
        Ok(url.to_string())
    }
}

/// Reject non-`ok` Slack responses, passing the body through otherwise.
fn check_ok(method: &str, body: Value) -> Result<Value, SlackError> {
    if body["ok"].as_bool() == Some(true) {
        Ok(body)
    } else {
        let error = body["error"].as_str().unwrap_or("unknown").to_string();
        Err(SlackError::api(method, error))
    }
}

/// Build a send body from a template plus addressing fields.
///
/// Template keys are copied verbatim (`text`, `blocks`, and any extras);
/// addressing fields are applied last.
fn build_send_body(template: &MessageTemplate, fields: &[(&str, &str)]) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(ref text) = template.text {
        body.insert("text".to_string(), json!(text));
    }
    if let Some(ref blocks) = template.blocks {
        body.insert("blocks".to_string(), blocks.clone());
    }
    for (key, value) in &template.extra {
        body.insert(key.clone(), value.clone());
    }
    for (key, value) in fields {
        body.insert((*key).to_string(), json!(value));
    }
    Value::Object(body)
}

#[async_trait]
impl Outbound for SlackApi {
    async fn post_thread_message(
        &self,
        channel: &str,
        thread_ts: &str,
        template: &MessageTemplate,
    ) -> Result<(), SlackError> {
        let body = build_send_body(template, &[("channel", channel), ("thread_ts", thread_ts)]);
        self.call("chat.postMessage", &body).await.map(|_| ())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        template: &MessageTemplate,
    ) -> Result<(), SlackError> {
        let body = build_send_body(template, &[("channel", channel), ("user", user)]);
        self.call("chat.postEphemeral", &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_shape() {
        assert_eq!(
            SlackApi::api_url("chat.postMessage"),
            "https://slack.com/api/chat.postMessage"
        );
    }

    #[test]
    fn check_ok_passes_ok_body() {
        let body = check_ok("auth.test", json!({"ok": true, "user_id": "U1"})).unwrap();
        assert_eq!(body["user_id"], "U1");
    }

    #[test]
    fn check_ok_surfaces_error_string() {
        let err = check_ok("chat.postMessage", json!({"ok": false, "error": "not_in_channel"}))
            .unwrap_err();
        assert!(matches!(err, SlackError::Api { .. }));
        assert!(err.to_string().contains("not_in_channel"));
    }

    #[test]
    fn check_ok_rejects_missing_ok_field() {
        assert!(check_ok("auth.test", json!({"user_id": "U1"})).is_err());
    }

    #[test]
    fn send_body_includes_text_and_addressing() {
        let template = MessageTemplate {
            text: Some("follow-up".into()),
            ..Default::default()
        };
        let body = build_send_body(&template, &[("channel", "C01"), ("thread_ts", "100.0")]);

        assert_eq!(body["channel"], "C01");
        assert_eq!(body["thread_ts"], "100.0");
        assert_eq!(body["text"], "follow-up");
        assert!(body.get("blocks").is_none());
    }

    #[test]
    fn send_body_includes_blocks_and_extras() {
        let template = MessageTemplate {
            text: Some("hi".into()),
            blocks: Some(json!([{"type": "section"}])),
            extra: {
                let mut extra = serde_json::Map::new();
                extra.insert("unfurl_links".into(), json!(false));
                extra
            },
        };
        let body = build_send_body(&template, &[("channel", "C01"), ("user", "U5")]);

        assert_eq!(body["user"], "U5");
        assert_eq!(body["blocks"][0]["type"], "section");
        assert_eq!(body["unfurl_links"], json!(false));
    }

    #[test]
    fn addressing_fields_override_template_extras() {
        let template = MessageTemplate {
            text: Some("hi".into()),
            blocks: None,
            extra: {
                let mut extra = serde_json::Map::new();
                extra.insert("channel".into(), json!("C-overridden"));
                extra
            },
        };
        let body = build_send_body(&template, &[("channel", "C01")]);
        assert_eq!(body["channel"], "C01");
    }
}
