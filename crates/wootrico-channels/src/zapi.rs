//! Z-API gateway client
//!
//! Z-API routes everything through an instance/token URL pair and
//! authenticates with a `Client-Token` header. Media sends accept either a
//! URL or base64; documents are posted to a kind-specific endpoint whose
//! suffix is the file extension.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use wootrico_core::{is_group_identifier, MessageKind, PayloadOrigin};

use crate::error::{Error, Result};
use crate::outbound::{GatewayClient, OutboundAttachment, OutboundMessage};
use crate::util::{digits_only, infer_extension, truncate_body};

/// Default Z-API REST endpoint
const DEFAULT_BASE_URL: &str = "https://api.z-api.io";

/// Spacing between requests of a multi-attachment send
const ATTACHMENT_GAP: Duration = Duration::from_secs(2);

/// Timeout for text sends
const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for media sends
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

/// Z-API credentials
#[derive(Debug, Clone)]
pub struct ZapiConfig {
    /// Instance id
    pub instance: String,
    /// Instance token
    pub token: String,
    /// Account-level client token (`Client-Token` header)
    pub client_token: String,
    /// REST endpoint, overridable for tests
    pub base_url: String,
}

impl ZapiConfig {
    /// Create a config with the production endpoint
    #[must_use]
    pub fn new(
        instance: impl Into<String>,
        token: impl Into<String>,
        client_token: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            token: token.into(),
            client_token: client_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the REST endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Z-API gateway client
pub struct ZapiClient {
    config: ZapiConfig,
    client: reqwest::Client,
}

/// The `phone` wire value: group tokens verbatim, digits otherwise
fn wire_phone(recipient: &str) -> String {
    if is_group_identifier(recipient) {
        recipient.to_string()
    } else {
        digits_only(recipient)
    }
}

/// Body for a text send
fn text_body(phone: &str, message: &str, reply_to: Option<&str>) -> Value {
    let mut body = json!({ "phone": phone, "message": message });
    if let Some(id) = reply_to {
        body["messageId"] = json!(id);
    }
    body
}

/// Endpoint path and body for a media send
fn media_request(
    phone: &str,
    attachment: &OutboundAttachment,
    caption: &str,
    reply_to: Option<&str>,
) -> (String, Value) {
    let payload = attachment
        .url
        .clone()
        .or_else(|| attachment.base64.clone())
        .unwrap_or_default();

    let (path, mut body) = match attachment.kind {
        MessageKind::Image => (
            "send-image".to_string(),
            json!({ "phone": phone, "image": payload, "caption": caption }),
        ),
        MessageKind::Audio => (
            "send-audio".to_string(),
            json!({ "phone": phone, "audio": payload }),
        ),
        MessageKind::Video => (
            "send-video".to_string(),
            json!({ "phone": phone, "video": payload, "caption": caption }),
        ),
        MessageKind::Document | MessageKind::Text => {
            let extension =
                infer_extension(attachment.url.as_deref(), attachment.file_name.as_deref());
            (
                format!("send-document/{extension}"),
                json!({
                    "phone": phone,
                    "document": payload,
                    "fileName": attachment.file_name.clone().unwrap_or_default(),
                    "caption": caption,
                }),
            )
        }
    };
    if let Some(id) = reply_to {
        body["messageId"] = json!(id);
    }
    (path, body)
}

/// Pull the gateway message id out of a send response
fn extract_message_id(response: &Value) -> Option<String> {
    for key in ["messageId", "zaapId", "id"] {
        if let Some(id) = response.get(key).and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    None
}

impl ZapiClient {
    /// Create a new Z-API client
    pub fn new(config: ZapiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TEXT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// The instance id this client is bound to
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.config.instance
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/instances/{}/token/{}/{path}",
            self.config.base_url.trim_end_matches('/'),
            self.config.instance,
            self.config.token
        )
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("Client-Token", &self.config.client_token)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }
        serde_json::from_str(&text).map_err(|e| Error::Payload(format!("invalid response: {e}")))
    }
}

#[async_trait::async_trait]
impl GatewayClient for ZapiClient {
    fn dialect(&self) -> PayloadOrigin {
        PayloadOrigin::Zapi
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Vec<String>> {
        let phone = wire_phone(&message.recipient);
        let mut sent_ids = Vec::new();

        if message.attachments.is_empty() {
            let body = text_body(&phone, &message.content, message.reply_to.as_deref());
            let response = self.post("send-text", &body, TEXT_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
            return Ok(sent_ids);
        }

        for (index, attachment) in message.attachments.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(ATTACHMENT_GAP).await;
            }
            let caption = if index == 0 { message.content.as_str() } else { "" };
            let (path, body) =
                media_request(&phone, attachment, caption, message.reply_to.as_deref());
            debug!(instance = %self.config.instance, %path, "sending media via Z-API");
            let response = self.post(&path, &body, MEDIA_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
        }
        Ok(sent_ids)
    }

    async fn delete_message(&self, provider_msg_id: &str, recipient: Option<&str>) -> Result<()> {
        let recipient = recipient.ok_or(Error::MissingRecipient)?;
        let phone = wire_phone(recipient);
        let url = format!(
            "{}?messageId={provider_msg_id}&phone={phone}&owner=true",
            self.endpoint("messages")
        );

        let response = self
            .client
            .delete(&url)
            .header("Client-Token", &self.config.client_token)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%provider_msg_id, status = status.as_u16(), "Z-API delete failed");
            return Err(Error::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        Ok(())
    }
}
