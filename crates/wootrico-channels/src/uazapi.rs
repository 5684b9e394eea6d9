//! UAZAPI gateway client
//!
//! UAZAPI authenticates with a `token` header against a per-instance base
//! URL. Webhook payloads do not inline media; bytes are fetched through
//! `/message/download`, which this client also exposes as the bridge-wide
//! [`MediaDownload`] hook.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wootrico_core::{is_group_identifier, MediaDownload, MessageKind, PayloadOrigin};

use crate::error::{Error, Result};
use crate::outbound::{GatewayClient, OutboundAttachment, OutboundMessage};
use crate::util::{decode_base64, digits_only, truncate_body};

/// Spacing between requests of a multi-attachment send
const ATTACHMENT_GAP: Duration = Duration::from_secs(2);

/// Timeout for text sends
const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for media sends
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for media downloads
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Download retry schedule: up to 5 attempts, 2 s apart
const DOWNLOAD_ATTEMPTS: u32 = 5;
const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(2);

/// UAZAPI credentials
#[derive(Debug, Clone)]
pub struct UazapiConfig {
    /// Instance base URL
    pub base_url: String,
    /// Instance token (`token` header)
    pub token: String,
    /// Phone number the instance is connected as
    pub number: String,
}

impl UazapiConfig {
    /// Create a new config
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            number: number.into(),
        }
    }
}

/// UAZAPI gateway client
pub struct UazapiClient {
    config: UazapiConfig,
    client: reqwest::Client,
}

/// The `number` wire value: group chat ids verbatim, digits otherwise
fn wire_number(recipient: &str) -> String {
    if is_group_identifier(recipient) {
        recipient.to_string()
    } else {
        digits_only(recipient)
    }
}

/// The `type` wire value for a media send
fn media_type(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "image",
        MessageKind::Audio => "audio",
        MessageKind::Video => "video",
        MessageKind::Document | MessageKind::Text => "document",
    }
}

/// Body for a text send
fn text_body(number: &str, text: &str, reply_to: Option<&str>) -> Value {
    let mut body = json!({ "number": number, "text": text });
    if let Some(id) = reply_to {
        body["replyid"] = json!(id);
    }
    body
}

/// Body for a media send
fn media_body(
    number: &str,
    attachment: &OutboundAttachment,
    caption: &str,
    reply_to: Option<&str>,
) -> Value {
    let file = attachment
        .url
        .clone()
        .or_else(|| attachment.base64.clone())
        .unwrap_or_default();
    let mut body = json!({
        "number": number,
        "type": media_type(attachment.kind),
        "file": file,
        "text": caption,
    });
    if let Some(name) = &attachment.file_name {
        body["docName"] = json!(name);
    }
    if let Some(id) = reply_to {
        body["replyid"] = json!(id);
    }
    body
}

/// Pull the gateway message id out of a send response
fn extract_message_id(response: &Value) -> Option<String> {
    for key in ["messageid", "id"] {
        if let Some(id) = response.get(key).and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    response
        .pointer("/message/id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Whether a download failure is worth another attempt
fn download_retryable(error: &Error) -> bool {
    match error {
        Error::Network(_) => true,
        Error::Api { status, .. } => matches!(status, 404 | 502 | 503),
        Error::Media(_) => true,
        _ => false,
    }
}

impl UazapiClient {
    /// Create a new UAZAPI client
    pub fn new(config: UazapiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TEXT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Normalized digits of the number this instance is connected as
    #[must_use]
    pub fn connected_number(&self) -> String {
        digits_only(&self.config.number)
    }

    /// The instance base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("token", &self.config.token)
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

    /// One `/message/download` attempt
    async fn download_once(&self, provider_msg_id: &str) -> Result<Vec<u8>> {
        let body = json!({
            "id": provider_msg_id,
            "return_base64": true,
            "return_link": false,
        });
        let response = self.post("message/download", &body, DOWNLOAD_TIMEOUT).await?;

        let encoded = response
            .get("base64")
            .or_else(|| response.get("file"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if encoded.is_empty() {
            return Err(Error::Media("empty download body".to_string()));
        }
        decode_base64(encoded)
    }

    /// Download media bytes for a gateway message id, with retries
    pub async fn download_media(&self, provider_msg_id: &str) -> Result<Vec<u8>> {
        let mut last_error = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.download_once(provider_msg_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if download_retryable(&e) && attempt < DOWNLOAD_ATTEMPTS => {
                    debug!(%provider_msg_id, attempt, error = %e, "media download retry");
                    last_error = Some(e);
                    tokio::time::sleep(DOWNLOAD_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Media("download failed".to_string())))
    }
}

#[async_trait]
impl GatewayClient for UazapiClient {
    fn dialect(&self) -> PayloadOrigin {
        PayloadOrigin::Uazapi
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Vec<String>> {
        let number = wire_number(&message.recipient);
        let mut sent_ids = Vec::new();

        if message.attachments.is_empty() {
            let body = text_body(&number, &message.content, message.reply_to.as_deref());
            let response = self.post("send/text", &body, TEXT_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
            return Ok(sent_ids);
        }

        for (index, attachment) in message.attachments.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(ATTACHMENT_GAP).await;
            }
            let caption = if index == 0 { message.content.as_str() } else { "" };
            let body = media_body(&number, attachment, caption, message.reply_to.as_deref());
            let response = self.post("send/media", &body, MEDIA_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
        }
        Ok(sent_ids)
    }

    async fn delete_message(&self, provider_msg_id: &str, _recipient: Option<&str>) -> Result<()> {
        let body = json!({ "id": provider_msg_id });
        if let Err(e) = self.post("message/delete", &body, TEXT_TIMEOUT).await {
            warn!(%provider_msg_id, error = %e, "UAZAPI delete failed");
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaDownload for UazapiClient {
    async fn download(&self, provider_msg_id: &str) -> wootrico_core::Result<Vec<u8>> {
        self.download_media(provider_msg_id)
            .await
            .map_err(|e| wootrico_core::Error::Download(e.to_string()))
    }
}
