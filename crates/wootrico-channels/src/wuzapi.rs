//! Wuzapi gateway client
//!
//! Wuzapi is a whatsmeow REST front: capitalized JSON fields, a `Token`
//! header, and media accepted only as `data:` base64 URIs. Attachments that
//! arrive from the helpdesk as URLs are downloaded and re-encoded before
//! posting.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wootrico_core::{is_group_identifier, MessageKind, PayloadOrigin};

use crate::error::{Error, Result};
use crate::outbound::{GatewayClient, OutboundAttachment, OutboundMessage};
use crate::util::{digits_only, strip_data_uri, truncate_body};

/// Spacing between requests of a multi-attachment send
const ATTACHMENT_GAP: Duration = Duration::from_secs(2);

/// Timeout for text sends
const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for media sends
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for fetching a URL attachment
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// URL-attachment fetch schedule: up to 3 attempts, 2 s apart
const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Wuzapi credentials
#[derive(Debug, Clone)]
pub struct WuzapiConfig {
    /// Instance base URL
    pub base_url: String,
    /// User token (`Token` header)
    pub token: String,
}

impl WuzapiConfig {
    /// Create a new config
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

/// Wuzapi gateway client
pub struct WuzapiClient {
    config: WuzapiConfig,
    client: reqwest::Client,
}

/// The `Phone` wire value: group chat ids verbatim, digits otherwise
fn wire_phone(recipient: &str) -> String {
    if is_group_identifier(recipient) {
        recipient.to_string()
    } else {
        digits_only(recipient)
    }
}

/// Fallback MIME type per kind, for building `data:` URIs
fn default_mime(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "image/jpeg",
        MessageKind::Audio => "audio/ogg",
        MessageKind::Video => "video/mp4",
        MessageKind::Document | MessageKind::Text => "application/octet-stream",
    }
}

/// Wrap a base64 payload in the `data:` URI Wuzapi expects
fn data_uri(attachment: &OutboundAttachment, encoded: &str) -> String {
    if encoded.starts_with("data:") {
        return encoded.to_string();
    }
    let mime = attachment
        .mime_type
        .as_deref()
        .unwrap_or_else(|| default_mime(attachment.kind));
    format!("data:{mime};base64,{encoded}")
}

/// Endpoint path and body for a media send
fn media_request(phone: &str, attachment: &OutboundAttachment, payload: &str, caption: &str) -> (&'static str, Value) {
    match attachment.kind {
        MessageKind::Image => (
            "chat/send/image",
            json!({ "Phone": phone, "Image": payload, "Caption": caption }),
        ),
        MessageKind::Audio => (
            "chat/send/audio",
            json!({ "Phone": phone, "Audio": payload }),
        ),
        MessageKind::Video => (
            "chat/send/video",
            json!({ "Phone": phone, "Video": payload, "Caption": caption }),
        ),
        MessageKind::Document | MessageKind::Text => (
            "chat/send/document",
            json!({
                "Phone": phone,
                "Document": payload,
                "FileName": attachment.file_name.clone().unwrap_or_default(),
            }),
        ),
    }
}

/// Body for a text send
fn text_body(phone: &str, content: &str, reply_to: Option<&str>, participant: Option<&str>) -> Value {
    let mut body = json!({ "Phone": phone, "Body": content });
    if let Some(stanza) = reply_to {
        let mut context = json!({ "StanzaId": stanza });
        if let Some(participant) = participant {
            context["Participant"] = json!(participant);
        }
        body["ContextInfo"] = context;
    }
    body
}

/// Pull the gateway message id out of a send response
fn extract_message_id(response: &Value) -> Option<String> {
    response
        .pointer("/data/Id")
        .or_else(|| response.get("Id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl WuzapiClient {
    /// Create a new Wuzapi client
    pub fn new(config: WuzapiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TEXT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
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
            .header("Token", &self.config.token)
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

    /// Fetch a URL attachment and return its bytes as base64
    async fn fetch_as_base64(&self, url: &str) -> Result<String> {
        let mut last_error = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            let result = async {
                let response = self
                    .client
                    .get(url)
                    .timeout(FETCH_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| Error::Network(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Api {
                        status: status.as_u16(),
                        body: String::new(),
                    });
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Network(e.to_string()))?;
                Ok(STANDARD.encode(&bytes))
            }
            .await;

            match result {
                Ok(encoded) => return Ok(encoded),
                Err(e) if e.is_retryable() && attempt < FETCH_ATTEMPTS => {
                    debug!(%url, attempt, error = %e, "attachment fetch retry");
                    last_error = Some(e);
                    tokio::time::sleep(FETCH_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Media("attachment fetch failed".to_string())))
    }

    /// Resolve an attachment to the base64 payload Wuzapi accepts
    async fn attachment_payload(&self, attachment: &OutboundAttachment) -> Result<String> {
        if let Some(encoded) = &attachment.base64 {
            return Ok(data_uri(attachment, strip_data_uri(encoded)));
        }
        if let Some(url) = &attachment.url {
            let encoded = self.fetch_as_base64(url).await?;
            return Ok(data_uri(attachment, &encoded));
        }
        Err(Error::Media("attachment carries neither url nor base64".to_string()))
    }
}

#[async_trait::async_trait]
impl GatewayClient for WuzapiClient {
    fn dialect(&self) -> PayloadOrigin {
        PayloadOrigin::Wuzapi
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Vec<String>> {
        let phone = wire_phone(&message.recipient);
        let mut sent_ids = Vec::new();

        if message.attachments.is_empty() {
            let body = text_body(
                &phone,
                &message.content,
                message.reply_to.as_deref(),
                message.jid.as_deref(),
            );
            let response = self.post("chat/send/text", &body, TEXT_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
            return Ok(sent_ids);
        }

        for (index, attachment) in message.attachments.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(ATTACHMENT_GAP).await;
            }
            let caption = if index == 0 { message.content.as_str() } else { "" };
            let payload = self.attachment_payload(attachment).await?;
            let (path, body) = media_request(&phone, attachment, &payload, caption);
            let response = self.post(path, &body, MEDIA_TIMEOUT).await?;
            sent_ids.extend(extract_message_id(&response));
        }
        Ok(sent_ids)
    }

    async fn delete_message(&self, provider_msg_id: &str, _recipient: Option<&str>) -> Result<()> {
        let body = json!({ "MessageId": provider_msg_id });
        if let Err(e) = self.post("chat/delete", &body, TEXT_TIMEOUT).await {
            warn!(%provider_msg_id, error = %e, "Wuzapi delete failed");
            return Err(e);
        }
        Ok(())
    }
}
