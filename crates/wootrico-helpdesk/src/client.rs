//! Helpdesk REST client
//!
//! One instance per tenant, bound to one account and one target inbox. All
//! calls go through the account-scoped API with the `api_access_token`
//! header. Media posting serializes through a per-client throttle so two
//! uploads from the same tenant never overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wootrico_core::{is_strict_e164, MediaDownload, MessageKind, PayloadOrigin};

use crate::error::{Error, Result};
use crate::sidecar;
use crate::types::{
    Contact, ContactSeed, Conversation, ConversationStatus, Direction, Inbox, OutgoingMedia,
};

/// Auth header the helpdesk expects
const AUTH_HEADER: &str = "api_access_token";

/// Timeout for plain JSON calls
const TEXT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for multipart media uploads
const MEDIA_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for fetching media and avatars from a URL
const MEDIA_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Media upload schedule: up to 3 attempts with linear backoff
const MEDIA_POST_ATTEMPTS: u32 = 3;
const MEDIA_RETRY_STEP: Duration = Duration::from_secs(2);

/// URL download schedule for media and avatars
const DOWNLOAD_ATTEMPTS: u32 = 3;
const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Conversation scans stop after this many pages
const SCAN_PAGE_LIMIT: u32 = 50;

/// Default minimum spacing between media sends
const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Per-tenant helpdesk binding
#[derive(Debug, Clone)]
pub struct HelpdeskConfig {
    /// Helpdesk base URL
    pub base_url: String,
    /// Account API token
    pub api_token: String,
    /// Account id
    pub account_id: String,
    /// Target inbox name
    pub inbox_name: String,
    /// Sidecar file holding the adopted inbox id
    pub sidecar_path: PathBuf,
    /// Reopen resolved conversations on new inbound activity
    pub reopen_resolved: bool,
    /// Status newly created conversations start in
    pub initial_status: ConversationStatus,
    /// Callback URL advertised when the inbox is created
    pub webhook_url: String,
    /// Minimum spacing between media sends
    pub throttle: Duration,
}

impl HelpdeskConfig {
    /// Create a config with the default throttle
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        inbox_name: impl Into<String>,
    ) -> Self {
        let account_id = account_id.into();
        let inbox_name = inbox_name.into();
        let sidecar_path =
            PathBuf::from(format!("/app/data/app-data-{account_id}-{inbox_name}.json"));
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            account_id,
            inbox_name,
            sidecar_path,
            reopen_resolved: false,
            initial_status: ConversationStatus::Open,
            webhook_url: String::new(),
            throttle: DEFAULT_THROTTLE,
        }
    }

    /// Override the sidecar file path
    #[must_use]
    pub fn with_sidecar_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sidecar_path = path.into();
        self
    }

    /// Set the reopen policy
    #[must_use]
    pub fn with_reopen_resolved(mut self, reopen: bool) -> Self {
        self.reopen_resolved = reopen;
        self
    }

    /// Set the initial conversation status
    #[must_use]
    pub fn with_initial_status(mut self, status: ConversationStatus) -> Self {
        self.initial_status = status;
        self
    }

    /// Set the advertised callback URL
    #[must_use]
    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = url.into();
        self
    }

    /// Override the media-send throttle
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

/// Per-tenant helpdesk client
pub struct HelpdeskClient {
    config: HelpdeskConfig,
    client: reqwest::Client,
    inbox_id: std::sync::Mutex<Option<i64>>,
    media_downloader: Option<Arc<dyn MediaDownload>>,
    throttle_gate: tokio::sync::Mutex<Option<Instant>>,
}

/// Pick the contact that matches the identifier under the search rules:
/// strict E.164 identifiers match on `phone_number`, everything else
/// (groups, lids, jids) matches on `identifier`.
fn pick_contact(candidates: Vec<Contact>, identifier: &str) -> Option<Contact> {
    if is_strict_e164(identifier) {
        candidates
            .into_iter()
            .find(|c| c.phone_number.as_deref() == Some(identifier))
    } else {
        candidates
            .into_iter()
            .find(|c| c.identifier.as_deref() == Some(identifier))
    }
}

/// Default upload file name per kind
fn default_file_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "image.jpg",
        MessageKind::Audio => "audio.ogg",
        MessageKind::Video => "video.mp4",
        MessageKind::Document | MessageKind::Text => "document.pdf",
    }
}

/// Default MIME type per kind
fn default_mime(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "image/jpeg",
        MessageKind::Audio => "audio/ogg",
        MessageKind::Video => "video/mp4",
        MessageKind::Document | MessageKind::Text => "application/octet-stream",
    }
}

/// Decode inline base64 media, tolerating a `data:` prefix and whitespace
fn decode_inline_base64(raw: &str) -> Result<Vec<u8>> {
    let body = raw
        .split_once(',')
        .map_or(raw, |(head, rest)| if head.starts_with("data:") { rest } else { raw });
    let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Media(format!("invalid base64 media: {e}")))
}

/// Conversation list payloads arrive either under `data.payload` or
/// `payload` depending on the endpoint
fn list_payload(response: &Value) -> Vec<Value> {
    response
        .pointer("/data/payload")
        .or_else(|| response.get("payload"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl HelpdeskClient {
    /// Create a new helpdesk client
    pub fn new(config: HelpdeskConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TEXT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            inbox_id: std::sync::Mutex::new(None),
            media_downloader: None,
            throttle_gate: tokio::sync::Mutex::new(None),
        })
    }

    /// Wire the gateway media-download hook (set when the tenant's gateway
    /// requires a separate fetch)
    pub fn set_media_downloader(&mut self, downloader: Arc<dyn MediaDownload>) {
        self.media_downloader = Some(downloader);
    }

    /// The configured inbox name
    #[must_use]
    pub fn inbox_name(&self) -> &str {
        &self.config.inbox_name
    }

    /// The adopted inbox id, when discovery already ran
    #[must_use]
    pub fn inbox_id(&self) -> Option<i64> {
        *self.inbox_id.lock().expect("inbox lock poisoned")
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{path}",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_id
        )
    }

    async fn read_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !status.is_success() {
            let mut body = text;
            if body.len() > 300 {
                let mut end = 300;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::Payload(format!("invalid response: {e}")))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(self.account_url(path))
            .header(AUTH_HEADER, &self.config.api_token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        self.read_response(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.account_url(path))
            .header(AUTH_HEADER, &self.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        self.read_response(response).await
    }

    // ------------------------------------------------------------------
    // Inbox
    // ------------------------------------------------------------------

    /// Discover or create the tenant's inbox, caching the adopted id
    pub async fn ensure_inbox(&self) -> Result<i64> {
        if let Some(id) = self.inbox_id() {
            return Ok(id);
        }
        let id = self.discover_inbox().await?;
        *self.inbox_id.lock().expect("inbox lock poisoned") = Some(id);
        Ok(id)
    }

    async fn discover_inbox(&self) -> Result<i64> {
        // 1. A sidecar record short-circuits discovery, as long as the stored
        //    inbox still carries the configured name.
        if let Some(record) = sidecar::read(&self.config.sidecar_path) {
            match self.fetch_inbox(record.inbox_id).await {
                Ok(inbox) if inbox.name.eq_ignore_ascii_case(&self.config.inbox_name) => {
                    info!(inbox_id = inbox.id, "adopted inbox from sidecar file");
                    return Ok(inbox.id);
                }
                Ok(inbox) => {
                    debug!(
                        inbox_id = inbox.id,
                        stored = %inbox.name,
                        configured = %self.config.inbox_name,
                        "sidecar inbox name differs, rediscovering"
                    );
                }
                Err(e) => warn!(error = %e, "sidecar inbox fetch failed, rediscovering"),
            }
        }

        // 2. Match the configured name against the account's inboxes.
        let response = self.get_json("/inboxes", &[]).await?;
        let inboxes: Vec<Inbox> = serde_json::from_value(Value::Array(list_payload(&response)))
            .map_err(|e| Error::Payload(format!("invalid inbox list: {e}")))?;
        if let Some(found) = inboxes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(&self.config.inbox_name))
        {
            info!(inbox_id = found.id, name = %found.name, "adopted existing inbox");
            sidecar::write(&self.config.sidecar_path, found.id, &found.name)?;
            return Ok(found.id);
        }

        // 3. Create an API-channel inbox pointed at the bridge's callback.
        let body = json!({
            "name": self.config.inbox_name,
            "channel": { "type": "api", "webhook_url": self.config.webhook_url },
            "allow_messages_after_resolved": self.config.reopen_resolved,
        });
        let created = self.post_json("/inboxes", &body).await?;
        let id = created
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(Error::MissingField("inbox id"))?;
        info!(inbox_id = id, name = %self.config.inbox_name, "created inbox");
        sidecar::write(&self.config.sidecar_path, id, &self.config.inbox_name)?;
        Ok(id)
    }

    async fn fetch_inbox(&self, id: i64) -> Result<Inbox> {
        let response = self.get_json(&format!("/inboxes/{id}"), &[]).await?;
        serde_json::from_value(response).map_err(|e| Error::Payload(format!("invalid inbox: {e}")))
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Find a contact by identifier, creating it on miss
    pub async fn find_or_create_contact(&self, seed: &ContactSeed) -> Result<Contact> {
        let response = self
            .get_json("/contacts/search", &[("q", seed.identifier.clone())])
            .await?;
        let candidates: Vec<Contact> =
            serde_json::from_value(Value::Array(list_payload(&response)))
                .map_err(|e| Error::Payload(format!("invalid contact list: {e}")))?;
        if let Some(existing) = pick_contact(candidates, &seed.identifier) {
            return Ok(existing);
        }
        self.create_contact(seed).await
    }

    async fn create_contact(&self, seed: &ContactSeed) -> Result<Contact> {
        // Avatar handling never blocks contact creation.
        if let Some(avatar_url) = &seed.avatar_url {
            match self.download_with_retry(avatar_url).await {
                Ok(bytes) => match self.create_contact_multipart(seed, bytes).await {
                    Ok(contact) => return Ok(contact),
                    Err(e) => warn!(error = %e, "avatar upload failed, creating without avatar"),
                },
                Err(e) => warn!(error = %e, "avatar download failed, creating without avatar"),
            }
        }
        self.create_contact_json(seed).await
    }

    async fn create_contact_json(&self, seed: &ContactSeed) -> Result<Contact> {
        let mut body = json!({
            "name": seed.name,
            "identifier": seed.identifier,
        });
        if let Some(phone) = seed.phone_number() {
            body["phone_number"] = json!(phone);
        }
        let response = self.post_json("/contacts", &body).await?;
        Self::parse_contact(response)
    }

    async fn create_contact_multipart(&self, seed: &ContactSeed, avatar: Vec<u8>) -> Result<Contact> {
        let part = Part::bytes(avatar)
            .file_name("avatar.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::Media(e.to_string()))?;
        let mut form = Form::new()
            .text("name", seed.name.clone())
            .text("identifier", seed.identifier.clone())
            .part("avatar", part);
        if let Some(phone) = seed.phone_number() {
            form = form.text("phone_number", phone.to_string());
        }

        let response = self
            .client
            .post(self.account_url("/contacts"))
            .header(AUTH_HEADER, &self.config.api_token)
            .multipart(form)
            .timeout(MEDIA_UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::parse_contact(self.read_response(response).await?)
    }

    fn parse_contact(response: Value) -> Result<Contact> {
        let raw = response
            .pointer("/payload/contact")
            .or_else(|| response.get("payload"))
            .unwrap_or(&response)
            .clone();
        serde_json::from_value(raw).map_err(|e| Error::Payload(format!("invalid contact: {e}")))
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Find the contact's conversation in the tenant inbox, reopening a
    /// resolved one when policy permits, creating one otherwise
    pub async fn find_or_create_conversation(&self, contact_id: i64) -> Result<Conversation> {
        let inbox_id = self.ensure_inbox().await?;

        if self.config.reopen_resolved {
            if let Some(found) = self
                .scan_conversations(ConversationStatus::Resolved, inbox_id, contact_id)
                .await?
            {
                info!(conversation_id = found.id, "reopening resolved conversation");
                self.toggle_status(found.id, ConversationStatus::Open).await?;
                return Ok(found);
            }
        }

        if let Some(found) = self
            .scan_conversations(ConversationStatus::Open, inbox_id, contact_id)
            .await?
        {
            return Ok(found);
        }

        let body = json!({
            "contact_id": contact_id,
            "inbox_id": inbox_id,
            "status": self.config.initial_status.as_str(),
        });
        let response = self.post_json("/conversations", &body).await?;
        serde_json::from_value(response)
            .map_err(|e| Error::Payload(format!("invalid conversation: {e}")))
    }

    /// Paginate conversations of one status, latest first, looking for the
    /// contact
    async fn scan_conversations(
        &self,
        status: ConversationStatus,
        inbox_id: i64,
        contact_id: i64,
    ) -> Result<Option<Conversation>> {
        for page in 1..=SCAN_PAGE_LIMIT {
            let response = self
                .get_json(
                    "/conversations",
                    &[
                        ("status", status.as_str().to_string()),
                        ("inbox_id", inbox_id.to_string()),
                        ("page", page.to_string()),
                        ("sort_order", "latest_first".to_string()),
                    ],
                )
                .await?;
            let conversations = list_payload(&response);
            if conversations.is_empty() {
                break;
            }
            for conversation in &conversations {
                let sender_id = conversation.pointer("/meta/sender/id").and_then(Value::as_i64);
                if sender_id == Some(contact_id) {
                    let found = serde_json::from_value(conversation.clone())
                        .map_err(|e| Error::Payload(format!("invalid conversation: {e}")))?;
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Flip a conversation's status
    pub async fn toggle_status(&self, conversation_id: i64, status: ConversationStatus) -> Result<()> {
        let body = json!({ "status": status.as_str() });
        self.post_json(&format!("/conversations/{conversation_id}/toggle_status"), &body)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Post a text message, returning the helpdesk message id
    pub async fn send_text(
        &self,
        conversation_id: i64,
        content: &str,
        direction: Direction,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let mut body = json!({
            "content": content,
            "message_type": direction.as_str(),
            "private": false,
        });
        if let Some(reply_to) = reply_to {
            body["content_attributes"] = json!({ "in_reply_to": reply_to });
        }
        let response = self
            .post_json(&format!("/conversations/{conversation_id}/messages"), &body)
            .await?;
        response
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(Error::MissingField("message id"))
    }

    /// Post a media message, returning the helpdesk message id
    ///
    /// Media sends serialize through the per-client throttle. Bytes come from
    /// the gateway download hook, a URL, or inline base64, in that order; if
    /// none yields bytes the caption is sent as plain text instead.
    pub async fn send_media(
        &self,
        conversation_id: i64,
        media: &OutgoingMedia,
        direction: Direction,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let mut gate = self.throttle_gate.lock().await;
        if let Some(last) = *gate {
            let elapsed = last.elapsed();
            if elapsed < self.config.throttle {
                tokio::time::sleep(self.config.throttle - elapsed).await;
            }
        }
        let result = self
            .send_media_throttled(conversation_id, media, direction, reply_to)
            .await;
        *gate = Some(Instant::now());
        result
    }

    async fn send_media_throttled(
        &self,
        conversation_id: i64,
        media: &OutgoingMedia,
        direction: Direction,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let Some(bytes) = self.acquire_media(media).await else {
            warn!(
                conversation_id,
                kind = %media.kind,
                "no media source yielded bytes, sending caption as text"
            );
            return self
                .send_text(conversation_id, &media.caption, direction, reply_to)
                .await;
        };

        let mut original_error = None;
        for attempt in 1..=MEDIA_POST_ATTEMPTS {
            match self
                .post_media(conversation_id, media, bytes.clone(), direction, reply_to)
                .await
            {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < MEDIA_POST_ATTEMPTS => {
                    warn!(conversation_id, attempt, error = %e, "media post retry");
                    tokio::time::sleep(MEDIA_RETRY_STEP * attempt).await;
                    original_error = Some(e);
                }
                Err(e) => {
                    original_error = Some(e);
                    break;
                }
            }
        }

        let original = original_error
            .unwrap_or_else(|| Error::Media("media post failed".to_string()));
        warn!(conversation_id, error = %original, "media post failed, falling back to text");
        match self
            .send_text(conversation_id, &media.caption, direction, reply_to)
            .await
        {
            Ok(id) => Ok(id),
            Err(_) => Err(original),
        }
    }

    /// Obtain media bytes: gateway hook, then URL, then inline base64
    async fn acquire_media(&self, media: &OutgoingMedia) -> Option<Vec<u8>> {
        if media.origin == Some(PayloadOrigin::Uazapi) {
            if let (Some(hook), Some(id)) = (&self.media_downloader, &media.provider_msg_id) {
                match hook.download(id).await {
                    Ok(bytes) => return Some(bytes),
                    Err(e) => warn!(error = %e, "gateway media download failed"),
                }
            }
        }
        if let Some(url) = &media.url {
            match self.download_with_retry(url).await {
                Ok(bytes) => return Some(bytes),
                Err(e) => warn!(%url, error = %e, "media URL download failed"),
            }
        }
        if let Some(encoded) = &media.base64 {
            match decode_inline_base64(encoded) {
                Ok(bytes) => return Some(bytes),
                Err(e) => warn!(error = %e, "inline media decode failed"),
            }
        }
        None
    }

    async fn post_media(
        &self,
        conversation_id: i64,
        media: &OutgoingMedia,
        bytes: Vec<u8>,
        direction: Direction,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let file_name = media
            .file_name
            .clone()
            .unwrap_or_else(|| default_file_name(media.kind).to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(default_mime(media.kind))
            .map_err(|e| Error::Media(e.to_string()))?;
        let mut form = Form::new()
            .text("content", media.caption.clone())
            .text("message_type", direction.as_str())
            .text("private", "false")
            .part("attachments[]", part);
        if let Some(reply_to) = reply_to {
            form = form.text(
                "content_attributes",
                json!({ "in_reply_to": reply_to }).to_string(),
            );
        }

        let response = self
            .client
            .post(self.account_url(&format!("/conversations/{conversation_id}/messages")))
            .header(AUTH_HEADER, &self.config.api_token)
            .multipart(form)
            .timeout(MEDIA_UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let response = self.read_response(response).await?;
        response
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(Error::MissingField("message id"))
    }

    /// Delete a message. Not retried.
    pub async fn delete_message(&self, conversation_id: i64, message_id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.account_url(&format!(
                "/conversations/{conversation_id}/messages/{message_id}"
            )))
            .header(AUTH_HEADER, &self.config.api_token)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        self.read_response(response).await?;
        Ok(())
    }

    async fn download_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            let result = async {
                let response = self
                    .client
                    .get(url)
                    .timeout(MEDIA_DOWNLOAD_TIMEOUT)
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
                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| Error::Network(e.to_string()))
            }
            .await;

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < DOWNLOAD_ATTEMPTS => {
                    debug!(%url, attempt, error = %e, "download retry");
                    last_error = Some(e);
                    tokio::time::sleep(DOWNLOAD_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Media("download failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn contact(id: i64, identifier: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id,
            identifier: identifier.map(str::to_string),
            phone_number: phone.map(str::to_string),
            name: None,
        }
    }

    fn test_config(base_url: &str, tag: &str) -> HelpdeskConfig {
        let sidecar = std::env::temp_dir()
            .join("wootrico-client-test")
            .join(format!("app-data-{tag}.json"));
        let _ = std::fs::remove_file(&sidecar);
        HelpdeskConfig::new(base_url, "token1", "2", "Atendimento")
            .with_sidecar_path(sidecar)
            .with_webhook_url("https://bridge.example/webhook/callback")
            .with_throttle(Duration::from_millis(0))
    }

    #[test]
    fn test_pick_contact_by_phone_number() {
        let candidates = vec![
            contact(1, Some("98765@lid"), None),
            contact(2, Some("+5511999998888"), Some("+5511999998888")),
        ];
        let found = pick_contact(candidates, "+5511999998888").unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn test_pick_contact_group_by_identifier() {
        let candidates = vec![
            contact(1, Some("+5511999998888"), Some("+5511999998888")),
            contact(2, Some("120363407124580783-group"), None),
        ];
        let found = pick_contact(candidates, "120363407124580783-group").unwrap();
        assert_eq!(found.id, 2);
        assert!(found.phone_number.is_none());
    }

    #[test]
    fn test_pick_contact_miss() {
        let candidates = vec![contact(1, Some("+5511999998888"), Some("+5511999998888"))];
        assert!(pick_contact(candidates, "+5511000000000").is_none());
    }

    #[test]
    fn test_decode_inline_base64_tolerates_data_uri() {
        assert_eq!(
            decode_inline_base64("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode_inline_base64("aGVs\nbG8=").unwrap(), b"hello");
        assert!(decode_inline_base64("not base64!!").is_err());
    }

    #[tokio::test]
    async fn test_ensure_inbox_adopts_by_name_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/inboxes"))
            .and(header("api_access_token", "token1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    { "id": 5, "name": "Vendas" },
                    { "id": 7, "name": "atendimento" },
                ],
            })))
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), "adopt");
        let sidecar_path = config.sidecar_path.clone();
        let client = HelpdeskClient::new(config).unwrap();

        assert_eq!(client.ensure_inbox().await.unwrap(), 7);
        // Second call is served from the cache.
        assert_eq!(client.ensure_inbox().await.unwrap(), 7);

        let record = sidecar::read(&sidecar_path).unwrap();
        assert_eq!(record.inbox_id, 7);
        let _ = std::fs::remove_file(&sidecar_path);
    }

    #[tokio::test]
    async fn test_ensure_inbox_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/inboxes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "payload": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/inboxes"))
            .and(body_partial_json(json!({
                "name": "Atendimento",
                "channel": {
                    "type": "api",
                    "webhook_url": "https://bridge.example/webhook/callback",
                },
                "allow_messages_after_resolved": false,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 9, "name": "Atendimento" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), "create");
        let sidecar_path = config.sidecar_path.clone();
        let client = HelpdeskClient::new(config).unwrap();

        assert_eq!(client.ensure_inbox().await.unwrap(), 9);
        let _ = std::fs::remove_file(&sidecar_path);
    }

    #[tokio::test]
    async fn test_group_contact_created_without_phone_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/contacts/search"))
            .and(query_param("q", "120363407124580783-group"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "payload": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": {
                    "contact": { "id": 31, "identifier": "120363407124580783-group" },
                },
            })))
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), "group-contact");
        let client = HelpdeskClient::new(config).unwrap();
        let seed = ContactSeed {
            identifier: "120363407124580783-group".to_string(),
            name: "Projeto".to_string(),
            avatar_url: None,
        };
        let created = client.find_or_create_contact(&seed).await.unwrap();
        assert_eq!(created.id, 31);

        let requests = server.received_requests().await.unwrap();
        let create = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .unwrap();
        let body: Value = serde_json::from_slice(&create.body).unwrap();
        assert!(body.get("phone_number").is_none());
        assert_eq!(body["identifier"], "120363407124580783-group");
    }

    #[tokio::test]
    async fn test_resolved_conversation_is_reopened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/inboxes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [{ "id": 7, "name": "Atendimento" }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/conversations"))
            .and(query_param("status", "resolved"))
            .and(query_param("inbox_id", "7"))
            .and(query_param("sort_order", "latest_first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "payload": [
                        { "id": 88, "status": "resolved", "meta": { "sender": { "id": 31 } } },
                    ],
                },
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/conversations/88/toggle_status"))
            .and(body_partial_json(json!({ "status": "open" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 88 })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), "reopen").with_reopen_resolved(true);
        let sidecar_path = config.sidecar_path.clone();
        let client = HelpdeskClient::new(config).unwrap();

        let conversation = client.find_or_create_conversation(31).await.unwrap();
        assert_eq!(conversation.id, 88);
        let _ = std::fs::remove_file(&sidecar_path);
    }

    #[tokio::test]
    async fn test_conversation_created_on_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/inboxes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [{ "id": 7, "name": "Atendimento" }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/2/conversations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "payload": [] } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/conversations"))
            .and(body_partial_json(json!({
                "contact_id": 31,
                "inbox_id": 7,
                "status": "open",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 91, "status": "open" })),
            )
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), "conv-create");
        let sidecar_path = config.sidecar_path.clone();
        let client = HelpdeskClient::new(config).unwrap();

        let conversation = client.find_or_create_conversation(31).await.unwrap();
        assert_eq!(conversation.id, 91);
        let _ = std::fs::remove_file(&sidecar_path);
    }

    #[tokio::test]
    async fn test_send_text_with_reply_attribute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/conversations/9/messages"))
            .and(body_partial_json(json!({
                "content": "corrected",
                "message_type": "incoming",
                "private": false,
                "content_attributes": { "in_reply_to": 42 },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 43 })))
            .mount(&server)
            .await;

        let client = HelpdeskClient::new(test_config(&server.uri(), "send-text")).unwrap();
        let id = client
            .send_text(9, "corrected", Direction::Incoming, Some(42))
            .await
            .unwrap();
        assert_eq!(id, 43);
    }

    #[tokio::test]
    async fn test_media_without_source_degrades_to_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/2/conversations/9/messages"))
            .and(body_partial_json(json!({ "content": "caption only" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 50 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HelpdeskClient::new(test_config(&server.uri(), "degrade")).unwrap();
        let media = OutgoingMedia {
            kind: MessageKind::Image,
            caption: "caption only".to_string(),
            origin: Some(PayloadOrigin::Zapi),
            provider_msg_id: None,
            url: None,
            base64: None,
            file_name: None,
        };
        let id = client
            .send_media(9, &media, Direction::Incoming, None)
            .await
            .unwrap();
        assert_eq!(id, 50);
    }
}
