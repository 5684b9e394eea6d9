//! Outbound message types and the gateway client trait

use async_trait::async_trait;
use wootrico_core::{MessageKind, PayloadOrigin};

use crate::error::Result;

/// One attachment of an outbound message, in canonical form
///
/// Helpdesk callbacks deliver attachments as URLs; some dialects want them
/// re-encoded as base64 before posting. Exactly one of `url` / `base64` is
/// normally set.
#[derive(Debug, Clone, Default)]
pub struct OutboundAttachment {
    /// Attachment kind
    pub kind: MessageKind,
    /// Source URL, when the helpdesk hosts the file
    pub url: Option<String>,
    /// Inline base64 payload
    pub base64: Option<String>,
    /// Original file name, used for documents
    pub file_name: Option<String>,
    /// MIME type, when known
    pub mime_type: Option<String>,
}

/// An agent message headed for the gateway
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    /// Recipient: digits, an E.164 phone, a provider-native handle, or a
    /// group wire-id verbatim
    pub recipient: String,
    /// Text body; on media sends it rides the first attachment as a caption
    pub content: String,
    /// Attachments, sent one request each in order
    pub attachments: Vec<OutboundAttachment>,
    /// Provider-native `@lid` handle of the recipient, when known
    pub lid: Option<String>,
    /// Provider-native `@s.whatsapp.net` handle of the recipient, when known
    pub jid: Option<String>,
    /// Gateway id of the message this one replies to
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    /// A plain text message
    #[must_use]
    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the reply target
    #[must_use]
    pub fn replying_to(mut self, provider_msg_id: impl Into<String>) -> Self {
        self.reply_to = Some(provider_msg_id.into());
        self
    }

    /// Add an attachment
    #[must_use]
    pub fn with_attachment(mut self, attachment: OutboundAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Trait implemented by each gateway dialect client
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// The dialect this client speaks
    fn dialect(&self) -> PayloadOrigin;

    /// Send a message; returns one gateway message id per request made
    ///
    /// Text-only messages are a single request. Messages with attachments
    /// make one request per attachment in order, with the text riding the
    /// first as a caption, spaced two seconds apart.
    async fn send(&self, message: &OutboundMessage) -> Result<Vec<String>>;

    /// Delete a previously sent message
    async fn delete_message(&self, provider_msg_id: &str, recipient: Option<&str>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_builder() {
        let msg = OutboundMessage::text("+5511999998888", "hi").replying_to("ABC");
        assert_eq!(msg.recipient, "+5511999998888");
        assert_eq!(msg.reply_to.as_deref(), Some("ABC"));
        assert!(msg.attachments.is_empty());
    }
}
