//! Normalized event schema
//!
//! The three gateway dialects emit structurally different webhook payloads.
//! The extractors in `wootrico-channels` collapse all of them into
//! [`NormalizedEvent`], which is the only shape the reconciliation processors
//! ever look at.

use serde::{Deserialize, Serialize};

/// Gateway dialect a payload originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadOrigin {
    /// Z-API (instance/token URL scheme, `*-group` group tokens)
    Zapi,
    /// UAZAPI (token header, `*@g.us` group chat ids)
    Uazapi,
    /// Wuzapi (whatsmeow REST, capitalized field names)
    Wuzapi,
    /// Unrecognized payload shape; always dropped
    Unknown,
}

impl PayloadOrigin {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zapi => "zapi",
            Self::Uazapi => "uazapi",
            Self::Wuzapi => "wuzapi",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PayloadOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message kind, used both for sending and as the credit-ledger key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
    /// Image with optional caption
    Image,
    /// Audio / voice note
    Audio,
    /// Video with optional caption
    Video,
    /// Document with file name
    Document,
}

impl MessageKind {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a contact identifier refers to a group chat
///
/// Group identifiers (`…@g.us` from UAZAPI, `…-group` from Z-API) are used
/// verbatim on the helpdesk side and are never E.164-normalized.
#[must_use]
pub fn is_group_identifier(identifier: &str) -> bool {
    identifier.ends_with("@g.us") || identifier.ends_with("-group")
}

/// A gateway webhook payload collapsed into the bridge's internal schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Dialect the payload came from
    pub origin: Option<PayloadOrigin>,
    /// E.164 phone for direct chats; the group wire-id verbatim for groups
    pub phone: Option<String>,
    /// Provider-native `@lid` handle, when the sender has no exposed phone
    pub lid: Option<String>,
    /// Provider-native `@s.whatsapp.net` handle
    pub jid: Option<String>,
    /// Text body or media caption
    pub text: String,
    /// Contact display name
    pub name: String,
    /// Avatar URL; never recorded for groups
    pub sender_photo: Option<String>,
    /// Media payload: a URL or inline base64, depending on the dialect
    pub media: Option<String>,
    /// Kind of the media payload
    pub media_kind: Option<MessageKind>,
    /// Group chat flag
    pub is_group: bool,
    /// Message was sent by the account owner (either phone or API)
    pub from_me: bool,
    /// Message was sent through the gateway API rather than a handset
    pub from_api: bool,
    /// Raw delivery status as reported by the gateway
    pub status: Option<String>,
    /// Gateway message id
    pub message_id: String,
    /// Gateway id of the message this one replies to
    pub reply_id: Option<String>,
    /// Group subject, for group chats
    pub group_name: Option<String>,
    /// Display name of the participant who sent a group message
    pub sender_name: Option<String>,
    /// Gateway id of the original message, when this event is an edit
    pub edited_message_id: Option<String>,
    /// Event was dropped during normalization
    pub ignored: bool,
    /// Reason tag for an ignored event
    pub ignore_reason: Option<String>,
}

impl NormalizedEvent {
    /// An event carrying only a drop reason
    #[must_use]
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            ignored: true,
            ignore_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// The helpdesk contact identifier this event resolves to
    ///
    /// Groups use their wire-id verbatim; direct chats prefer the lid, then
    /// the jid, then the normalized phone.
    #[must_use]
    pub fn contact_identifier(&self) -> Option<&str> {
        if self.is_group {
            return self.phone.as_deref();
        }
        self.lid
            .as_deref()
            .or(self.jid.as_deref())
            .or(self.phone.as_deref())
    }

    /// The credit-ledger recipient key for this event
    ///
    /// The same value the callback processor derives from the helpdesk
    /// contact (its identifier), so that pre-credits and consumes cancel out
    /// across the two processors.
    #[must_use]
    pub fn credit_recipient(&self) -> Option<&str> {
        self.contact_identifier()
    }

    /// The message kind, defaulting to text when no media is attached
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.media_kind.unwrap_or(MessageKind::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_identifier_shapes() {
        assert!(is_group_identifier("120363407124580783-group"));
        assert!(is_group_identifier("120363025246125486@g.us"));
        assert!(!is_group_identifier("+5511999998888"));
        assert!(!is_group_identifier("5511999998888@s.whatsapp.net"));
    }

    #[test]
    fn test_contact_identifier_prefers_lid() {
        let event = NormalizedEvent {
            phone: Some("+5511999998888".to_string()),
            lid: Some("98765@lid".to_string()),
            jid: Some("5511999998888@s.whatsapp.net".to_string()),
            ..Default::default()
        };
        assert_eq!(event.contact_identifier(), Some("98765@lid"));
    }

    #[test]
    fn test_group_uses_wire_id() {
        let event = NormalizedEvent {
            phone: Some("120363407124580783-group".to_string()),
            is_group: true,
            ..Default::default()
        };
        assert_eq!(event.contact_identifier(), Some("120363407124580783-group"));
        assert_eq!(event.credit_recipient(), Some("120363407124580783-group"));
    }

    #[test]
    fn test_credit_recipient_matches_contact_identity() {
        let phone_only = NormalizedEvent {
            phone: Some("+5511999998888".to_string()),
            ..Default::default()
        };
        assert_eq!(phone_only.credit_recipient(), Some("+5511999998888"));

        // A lid contact is keyed by its lid on both sides of the bridge.
        let with_lid = NormalizedEvent {
            phone: Some("+5511999998888".to_string()),
            lid: Some("98765@lid".to_string()),
            ..Default::default()
        };
        assert_eq!(with_lid.credit_recipient(), Some("98765@lid"));
    }

    #[test]
    fn test_ignored_event() {
        let event = NormalizedEvent::ignored("group_disconsidered");
        assert!(event.ignored);
        assert_eq!(event.ignore_reason.as_deref(), Some("group_disconsidered"));
    }

    #[test]
    fn test_default_kind_is_text() {
        let event = NormalizedEvent::default();
        assert_eq!(event.kind(), MessageKind::Text);
    }
}
