//! Helpdesk wire types

use serde::{Deserialize, Serialize};
use wootrico_core::{is_strict_e164, MessageKind, PayloadOrigin};

/// Conversation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Visible in the agents' queue
    Open,
    /// Closed; may be reopened by new inbound activity
    Resolved,
    /// Waiting on the client
    Pending,
}

impl ConversationStatus {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Pending => "pending",
        }
    }

    /// Parse a status string, defaulting to `Open`
    #[must_use]
    pub fn parse_or_open(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "resolved" => Self::Resolved,
            "pending" => Self::Pending,
            _ => Self::Open,
        }
    }
}

/// Message direction on the helpdesk side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client → helpdesk
    Incoming,
    /// Agent → client
    Outgoing,
}

impl Direction {
    /// The `message_type` wire value
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// An inbox as returned by the helpdesk
#[derive(Debug, Clone, Deserialize)]
pub struct Inbox {
    /// Numeric inbox id
    pub id: i64,
    /// Inbox display name
    #[serde(default)]
    pub name: String,
}

/// A contact as returned by the helpdesk
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    /// Numeric contact id
    pub id: i64,
    /// Channel identifier (E.164 phone, group wire-id, lid or jid)
    #[serde(default)]
    pub identifier: Option<String>,
    /// E.164 phone, when the identifier is a real phone
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// A conversation as returned by the helpdesk
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    /// Numeric conversation id
    pub id: i64,
    /// Lifecycle state
    #[serde(default)]
    pub status: Option<String>,
}

/// What the bridge knows about a contact before it exists on the helpdesk
#[derive(Debug, Clone)]
pub struct ContactSeed {
    /// Channel identifier
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Avatar URL to attach, when available
    pub avatar_url: Option<String>,
}

impl ContactSeed {
    /// The `phone_number` to attach on creation: only a strict E.164
    /// identifier qualifies, so group wire-ids and provider handles never
    /// leak into the phone field.
    #[must_use]
    pub fn phone_number(&self) -> Option<&str> {
        is_strict_e164(&self.identifier).then_some(self.identifier.as_str())
    }
}

/// A media message headed for the helpdesk
#[derive(Debug, Clone)]
pub struct OutgoingMedia {
    /// Attachment kind
    pub kind: MessageKind,
    /// Caption, posted as the message content
    pub caption: String,
    /// Gateway dialect the media came from
    pub origin: Option<PayloadOrigin>,
    /// Gateway message id, for dialects with a separate download endpoint
    pub provider_msg_id: Option<String>,
    /// Source URL, when the gateway hosts the file
    pub url: Option<String>,
    /// Inline base64 payload
    pub base64: Option<String>,
    /// Original file name, when known
    pub file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(
            ConversationStatus::parse_or_open("resolved"),
            ConversationStatus::Resolved
        );
        assert_eq!(
            ConversationStatus::parse_or_open("PENDING"),
            ConversationStatus::Pending
        );
        assert_eq!(
            ConversationStatus::parse_or_open("whatever"),
            ConversationStatus::Open
        );
    }

    #[test]
    fn test_seed_phone_number_requires_e164() {
        let phone = ContactSeed {
            identifier: "+5511999998888".to_string(),
            name: "Maria".to_string(),
            avatar_url: None,
        };
        assert_eq!(phone.phone_number(), Some("+5511999998888"));

        let group = ContactSeed {
            identifier: "120363407124580783-group".to_string(),
            name: "Projeto".to_string(),
            avatar_url: None,
        };
        assert_eq!(group.phone_number(), None);

        let lid = ContactSeed {
            identifier: "98765@lid".to_string(),
            name: "Maria".to_string(),
            avatar_url: None,
        };
        assert_eq!(lid.phone_number(), None);
    }
}
