//! Wuzapi payload extractor

use serde_json::Value;
use wootrico_core::{normalize_phone, MessageKind, NormalizedEvent, PayloadOrigin};

use crate::util::{digits_only, sanitize_base64};

use super::{bool_field, str_field, NormalizeOptions, REASON_GROUP_DISCONSIDERED};

/// Media message keys paired with their canonical kind
const MEDIA_MESSAGES: &[(&str, MessageKind)] = &[
    ("imageMessage", MessageKind::Image),
    ("audioMessage", MessageKind::Audio),
    ("videoMessage", MessageKind::Video),
    ("documentMessage", MessageKind::Document),
];

/// Collapse a Wuzapi webhook payload into the canonical event
pub(super) fn extract(payload: &Value, options: &NormalizeOptions) -> NormalizedEvent {
    let chat = str_field(payload, "/event/Info/Chat").unwrap_or_default();
    let is_group = bool_field(payload, "/event/Info/IsGroup") || chat.ends_with("@g.us");

    if is_group && options.ignore_groups {
        let mut event = NormalizedEvent::ignored(REASON_GROUP_DISCONSIDERED);
        event.origin = Some(PayloadOrigin::Wuzapi);
        return event;
    }

    let push_name = str_field(payload, "/event/Info/PushName");
    let mut event = NormalizedEvent {
        origin: Some(PayloadOrigin::Wuzapi),
        is_group,
        from_me: bool_field(payload, "/event/Info/IsFromMe"),
        message_id: str_field(payload, "/event/Info/Id").unwrap_or_default(),
        sender_name: push_name.clone(),
        name: push_name.unwrap_or_default(),
        ..Default::default()
    };

    if is_group {
        // The raw Chat is the contact identifier; the group subject is only a
        // fallback when the payload omits it.
        let group_name = str_field(payload, "/event/Info/GroupName");
        event.phone = if chat.is_empty() {
            group_name.clone()
        } else {
            Some(chat)
        };
        event.group_name = group_name;
        if let Some(name) = &event.group_name {
            event.name = name.clone();
        }
    } else {
        let sender = str_field(payload, "/event/Info/Sender").unwrap_or(chat);
        if sender.ends_with("@lid") {
            event.lid = Some(sender.clone());
        } else if sender.ends_with("@s.whatsapp.net") {
            event.jid = Some(sender.clone());
        }
        let digits = digits_only(sender.split('@').next().unwrap_or(&sender));
        if !digits.is_empty() {
            event.phone = normalize_phone(&digits, &options.default_country).or(Some(digits));
        }
    }

    let message = payload.pointer("/event/Message").cloned().unwrap_or(Value::Null);
    if let Some(text) = message.get("conversation").and_then(Value::as_str) {
        event.text = text.to_string();
    } else if let Some(text) = message
        .pointer("/extendedTextMessage/text")
        .and_then(Value::as_str)
    {
        event.text = text.to_string();
        event.reply_id = str_field(&message, "/extendedTextMessage/contextInfo/stanzaId")
            .or_else(|| str_field(&message, "/extendedTextMessage/contextInfo/StanzaId"));
    }

    for (key, kind) in MEDIA_MESSAGES {
        let Some(media_message) = message.get(key) else {
            continue;
        };
        event.media_kind = Some(*kind);
        if let Some(caption) = media_message.get("caption").and_then(Value::as_str) {
            event.text = caption.to_string();
        }
        // Wuzapi inlines media as URL-safe base64 alongside the event.
        let encoded = str_field(payload, "/base64")
            .or_else(|| str_field(payload, "/event/Base64"));
        event.media = encoded.map(|raw| sanitize_base64(&raw));
        break;
    }

    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(ignore_groups: bool) -> NormalizeOptions {
        NormalizeOptions {
            ignore_groups,
            default_country: "BR".to_string(),
        }
    }

    #[test]
    fn test_direct_text_message() {
        let payload = json!({
            "type": "Message",
            "event": {
                "Info": {
                    "Id": "W1",
                    "Chat": "5511999998888@s.whatsapp.net",
                    "Sender": "5511999998888@s.whatsapp.net",
                    "IsFromMe": false,
                    "PushName": "Maria",
                },
                "Message": { "conversation": "oi" },
            },
        });
        let event = extract(&payload, &options(false));

        assert_eq!(event.origin, Some(PayloadOrigin::Wuzapi));
        assert_eq!(event.phone.as_deref(), Some("+5511999998888"));
        assert_eq!(event.jid.as_deref(), Some("5511999998888@s.whatsapp.net"));
        assert_eq!(event.text, "oi");
        assert_eq!(event.name, "Maria");
        assert!(!event.from_me);
    }

    #[test]
    fn test_reply_stanza_id() {
        let payload = json!({
            "type": "Message",
            "event": {
                "Info": {
                    "Id": "W2",
                    "Chat": "5511999998888@s.whatsapp.net",
                    "Sender": "5511999998888@s.whatsapp.net",
                },
                "Message": {
                    "extendedTextMessage": {
                        "text": "answering",
                        "contextInfo": { "stanzaId": "W0" },
                    },
                },
            },
        });
        let event = extract(&payload, &options(false));
        assert_eq!(event.text, "answering");
        assert_eq!(event.reply_id.as_deref(), Some("W0"));
    }

    #[test]
    fn test_group_chat_is_identifier() {
        let payload = json!({
            "type": "Message",
            "event": {
                "Info": {
                    "Id": "W3",
                    "Chat": "120363025246125486@g.us",
                    "Sender": "5511999998888@s.whatsapp.net",
                    "IsGroup": true,
                    "PushName": "Ana",
                },
                "Message": { "conversation": "oi" },
            },
        });
        let event = extract(&payload, &options(false));

        assert!(event.is_group);
        assert_eq!(event.phone.as_deref(), Some("120363025246125486@g.us"));
        assert_eq!(event.sender_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_group_dropped_when_policy_says_so() {
        let payload = json!({
            "type": "Message",
            "event": {
                "Info": { "Id": "W4", "Chat": "120363025246125486@g.us", "IsGroup": true },
                "Message": { "conversation": "oi" },
            },
        });
        let event = extract(&payload, &options(true));
        assert!(event.ignored);
        assert_eq!(
            event.ignore_reason.as_deref(),
            Some(REASON_GROUP_DISCONSIDERED)
        );
    }

    #[test]
    fn test_media_base64_is_sanitized() {
        let payload = json!({
            "type": "Message",
            "base64": "YWJj-_\n  ",
            "event": {
                "Info": {
                    "Id": "W5",
                    "Chat": "5511999998888@s.whatsapp.net",
                    "Sender": "5511999998888@s.whatsapp.net",
                    "MediaType": "image",
                },
                "Message": { "imageMessage": { "caption": "veja" } },
            },
        });
        let event = extract(&payload, &options(false));

        assert_eq!(event.media_kind, Some(MessageKind::Image));
        assert_eq!(event.media.as_deref(), Some("YWJj+/=="));
        assert_eq!(event.text, "veja");
    }
}
