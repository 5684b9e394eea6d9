//! UAZAPI payload extractor

use serde_json::Value;
use wootrico_core::{normalize_phone, MessageKind, NormalizedEvent, PayloadOrigin};

use crate::util::digits_only;

use super::{bool_field, str_field, NormalizeOptions, REASON_GROUP_DISCONSIDERED};

/// Map UAZAPI's media type strings to the canonical kinds
fn media_kind(raw: &str) -> Option<MessageKind> {
    match raw {
        "image" | "sticker" => Some(MessageKind::Image),
        "audio" | "ptt" => Some(MessageKind::Audio),
        "video" => Some(MessageKind::Video),
        "document" => Some(MessageKind::Document),
        _ => None,
    }
}

/// Collapse a UAZAPI webhook payload into the canonical event
pub(super) fn extract(payload: &Value, options: &NormalizeOptions) -> NormalizedEvent {
    let chat_id = str_field(payload, "/message/chatid").unwrap_or_default();
    let is_group = bool_field(payload, "/message/isgroup") || chat_id.ends_with("@g.us");

    if is_group && options.ignore_groups {
        let mut event = NormalizedEvent::ignored(REASON_GROUP_DISCONSIDERED);
        event.origin = Some(PayloadOrigin::Uazapi);
        return event;
    }

    let sender = str_field(payload, "/message/sender").unwrap_or_default();
    let mut event = NormalizedEvent {
        origin: Some(PayloadOrigin::Uazapi),
        is_group,
        from_me: bool_field(payload, "/message/fromMe"),
        from_api: bool_field(payload, "/message/fromApi")
            || bool_field(payload, "/message/wasSentByApi"),
        message_id: str_field(payload, "/message/messageid")
            .or_else(|| str_field(payload, "/message/id"))
            .unwrap_or_default(),
        status: str_field(payload, "/message/status"),
        reply_id: str_field(payload, "/message/replyid")
            .or_else(|| str_field(payload, "/message/quoted")),
        edited_message_id: str_field(payload, "/message/edited"),
        sender_name: str_field(payload, "/message/senderName"),
        ..Default::default()
    };

    if is_group {
        // The group chat id (`…@g.us`) is the contact identifier, verbatim.
        event.phone = str_field(payload, "/chat/wa_chatid").or(Some(chat_id));
        event.group_name = str_field(payload, "/chat/name");
        event.name = event.group_name.clone().unwrap_or_default();
    } else {
        if sender.ends_with("@lid") {
            event.lid = Some(sender.clone());
        } else if sender.ends_with("@s.whatsapp.net") {
            event.jid = Some(sender.clone());
        }
        let digits = digits_only(sender.split('@').next().unwrap_or(&sender));
        if !digits.is_empty() {
            event.phone = normalize_phone(&digits, &options.default_country).or(Some(digits));
        }
        event.name = str_field(payload, "/chat/name")
            .or_else(|| event.sender_name.clone())
            .unwrap_or_default();
        event.sender_photo = str_field(payload, "/chat/imagePreview")
            .or_else(|| str_field(payload, "/chat/image"));
    }

    if let Some(text) = str_field(payload, "/message/text") {
        event.text = text;
    } else if let Some(content) = payload.pointer("/message/content").and_then(Value::as_str) {
        event.text = content.to_string();
    }

    let media_type = str_field(payload, "/message/mediaType")
        .or_else(|| str_field(payload, "/message/messageType"))
        .or_else(|| str_field(payload, "/message/type"))
        .unwrap_or_default();
    if let Some(kind) = media_kind(&media_type) {
        event.media_kind = Some(kind);
        // UAZAPI media is fetched later through /message/download; a file URL
        // is only a shortcut when the payload happens to carry one.
        event.media = str_field(payload, "/message/fileURL");
        if event.text.is_empty() {
            event.text = str_field(payload, "/message/caption").unwrap_or_default();
        }
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
            "owner": "5511988887777",
            "message": {
                "messageid": "U1",
                "chatid": "5511999998888@s.whatsapp.net",
                "sender": "5511999998888@s.whatsapp.net",
                "senderName": "Maria",
                "fromMe": false,
                "content": "oi",
                "text": "oi",
            },
            "chat": { "name": "Maria", "imagePreview": "https://cdn.example/p.jpg" },
        });
        let event = extract(&payload, &options(false));

        assert_eq!(event.origin, Some(PayloadOrigin::Uazapi));
        assert_eq!(event.phone.as_deref(), Some("+5511999998888"));
        assert_eq!(
            event.jid.as_deref(),
            Some("5511999998888@s.whatsapp.net")
        );
        assert_eq!(event.text, "oi");
        assert_eq!(event.message_id, "U1");
        assert_eq!(event.sender_photo.as_deref(), Some("https://cdn.example/p.jpg"));
    }

    #[test]
    fn test_lid_sender() {
        let payload = json!({
            "message": {
                "messageid": "U2",
                "chatid": "98765@lid",
                "sender": "98765@lid",
                "content": "oi",
            },
        });
        let event = extract(&payload, &options(false));
        assert_eq!(event.lid.as_deref(), Some("98765@lid"));
    }

    #[test]
    fn test_group_uses_wa_chatid() {
        let payload = json!({
            "message": {
                "messageid": "U3",
                "chatid": "120363025246125486@g.us",
                "sender": "5511999998888@s.whatsapp.net",
                "senderName": "Ana",
                "content": "oi",
            },
            "chat": {
                "wa_chatid": "120363025246125486@g.us",
                "name": "Projeto",
                "imagePreview": "https://cdn.example/g.jpg",
            },
        });
        let event = extract(&payload, &options(false));

        assert!(event.is_group);
        assert_eq!(event.phone.as_deref(), Some("120363025246125486@g.us"));
        assert_eq!(event.group_name.as_deref(), Some("Projeto"));
        assert!(event.sender_photo.is_none());
    }

    #[test]
    fn test_group_dropped_when_policy_says_so() {
        let payload = json!({
            "message": {
                "chatid": "120363025246125486@g.us",
                "sender": "5511999998888@s.whatsapp.net",
                "content": "oi",
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
    fn test_media_kind_from_message_type() {
        let payload = json!({
            "message": {
                "messageid": "U4",
                "chatid": "5511999998888@s.whatsapp.net",
                "sender": "5511999998888@s.whatsapp.net",
                "content": "",
                "mediaType": "ptt",
            },
        });
        let event = extract(&payload, &options(false));
        assert_eq!(event.media_kind, Some(MessageKind::Audio));
        assert!(event.media.is_none());
    }

    #[test]
    fn test_edit_carries_original_id() {
        let payload = json!({
            "message": {
                "messageid": "U5",
                "chatid": "5511999998888@s.whatsapp.net",
                "sender": "5511999998888@s.whatsapp.net",
                "content": "corrected",
                "text": "corrected",
                "edited": "U0",
            },
        });
        let event = extract(&payload, &options(false));
        assert_eq!(event.edited_message_id.as_deref(), Some("U0"));
        assert_eq!(event.message_id, "U5");
    }
}
