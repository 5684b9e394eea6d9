//! Z-API payload extractor

use serde_json::Value;
use wootrico_core::{normalize_phone, MessageKind, NormalizedEvent, PayloadOrigin};

use super::{bool_field, str_field, NormalizeOptions, REASON_GROUP_DISCONSIDERED};

/// Collapse a Z-API webhook payload into the canonical event
pub(super) fn extract(payload: &Value, options: &NormalizeOptions) -> NormalizedEvent {
    let raw_phone = str_field(payload, "/phone").unwrap_or_default();
    let is_group = bool_field(payload, "/isGroup") || raw_phone.ends_with("-group");

    if is_group && options.ignore_groups {
        let mut event = NormalizedEvent::ignored(REASON_GROUP_DISCONSIDERED);
        event.origin = Some(PayloadOrigin::Zapi);
        return event;
    }

    let mut event = NormalizedEvent {
        origin: Some(PayloadOrigin::Zapi),
        is_group,
        from_me: bool_field(payload, "/fromMe"),
        from_api: bool_field(payload, "/fromApi"),
        message_id: str_field(payload, "/messageId").unwrap_or_default(),
        status: str_field(payload, "/status"),
        reply_id: str_field(payload, "/referenceMessageId"),
        edited_message_id: str_field(payload, "/editedMessageId"),
        sender_name: str_field(payload, "/senderName"),
        ..Default::default()
    };

    if is_group {
        // Group tokens (`…-group`) are the contact identifier, verbatim.
        event.phone = Some(raw_phone);
        event.group_name = str_field(payload, "/chatName");
        event.name = event.group_name.clone().unwrap_or_default();
    } else {
        event.phone = normalize_phone(&raw_phone, &options.default_country).or(Some(raw_phone));
        event.name = str_field(payload, "/chatName")
            .or_else(|| event.sender_name.clone())
            .unwrap_or_default();
        event.sender_photo =
            str_field(payload, "/senderPhoto").or_else(|| str_field(payload, "/photo"));
    }

    if let Some(text) = str_field(payload, "/text/message") {
        event.text = text;
    } else if payload.get("image").is_some() {
        event.media = str_field(payload, "/image/imageUrl");
        event.media_kind = Some(MessageKind::Image);
        event.text = str_field(payload, "/image/caption").unwrap_or_default();
    } else if payload.get("audio").is_some() {
        event.media = str_field(payload, "/audio/audioUrl");
        event.media_kind = Some(MessageKind::Audio);
    } else if payload.get("video").is_some() {
        event.media = str_field(payload, "/video/videoUrl");
        event.media_kind = Some(MessageKind::Video);
        event.text = str_field(payload, "/video/caption").unwrap_or_default();
    } else if payload.get("document").is_some() {
        event.media = str_field(payload, "/document/documentUrl");
        event.media_kind = Some(MessageKind::Document);
        event.text = str_field(payload, "/document/caption").unwrap_or_default();
    }

    event
}
