//! Webhook payload normalization
//!
//! Each gateway dialect has its own webhook shape; origin is detected from
//! structural signatures and a dedicated extractor collapses the payload into
//! the canonical [`NormalizedEvent`]. Unknown shapes produce a sentinel event
//! that is always dropped.

mod uazapi;
mod wuzapi;
mod zapi;

use serde_json::Value;
use wootrico_core::{NormalizedEvent, PayloadOrigin};

/// Reason tag for events dropped by the group policy
pub const REASON_GROUP_DISCONSIDERED: &str = "group_disconsidered";

/// Reason tag for payloads no extractor recognizes
pub const REASON_UNKNOWN_ORIGIN: &str = "unknown_origin";

/// Per-tenant knobs the extractors honor
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Drop group messages instead of bridging them
    pub ignore_groups: bool,
    /// ISO alpha-2 country for phone normalization
    pub default_country: String,
}

/// Detect the gateway dialect from a payload's structural signature
#[must_use]
pub fn detect_payload_origin(payload: &Value) -> PayloadOrigin {
    if payload.get("phone").is_some() && payload.get("momment").is_some() {
        return PayloadOrigin::Zapi;
    }
    if payload.pointer("/message/content").is_some() && payload.pointer("/message/sender").is_some()
    {
        return PayloadOrigin::Uazapi;
    }
    if payload.pointer("/event/Info").is_some()
        && payload.pointer("/event/Message").is_some()
        && payload.get("type").and_then(Value::as_str) == Some("Message")
    {
        return PayloadOrigin::Wuzapi;
    }
    PayloadOrigin::Unknown
}

/// Collapse a webhook payload into the canonical event schema
#[must_use]
pub fn normalize_payload(payload: &Value, options: &NormalizeOptions) -> NormalizedEvent {
    match detect_payload_origin(payload) {
        PayloadOrigin::Zapi => zapi::extract(payload, options),
        PayloadOrigin::Uazapi => uazapi::extract(payload, options),
        PayloadOrigin::Wuzapi => wuzapi::extract(payload, options),
        PayloadOrigin::Unknown => {
            let mut event = NormalizedEvent::ignored(REASON_UNKNOWN_ORIGIN);
            event.origin = Some(PayloadOrigin::Unknown);
            event
        }
    }
}

/// String field helper for `Value` probing
pub(crate) fn str_field(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Bool field helper for `Value` probing
pub(crate) fn bool_field(value: &Value, pointer: &str) -> bool {
    value.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_zapi() {
        let payload = json!({
            "phone": "5511999998888",
            "momment": 1_700_000_000_i64,
            "text": { "message": "hi" },
        });
        assert_eq!(detect_payload_origin(&payload), PayloadOrigin::Zapi);
    }

    #[test]
    fn test_detect_uazapi() {
        let payload = json!({
            "message": {
                "content": "oi",
                "sender": "5511999998888@s.whatsapp.net",
            },
        });
        assert_eq!(detect_payload_origin(&payload), PayloadOrigin::Uazapi);
    }

    #[test]
    fn test_detect_wuzapi() {
        let payload = json!({
            "type": "Message",
            "event": {
                "Info": { "Id": "W1", "Chat": "5511999998888@s.whatsapp.net" },
                "Message": { "conversation": "oi" },
            },
        });
        assert_eq!(detect_payload_origin(&payload), PayloadOrigin::Wuzapi);
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(
            detect_payload_origin(&json!({ "hello": "world" })),
            PayloadOrigin::Unknown
        );
        // Wuzapi shape without the Message type marker stays unknown.
        let no_marker = json!({
            "type": "ReadReceipt",
            "event": { "Info": {}, "Message": {} },
        });
        assert_eq!(detect_payload_origin(&no_marker), PayloadOrigin::Unknown);
    }

    #[test]
    fn test_unknown_payload_is_dropped() {
        let options = NormalizeOptions {
            ignore_groups: false,
            default_country: "BR".to_string(),
        };
        let event = normalize_payload(&json!({}), &options);
        assert!(event.ignored);
        assert_eq!(event.ignore_reason.as_deref(), Some(REASON_UNKNOWN_ORIGIN));
        assert_eq!(event.origin, Some(PayloadOrigin::Unknown));
    }
}
