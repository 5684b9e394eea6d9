//! Helpdesk callback processing (subject `webhook.callback`)
//!
//! Accepts agent-created outgoing messages and deletion updates, resolves the
//! recipient from the conversation's contact, and forwards to the tenant's
//! gateway — pre-crediting the ledger so the gateway's echo of the send is
//! suppressed when it arrives on the principal subject.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};
use wootrico_channels::{OutboundAttachment, OutboundMessage};
use wootrico_core::{is_group_identifier, MappingEntry, MessageKind};

use crate::server::AppState;

/// Resolve the gateway recipient from the conversation's contact
///
/// Group identifiers are used verbatim; direct contacts prefer the phone
/// number and fall back to the provider-native identifier (lid or jid).
fn resolve_recipient(sender: &Value) -> Option<String> {
    let identifier = sender
        .get("identifier")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    if let Some(identifier) = identifier {
        if is_group_identifier(identifier) {
            return Some(identifier.to_string());
        }
    }
    if let Some(phone) = sender
        .get("phone_number")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return Some(phone.to_string());
    }
    identifier.map(str::to_string)
}

/// Name to sign an agent message with, in preference order
fn derive_agent_name(payload: &Value) -> Option<String> {
    const POINTERS: &[&str] = &[
        "/conversation/meta/assignee/available_name",
        "/conversation/meta/assignee/name",
        "/sender/name",
        "/sender/available_name",
        "/conversation/meta/sender/name",
    ];
    POINTERS.iter().find_map(|pointer| {
        payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Prepend the agent signature to the content
fn signed_content(name: &str, content: &str) -> String {
    if content.is_empty() {
        format!("*{name}:*")
    } else {
        format!("*{name}:*\n\n{content}")
    }
}

/// Canonical attachment from a callback attachment record
fn parse_attachment(value: &Value) -> Option<OutboundAttachment> {
    let url = value.get("data_url").and_then(Value::as_str)?.to_string();
    let kind = match value.get("file_type").and_then(Value::as_str).unwrap_or("") {
        "image" => MessageKind::Image,
        "audio" => MessageKind::Audio,
        "video" => MessageKind::Video,
        _ => MessageKind::Document,
    };
    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|clean| clean.rsplit('/').next())
        .filter(|tail| !tail.is_empty())
        .map(str::to_string);
    Some(OutboundAttachment {
        kind,
        url: Some(url),
        base64: None,
        file_name,
        mime_type: None,
    })
}

fn parse_attachments(payload: &Value) -> Vec<OutboundAttachment> {
    payload
        .get("attachments")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(parse_attachment).collect())
        .unwrap_or_default()
}

/// A message was deleted in the helpdesk: delete its gateway twin
async fn handle_deletion(state: &AppState, payload: &Value) -> Result<()> {
    let Some(helpdesk_id) = payload.get("id").and_then(Value::as_i64) else {
        warn!("deletion callback without message id");
        return Ok(());
    };
    let Some(entry) = state.mapping.entry_for(helpdesk_id) else {
        warn!(
            helpdesk_id,
            reason = "whatsapp_message_id_not_found",
            "deletion callback for unmapped message"
        );
        return Ok(());
    };

    let tenant = payload
        .pointer("/conversation/inbox_id")
        .and_then(Value::as_i64)
        .and_then(|inbox_id| state.registry.by_inbox_id(inbox_id))
        .or_else(|| state.registry.by_id(&entry.tenant_id))
        .or_else(|| state.registry.first());
    let Some(tenant) = tenant else {
        warn!(reason = "integration_not_found", "no tenant for deletion callback");
        return Ok(());
    };

    let sender = payload
        .pointer("/conversation/meta/sender")
        .cloned()
        .unwrap_or(Value::Null);
    let recipient = resolve_recipient(&sender);

    tenant
        .provider
        .delete_message(&entry.provider_msg_id, recipient.as_deref())
        .await?;
    state.mapping.remove(helpdesk_id);
    info!(
        helpdesk_id,
        provider_msg_id = %entry.provider_msg_id,
        "deleted gateway message after helpdesk deletion"
    );
    Ok(())
}

/// Process one helpdesk callback
pub(super) async fn handle(state: &AppState, payload: Value) -> Result<()> {
    let event_type = payload.get("event").and_then(Value::as_str).unwrap_or_default();

    let deleted = payload
        .pointer("/content_attributes/deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if event_type == "message_updated" && deleted {
        return handle_deletion(state, &payload).await;
    }

    if event_type != "message_created" {
        debug!(event_type, reason = "event_not_message_created", "callback dropped");
        return Ok(());
    }
    let message_type = payload
        .get("message_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if message_type != "outgoing" {
        debug!(message_type, reason = "message_not_outgoing", "callback dropped");
        return Ok(());
    }
    if payload.get("private").and_then(Value::as_bool).unwrap_or(false) {
        debug!(reason = "mensagem_privada", "callback dropped");
        return Ok(());
    }

    let tenant = payload
        .pointer("/conversation/inbox_id")
        .and_then(Value::as_i64)
        .and_then(|inbox_id| state.registry.by_inbox_id(inbox_id))
        .or_else(|| state.registry.single());
    let Some(tenant) = tenant else {
        warn!(reason = "integration_not_found", "callback dropped");
        return Ok(());
    };

    let sender = payload
        .pointer("/conversation/meta/sender")
        .cloned()
        .unwrap_or(Value::Null);
    let Some(recipient) = resolve_recipient(&sender) else {
        warn!(tenant = %tenant.id, "callback carries no usable recipient");
        return Ok(());
    };

    let raw_content = payload.get("content").and_then(Value::as_str).unwrap_or("");
    let content = if tenant.sign_agent_messages {
        match derive_agent_name(&payload) {
            Some(name) => signed_content(&name, raw_content),
            None => raw_content.to_string(),
        }
    } else {
        raw_content.to_string()
    };

    let reply_to = payload
        .pointer("/content_attributes/in_reply_to")
        .and_then(Value::as_i64)
        .and_then(|helpdesk_id| state.mapping.provider_id_for(helpdesk_id));

    let attachments = parse_attachments(&payload);
    let kind = attachments
        .first()
        .map(|a| a.kind)
        .unwrap_or(MessageKind::Text);

    // A tracked gateway-echo credit means this callback is the helpdesk's own
    // record of a message that already exists at the gateway.
    if state.ledger.consume_provider_echo(&recipient, kind) {
        info!(tenant = %tenant.id, %recipient, reason = "ticket_consumed", "callback skipped");
        return Ok(());
    }

    // Each request the gateway will make comes back as one echo; credit them
    // all before sending.
    let credited: Vec<MessageKind> = if attachments.is_empty() {
        vec![MessageKind::Text]
    } else {
        attachments.iter().map(|a| a.kind).collect()
    };
    for kind in &credited {
        state.ledger.add_helpdesk_echo(&recipient, *kind);
    }

    let identifier = sender.get("identifier").and_then(Value::as_str).unwrap_or("");
    let message = OutboundMessage {
        recipient: recipient.clone(),
        content,
        attachments,
        lid: identifier.ends_with("@lid").then(|| identifier.to_string()),
        jid: identifier
            .ends_with("@s.whatsapp.net")
            .then(|| identifier.to_string()),
        reply_to,
    };

    match tenant.provider.send(&message).await {
        Ok(sent_ids) => {
            let helpdesk_id = payload.get("id").and_then(Value::as_i64);
            if let (Some(helpdesk_id), Some(first)) = (helpdesk_id, sent_ids.first()) {
                let conversation_id = payload
                    .pointer("/conversation/id")
                    .and_then(Value::as_i64)
                    .unwrap_or_default();
                state.mapping.store(
                    helpdesk_id,
                    MappingEntry {
                        provider_msg_id: first.clone(),
                        conversation_id,
                        inbox_id: tenant.inbox_id,
                        origin: tenant.dialect,
                        tenant_id: tenant.id.clone(),
                    },
                );
            }
            info!(
                tenant = %tenant.id,
                %recipient,
                sent = sent_ids.len(),
                "callback forwarded to gateway"
            );
            Ok(())
        }
        Err(e) => {
            // Roll back the echo credits the failed send will never produce.
            for kind in &credited {
                state.ledger.consume_helpdesk_echo(&recipient, *kind);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_recipient_prefers_phone() {
        let sender = json!({
            "identifier": "+5511999998888",
            "phone_number": "+5511999998888",
        });
        assert_eq!(
            resolve_recipient(&sender).as_deref(),
            Some("+5511999998888")
        );
    }

    #[test]
    fn test_resolve_recipient_group_verbatim() {
        let sender = json!({
            "identifier": "120363407124580783-group",
            "phone_number": Value::Null,
        });
        assert_eq!(
            resolve_recipient(&sender).as_deref(),
            Some("120363407124580783-group")
        );
    }

    #[test]
    fn test_resolve_recipient_falls_back_to_handle() {
        let sender = json!({ "identifier": "98765@lid" });
        assert_eq!(resolve_recipient(&sender).as_deref(), Some("98765@lid"));
        assert!(resolve_recipient(&json!({})).is_none());
    }

    #[test]
    fn test_derive_agent_name_order() {
        let with_assignee = json!({
            "conversation": {
                "meta": {
                    "assignee": { "available_name": "Rafa", "name": "Rafael" },
                    "sender": { "name": "Maria" },
                },
            },
            "sender": { "name": "Agente" },
        });
        assert_eq!(derive_agent_name(&with_assignee).as_deref(), Some("Rafa"));

        let sender_only = json!({ "sender": { "name": "Agente" } });
        assert_eq!(derive_agent_name(&sender_only).as_deref(), Some("Agente"));

        assert!(derive_agent_name(&json!({})).is_none());
    }

    #[test]
    fn test_signed_content() {
        assert_eq!(signed_content("Rafa", "oi"), "*Rafa:*\n\noi");
        assert_eq!(signed_content("Rafa", ""), "*Rafa:*");
    }

    #[test]
    fn test_parse_attachments() {
        let payload = json!({
            "attachments": [
                { "file_type": "image", "data_url": "https://woot.example/f/a.jpg?x=1" },
                { "file_type": "file", "data_url": "https://woot.example/f/notas.xlsx" },
                { "file_type": "audio" },
            ],
        });
        let attachments = parse_attachments(&payload);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].kind, MessageKind::Image);
        assert_eq!(attachments[0].file_name.as_deref(), Some("a.jpg"));
        assert_eq!(attachments[1].kind, MessageKind::Document);
        assert_eq!(attachments[1].file_name.as_deref(), Some("notas.xlsx"));
    }
}
