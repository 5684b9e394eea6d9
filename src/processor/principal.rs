//! Gateway event processing (subject `webhook.principal`)
//!
//! Decides, for every normalized gateway event, whether to drop it, deliver
//! it to the helpdesk as incoming or outgoing, or translate it into a
//! deletion — consulting the credit ledger so echoes of the bridge's own
//! sends never loop back.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};
use wootrico_channels::{detect_payload_origin, normalize_payload, NormalizeOptions};
use wootrico_core::{MappingEntry, NormalizedEvent, PayloadOrigin};
use wootrico_helpdesk::{ContactSeed, Direction, OutgoingMedia};

use crate::server::registry::{Tenant, TenantRegistry};
use crate::server::AppState;

/// Marker appended to the body of an edited message
const EDITED_MARKER: &str = "(*mensagem editada pelo usuário*)";

/// Body of an edit delivery: the new text with the marker on its own line,
/// or the marker alone when the new body is empty
fn edited_body(text: &str) -> String {
    if text.is_empty() {
        EDITED_MARKER.to_string()
    } else {
        format!("{text}\n{EDITED_MARKER}")
    }
}

/// Gateway message id when the payload is a UAZAPI deletion event
fn uazapi_deletion_id(payload: &Value) -> Option<String> {
    let is_deletion = payload.get("type").and_then(Value::as_str) == Some("DeletedMessage")
        || payload.pointer("/event/Type").and_then(Value::as_str) == Some("Deleted")
        || payload.get("state").and_then(Value::as_str) == Some("Deleted");
    if !is_deletion {
        return None;
    }
    for pointer in ["/message/id", "/message/messageid", "/id"] {
        if let Some(id) = payload.pointer(pointer).and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    None
}

/// UAZAPI emits generic `messages_update` events the bridge has no use for
fn is_uazapi_update(payload: &Value) -> bool {
    let event = payload
        .get("EventType")
        .or_else(|| payload.get("event"))
        .and_then(Value::as_str);
    event == Some("messages_update")
}

/// Route an event to exactly one tenant
fn route_tenant<'a>(
    registry: &'a TenantRegistry,
    origin: PayloadOrigin,
    payload: &Value,
) -> Option<&'a Arc<Tenant>> {
    if let Some(single) = registry.single() {
        return Some(single);
    }
    match origin {
        PayloadOrigin::Uazapi => {
            if let Some(owner) = payload.get("owner").and_then(Value::as_str) {
                if let Some(tenant) = registry.by_provider_identifier(origin, owner) {
                    return Some(tenant);
                }
            }
            payload
                .pointer("/message/chatid")
                .and_then(Value::as_str)
                .and_then(|chat_id| registry.by_provider_identifier(origin, chat_id))
        }
        // Z-API and Wuzapi payloads carry no instance identity; they are only
        // routable when one tenant of the dialect exists.
        PayloadOrigin::Zapi | PayloadOrigin::Wuzapi => {
            let candidates = registry.of_dialect(origin);
            (candidates.len() == 1).then(|| candidates[0])
        }
        PayloadOrigin::Unknown => None,
    }
}

/// A message was deleted on the gateway side: delete its helpdesk twin
async fn handle_gateway_deletion(state: &AppState, provider_msg_id: &str) -> Result<()> {
    let Some((helpdesk_id, entry)) = state.mapping.entry_for_provider(provider_msg_id) else {
        warn!(
            %provider_msg_id,
            reason = "mapping_not_found",
            "gateway deletion for unmapped message"
        );
        return Ok(());
    };
    let tenant = state
        .registry
        .by_id(&entry.tenant_id)
        .or_else(|| state.registry.by_inbox_id(entry.inbox_id))
        .or_else(|| state.registry.first());
    let Some(tenant) = tenant else {
        warn!(reason = "integration_not_found", "no tenant for gateway deletion");
        return Ok(());
    };

    tenant
        .helpdesk
        .delete_message(entry.conversation_id, helpdesk_id)
        .await?;
    state.mapping.remove(helpdesk_id);
    info!(%provider_msg_id, helpdesk_id, "deleted helpdesk message after gateway deletion");
    Ok(())
}

/// Process one gateway event
pub(super) async fn handle(state: &AppState, payload: Value) -> Result<()> {
    // Deletions and notification events short-circuit before normalization.
    if is_uazapi_update(&payload) {
        debug!("gateway messages_update ignored");
        return Ok(());
    }
    if let Some(provider_msg_id) = uazapi_deletion_id(&payload) {
        return handle_gateway_deletion(state, &provider_msg_id).await;
    }
    let notification = payload
        .get("notification")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    if let Some(notification) = notification {
        if notification == "REVOKE" {
            let deleted_id = payload
                .get("referenceMessageId")
                .or_else(|| payload.get("messageId"))
                .and_then(Value::as_str);
            if let Some(provider_msg_id) = deleted_id {
                return handle_gateway_deletion(state, provider_msg_id).await;
            }
        }
        debug!(notification, "gateway notification ignored");
        return Ok(());
    }

    let origin = detect_payload_origin(&payload);
    let Some(tenant) = route_tenant(&state.registry, origin, &payload) else {
        warn!(%origin, reason = "integration_not_found", "gateway event dropped");
        return Ok(());
    };

    let options = NormalizeOptions {
        ignore_groups: tenant.ignore_groups,
        default_country: tenant.default_country.clone(),
    };
    let event = normalize_payload(&payload, &options);
    if event.ignored {
        info!(
            tenant = %tenant.id,
            reason = event.ignore_reason.as_deref().unwrap_or("ignored"),
            "gateway event dropped"
        );
        return Ok(());
    }

    let Some(recipient) = event.credit_recipient().map(str::to_string) else {
        warn!(tenant = %tenant.id, "gateway event carries no recipient");
        return Ok(());
    };
    let kind = event.kind();

    if !event.from_me {
        // Client → helpdesk.
        deliver(state, tenant, &event, Direction::Incoming).await?;
    } else if !event.from_api {
        // Agent answered from the phone. The post below will fire a helpdesk
        // callback; credit the gateway echo so that callback is cancelled.
        state.ledger.add_provider_echo(&recipient, kind);
        if let Err(e) = deliver(state, tenant, &event, Direction::Outgoing).await {
            state.ledger.consume_provider_echo(&recipient, kind);
            return Err(e);
        }
    } else {
        // The gateway echoes an API send. A tracked credit means it was this
        // bridge's own send from a helpdesk callback: consume and skip. An
        // untracked echo came from some other API client and is delivered
        // exactly once.
        if state.ledger.consume_helpdesk_echo(&recipient, kind) {
            state.ledger.add_provider_echo(&recipient, kind);
            if let Err(e) = deliver(state, tenant, &event, Direction::Outgoing).await {
                state.ledger.consume_provider_echo(&recipient, kind);
                return Err(e);
            }
        } else {
            info!(tenant = %tenant.id, %recipient, reason = "ticket_consumed", "gateway echo skipped");
        }
    }

    Ok(())
}

/// Post a normalized event to the helpdesk and record the id mapping
async fn deliver(
    state: &AppState,
    tenant: &Tenant,
    event: &NormalizedEvent,
    direction: Direction,
) -> Result<()> {
    let Some(identifier) = event.contact_identifier() else {
        warn!(tenant = %tenant.id, "gateway event carries no contact identifier");
        return Ok(());
    };

    let seed = ContactSeed {
        identifier: identifier.to_string(),
        name: if event.name.is_empty() {
            identifier.to_string()
        } else {
            event.name.clone()
        },
        avatar_url: event.sender_photo.clone(),
    };
    let contact = tenant.helpdesk.find_or_create_contact(&seed).await?;
    let conversation = tenant.helpdesk.find_or_create_conversation(contact.id).await?;

    let mut reply_to = event
        .reply_id
        .as_deref()
        .and_then(|reply_id| state.mapping.helpdesk_id_for(reply_id));
    let mut content = event.text.clone();

    // Edits become a reply to the original with an appended marker.
    if let Some(original) = event.edited_message_id.as_deref() {
        if let Some(original_helpdesk_id) = state.mapping.helpdesk_id_for(original) {
            reply_to = Some(original_helpdesk_id);
            content = edited_body(&content);
        }
    }

    if event.is_group && direction == Direction::Incoming {
        if let Some(sender) = event.sender_name.as_deref() {
            content = format!("**{sender}:**\n{content}");
        }
    }

    let helpdesk_id = match event.media_kind {
        Some(kind) => {
            let (url, base64) = match &event.media {
                Some(media) if media.starts_with("http") => (Some(media.clone()), None),
                Some(media) => (None, Some(media.clone())),
                None => (None, None),
            };
            let media = OutgoingMedia {
                kind,
                caption: content,
                origin: event.origin,
                provider_msg_id: (!event.message_id.is_empty())
                    .then(|| event.message_id.clone()),
                url,
                base64,
                file_name: None,
            };
            tenant
                .helpdesk
                .send_media(conversation.id, &media, direction, reply_to)
                .await?
        }
        None => {
            tenant
                .helpdesk
                .send_text(conversation.id, &content, direction, reply_to)
                .await?
        }
    };

    if !event.message_id.is_empty() {
        state.mapping.store(
            helpdesk_id,
            MappingEntry {
                provider_msg_id: event.message_id.clone(),
                conversation_id: conversation.id,
                inbox_id: tenant.inbox_id,
                origin: event.origin.unwrap_or(PayloadOrigin::Unknown),
                tenant_id: tenant.id.clone(),
            },
        );
    }
    info!(
        tenant = %tenant.id,
        conversation_id = conversation.id,
        helpdesk_id,
        direction = direction.as_str(),
        "gateway event delivered to helpdesk"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edited_body() {
        assert_eq!(
            edited_body("corrected"),
            "corrected\n(*mensagem editada pelo usuário*)"
        );
        assert_eq!(edited_body(""), "(*mensagem editada pelo usuário*)");
    }

    #[test]
    fn test_uazapi_deletion_shapes() {
        let typed = json!({ "type": "DeletedMessage", "message": { "id": "U9" } });
        assert_eq!(uazapi_deletion_id(&typed).as_deref(), Some("U9"));

        let event_typed = json!({ "event": { "Type": "Deleted" }, "id": "U8" });
        assert_eq!(uazapi_deletion_id(&event_typed).as_deref(), Some("U8"));

        let stated = json!({ "state": "Deleted", "message": { "messageid": "U7" } });
        assert_eq!(uazapi_deletion_id(&stated).as_deref(), Some("U7"));

        let plain = json!({ "message": { "id": "U1", "content": "hi" } });
        assert!(uazapi_deletion_id(&plain).is_none());
    }

    #[test]
    fn test_uazapi_update_detection() {
        assert!(is_uazapi_update(&json!({ "EventType": "messages_update" })));
        assert!(is_uazapi_update(&json!({ "event": "messages_update" })));
        assert!(!is_uazapi_update(&json!({ "event": "messages" })));
    }
}
