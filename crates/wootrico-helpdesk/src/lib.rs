//! Wootrico Helpdesk - Chatwoot-dialect REST client
//!
//! Per-tenant stateful client against the helpdesk's account API:
//! - Inbox discovery with a sidecar file so restarts are idempotent
//! - Contact and conversation find-or-create, with resolved-conversation
//!   reopening when the tenant policy allows it
//! - Text and multipart media message posting with throttling and retry
//! - Message deletion

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod sidecar;
pub mod types;

pub use client::{HelpdeskClient, HelpdeskConfig};
pub use error::{Error, Result};
pub use types::{
    Contact, ContactSeed, Conversation, ConversationStatus, Direction, Inbox, OutgoingMedia,
};
