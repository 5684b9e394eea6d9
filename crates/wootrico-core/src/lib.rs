//! Wootrico Core - Shared types and in-process services
//!
//! This crate holds the pieces both directions of the bridge depend on:
//! - The normalized event schema produced by the gateway payload extractors
//! - Phone normalization to E.164
//! - The message-id mapping cache (helpdesk id ↔ gateway id)
//! - The echo-suppression credit ledger
//! - Environment parsing helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credits;
pub mod env;
pub mod error;
pub mod event;
pub mod mapping;
pub mod media;
pub mod phone;

pub use credits::{CreditLedger, LedgerSnapshot};
pub use error::{Error, Result};
pub use event::{is_group_identifier, MessageKind, NormalizedEvent, PayloadOrigin};
pub use mapping::{MappingEntry, MessageMap};
pub use media::MediaDownload;
pub use phone::{is_strict_e164, normalize_phone};
