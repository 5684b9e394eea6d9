//! Wootrico Channels - WhatsApp gateway dialect clients
//!
//! This crate speaks the three gateway dialects the bridge supports:
//! - Z-API (instance/token URL scheme)
//! - UAZAPI (token header, separate media download endpoint)
//! - Wuzapi (whatsmeow REST, capitalized field names)
//!
//! Each dialect gets a client implementing [`GatewayClient`] for sends and
//! deletions, and an extractor in [`normalize`] that collapses its webhook
//! payloads into the shared [`wootrico_core::NormalizedEvent`] schema.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod normalize;
pub mod outbound;
pub mod uazapi;
pub mod util;
pub mod wuzapi;
pub mod zapi;

pub use error::{Error, Result};
pub use normalize::{detect_payload_origin, normalize_payload, NormalizeOptions};
pub use outbound::{GatewayClient, OutboundAttachment, OutboundMessage};
pub use uazapi::UazapiClient;
pub use wuzapi::WuzapiClient;
pub use zapi::ZapiClient;
