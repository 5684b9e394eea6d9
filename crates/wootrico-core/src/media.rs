//! Media download seam
//!
//! UAZAPI does not inline media in its webhook payloads; bytes must be
//! fetched through a separate endpoint keyed by the gateway message id. The
//! helpdesk client only sees this trait, wired up by the tenant registry for
//! tenants whose gateway requires it.

use async_trait::async_trait;

use crate::error::Result;

/// Fetch media bytes for a gateway message id
#[async_trait]
pub trait MediaDownload: Send + Sync {
    /// Download the media attached to `provider_msg_id`
    async fn download(&self, provider_msg_id: &str) -> Result<Vec<u8>>;
}
