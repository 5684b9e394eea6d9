//! Server wiring: configuration, tenant registry, shared state and
//! background tasks

pub mod background;
pub mod config;
pub mod registry;

use std::sync::Arc;

use wootrico_core::{CreditLedger, MessageMap};

use crate::queue::Queue;
use config::AppConfig;
use registry::TenantRegistry;

/// State shared by the HTTP API and the two processors
pub struct AppState {
    /// Process configuration
    pub config: AppConfig,
    /// Loaded tenants
    pub registry: TenantRegistry,
    /// Message-id mapping cache
    pub mapping: Arc<MessageMap>,
    /// Echo-suppression ledger
    pub ledger: Arc<CreditLedger>,
    /// Durable queue handle
    pub queue: Queue,
}
