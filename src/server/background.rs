//! Background tasks

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;
use wootrico_core::{CreditLedger, MessageMap};

/// How often the mapping cache and the credit ledger are wiped
///
/// A deliberately coarse collection: both structures are volatile working
/// state, and the wholesale wipe bounds memory without persistent storage.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60 * 60);

/// Start the periodic eviction task
pub fn start_eviction_task(
    mapping: Arc<MessageMap>,
    ledger: Arc<CreditLedger>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the caches live a full
        // interval before the first wipe.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = mapping.clear();
            ledger.clear();
            info!(evicted, "wiped message mapping cache and credit ledger");
        }
    })
}
