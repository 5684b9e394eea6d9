//! Echo-suppression credit ledger
//!
//! Every message the bridge forwards comes back to it once more: the gateway
//! echoes API sends through its webhook, and the helpdesk fires a callback for
//! every message posted to it. The ledger holds one credit per expected echo,
//! keyed by `(recipient, kind)`, so each round trip lands exactly once on each
//! side.
//!
//! Two independent counter maps:
//! - `outgoing_provider` — consumed by the helpdesk-callback processor; a
//!   present credit means the callback is the helpdesk's own record of a
//!   message that already exists at the gateway.
//! - `outgoing_helpdesk` — consumed when a `fromMe && fromApi` gateway event
//!   arrives; a present credit means the event is the gateway's echo of a send
//!   this bridge performed.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::event::MessageKind;

type CounterMap = HashMap<String, HashMap<String, u32>>;

/// Snapshot of both counter maps, served by the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    /// Pending gateway-echo credits
    pub outgoing_provider: CounterMap,
    /// Pending helpdesk-echo credits
    pub outgoing_helpdesk: CounterMap,
}

/// Process-wide echo-suppression ledger
#[derive(Debug, Default)]
pub struct CreditLedger {
    provider: Mutex<CounterMap>,
    helpdesk: Mutex<CounterMap>,
}

fn add(map: &mut CounterMap, recipient: &str, kind: MessageKind) {
    *map.entry(recipient.to_string())
        .or_default()
        .entry(kind.as_str().to_string())
        .or_insert(0) += 1;
}

/// Decrement a counter, collapsing zero entries. Reports whether a credit
/// existed.
fn take(map: &mut CounterMap, recipient: &str, kind: MessageKind) -> bool {
    let Some(kinds) = map.get_mut(recipient) else {
        return false;
    };
    let Some(count) = kinds.get_mut(kind.as_str()) else {
        return false;
    };
    if *count == 0 {
        kinds.remove(kind.as_str());
        if kinds.is_empty() {
            map.remove(recipient);
        }
        return false;
    }
    *count -= 1;
    if *count == 0 {
        kinds.remove(kind.as_str());
        if kinds.is_empty() {
            map.remove(recipient);
        }
    }
    true
}

impl CreditLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit one expected gateway echo for `(recipient, kind)`
    pub fn add_provider_echo(&self, recipient: &str, kind: MessageKind) {
        add(
            &mut self.provider.lock().expect("ledger lock poisoned"),
            recipient,
            kind,
        );
    }

    /// Consume one gateway-echo credit; true when a credit was present
    pub fn consume_provider_echo(&self, recipient: &str, kind: MessageKind) -> bool {
        take(
            &mut self.provider.lock().expect("ledger lock poisoned"),
            recipient,
            kind,
        )
    }

    /// Credit one expected helpdesk echo for `(recipient, kind)`
    pub fn add_helpdesk_echo(&self, recipient: &str, kind: MessageKind) {
        add(
            &mut self.helpdesk.lock().expect("ledger lock poisoned"),
            recipient,
            kind,
        );
    }

    /// Consume one helpdesk-echo credit
    ///
    /// Inverted sentinel: returns `true` when no credit was tracked, meaning
    /// the event did not come from this bridge and may proceed exactly once.
    /// Returns `false` after consuming a present credit, meaning the event is
    /// the echo of a send the bridge already performed.
    pub fn consume_helpdesk_echo(&self, recipient: &str, kind: MessageKind) -> bool {
        !take(
            &mut self.helpdesk.lock().expect("ledger lock poisoned"),
            recipient,
            kind,
        )
    }

    /// Drop every counter in both maps
    pub fn clear(&self) {
        self.provider.lock().expect("ledger lock poisoned").clear();
        self.helpdesk.lock().expect("ledger lock poisoned").clear();
    }

    /// Copy of both counter maps
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            outgoing_provider: self.provider.lock().expect("ledger lock poisoned").clone(),
            outgoing_helpdesk: self.helpdesk.lock().expect("ledger lock poisoned").clone(),
        }
    }
}
