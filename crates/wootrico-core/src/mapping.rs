//! Message-id mapping cache
//!
//! Bidirectional index between helpdesk message ids and gateway message ids,
//! tagged with enough context (conversation, inbox, dialect, tenant) to route
//! deletions and replies without re-resolving anything. The cache is volatile:
//! the eviction task wipes it wholesale every few hours, which bounds memory
//! without persistent storage.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::event::PayloadOrigin;

/// Context stored per helpdesk message id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    /// Gateway message id
    pub provider_msg_id: String,
    /// Helpdesk conversation id
    pub conversation_id: i64,
    /// Helpdesk inbox id
    pub inbox_id: i64,
    /// Gateway dialect that owns the message
    pub origin: PayloadOrigin,
    /// Tenant the message belongs to
    pub tenant_id: String,
}

/// Process-wide bidirectional message-id index
///
/// Keyed by helpdesk message id; the reverse direction is a linear scan over
/// the values, which is fine at the size the periodic wipe allows.
#[derive(Debug, Default)]
pub struct MessageMap {
    entries: Mutex<HashMap<i64, MappingEntry>>,
}

impl MessageMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mapping, displacing any prior entry for the same gateway id
    pub fn store(&self, helpdesk_msg_id: i64, entry: MappingEntry) {
        let mut entries = self.entries.lock().expect("mapping lock poisoned");
        entries.retain(|_, existing| existing.provider_msg_id != entry.provider_msg_id);
        entries.insert(helpdesk_msg_id, entry);
    }

    /// Gateway id for a helpdesk message id
    #[must_use]
    pub fn provider_id_for(&self, helpdesk_msg_id: i64) -> Option<String> {
        self.entries
            .lock()
            .expect("mapping lock poisoned")
            .get(&helpdesk_msg_id)
            .map(|e| e.provider_msg_id.clone())
    }

    /// Helpdesk id for a gateway message id
    #[must_use]
    pub fn helpdesk_id_for(&self, provider_msg_id: &str) -> Option<i64> {
        self.entries
            .lock()
            .expect("mapping lock poisoned")
            .iter()
            .find(|(_, e)| e.provider_msg_id == provider_msg_id)
            .map(|(id, _)| *id)
    }

    /// Full entry for a helpdesk message id
    #[must_use]
    pub fn entry_for(&self, helpdesk_msg_id: i64) -> Option<MappingEntry> {
        self.entries
            .lock()
            .expect("mapping lock poisoned")
            .get(&helpdesk_msg_id)
            .cloned()
    }

    /// Helpdesk id and entry for a gateway message id
    #[must_use]
    pub fn entry_for_provider(&self, provider_msg_id: &str) -> Option<(i64, MappingEntry)> {
        self.entries
            .lock()
            .expect("mapping lock poisoned")
            .iter()
            .find(|(_, e)| e.provider_msg_id == provider_msg_id)
            .map(|(id, e)| (*id, e.clone()))
    }

    /// Remove the mapping for a helpdesk message id
    pub fn remove(&self, helpdesk_msg_id: i64) -> Option<MappingEntry> {
        self.entries
            .lock()
            .expect("mapping lock poisoned")
            .remove(&helpdesk_msg_id)
    }

    /// Drop every entry, returning how many were evicted
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().expect("mapping lock poisoned");
        let evicted = entries.len();
        entries.clear();
        evicted
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("mapping lock poisoned").len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(provider_msg_id: &str) -> MappingEntry {
        MappingEntry {
            provider_msg_id: provider_msg_id.to_string(),
            conversation_id: 9,
            inbox_id: 7,
            origin: PayloadOrigin::Zapi,
            tenant_id: "1".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let map = MessageMap::new();
        map.store(42, entry("ABC"));

        assert_eq!(map.provider_id_for(42).as_deref(), Some("ABC"));
        assert_eq!(map.helpdesk_id_for("ABC"), Some(42));

        map.remove(42);
        assert_eq!(map.provider_id_for(42), None);
        assert_eq!(map.helpdesk_id_for("ABC"), None);
    }

    #[test]
    fn test_provider_id_is_unique() {
        let map = MessageMap::new();
        map.store(42, entry("ABC"));
        map.store(43, entry("ABC"));

        assert_eq!(map.helpdesk_id_for("ABC"), Some(43));
        assert_eq!(map.provider_id_for(42), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_entry_for_provider() {
        let map = MessageMap::new();
        map.store(42, entry("ABC"));

        let (id, found) = map.entry_for_provider("ABC").unwrap();
        assert_eq!(id, 42);
        assert_eq!(found.conversation_id, 9);
        assert_eq!(found.inbox_id, 7);
        assert!(map.entry_for_provider("missing").is_none());
    }

    #[test]
    fn test_clear_reports_evictions() {
        let map = MessageMap::new();
        map.store(1, entry("A"));
        map.store(2, entry("B"));

        assert_eq!(map.clear(), 2);
        assert!(map.is_empty());
    }
}
