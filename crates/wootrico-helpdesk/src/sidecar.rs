//! Inbox sidecar file
//!
//! The adopted inbox id is persisted per tenant so restarts skip rediscovery
//! and never create duplicate inboxes.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Persisted inbox adoption record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarFile {
    /// Adopted inbox id
    pub inbox_id: i64,
    /// Inbox name at adoption time
    pub inbox_name: String,
    /// When the record was written
    pub saved_at: DateTime<Utc>,
}

/// Read a sidecar record; a missing or unreadable file is simply `None`
#[must_use]
pub fn read(path: &Path) -> Option<SidecarFile> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Persist a sidecar record, creating parent directories as needed
pub fn write(path: &Path, inbox_id: i64, inbox_name: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Sidecar(e.to_string()))?;
    }
    let record = SidecarFile {
        inbox_id,
        inbox_name: inbox_name.to_string(),
        saved_at: Utc::now(),
    };
    let raw = serde_json::to_string_pretty(&record).map_err(|e| Error::Sidecar(e.to_string()))?;
    std::fs::write(path, raw).map_err(|e| Error::Sidecar(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = std::env::temp_dir().join("wootrico-sidecar-test");
        let path = dir.join("app-data-1-atendimento.json");
        let _ = std::fs::remove_file(&path);

        assert!(read(&path).is_none());
        write(&path, 7, "Atendimento").unwrap();

        let record = read(&path).unwrap();
        assert_eq!(record.inbox_id, 7);
        assert_eq!(record.inbox_name, "Atendimento");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"inboxId\""));
        assert!(raw.contains("\"inboxName\""));
        assert!(raw.contains("\"savedAt\""));

        let _ = std::fs::remove_file(&path);
    }
}
