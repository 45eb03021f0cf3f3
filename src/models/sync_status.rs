use serde::{Deserialize, Serialize};

/// Where a local record stands relative to the server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Modified locally, not yet pushed.
    Pending,
    /// Handed to the server; waiting for the push to finish.
    InFlight,
    /// Rejected by server-side validation.
    Invalid,
    /// Matches the server copy.
    Done,
}

impl SyncStatus {
    /// Unsynced local edits win over the server copy.
    pub fn is_dirty(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::InFlight)
    }
}

/// A pulled record may replace the local one only when there is no local
/// copy, or the local copy carries no unsynced edit.
pub fn can_be_overridden_by_server_copy(local: Option<SyncStatus>) -> bool {
    match local {
        None => true,
        Some(status) => !status.is_dirty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clean_or_missing_records_accept_server_copies() {
        assert!(can_be_overridden_by_server_copy(None));
        assert!(can_be_overridden_by_server_copy(Some(SyncStatus::Done)));
        assert!(can_be_overridden_by_server_copy(Some(SyncStatus::Invalid)));
        assert!(!can_be_overridden_by_server_copy(Some(SyncStatus::Pending)));
        assert!(!can_be_overridden_by_server_copy(Some(SyncStatus::InFlight)));
    }

    #[test]
    fn serializes_in_upper_snake_case() {
        let json = serde_json::to_string(&SyncStatus::InFlight).unwrap();
        assert_eq!(json, "\"IN_FLIGHT\"");
    }
}
