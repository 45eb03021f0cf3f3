use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    ApprovedForSyncing,
    Requested,
    Disapproved,
}

impl UserStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved_for_syncing" => Some(UserStatus::ApprovedForSyncing),
            "requested" => Some(UserStatus::Requested),
            "disapproved" => Some(UserStatus::Disapproved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedInUser {
    pub id: Uuid,
    pub facility_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub status: UserStatus,
}

impl LoggedInUser {
    pub fn can_sync_data(&self) -> bool {
        self.status == UserStatus::ApprovedForSyncing
    }
}

/// Shared handle to whoever is logged in on this device.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    user: Arc<RwLock<Option<LoggedInUser>>>,
}

impl UserSession {
    pub fn new(user: Option<LoggedInUser>) -> Self {
        Self {
            user: Arc::new(RwLock::new(user)),
        }
    }

    pub fn logged_in_user(&self) -> Option<LoggedInUser> {
        match self.user.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_user(&self, user: Option<LoggedInUser>) {
        match self.user.write() {
            Ok(mut guard) => *guard = user,
            Err(poisoned) => *poisoned.into_inner() = user,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in_user().is_some()
    }

    pub fn can_sync_data(&self) -> bool {
        self.logged_in_user()
            .map(|user| user.can_sync_data())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(status: UserStatus) -> LoggedInUser {
        LoggedInUser {
            id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            access_token: "token".to_string(),
            status,
        }
    }

    #[test]
    fn only_approved_users_can_sync() {
        let session = UserSession::default();
        assert!(!session.can_sync_data());

        session.set_user(Some(user(UserStatus::Requested)));
        assert!(session.is_logged_in());
        assert!(!session.can_sync_data());

        session.set_user(Some(user(UserStatus::ApprovedForSyncing)));
        assert!(session.can_sync_data());

        let clone = session.clone();
        clone.set_user(None);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn parses_status_names() {
        assert_eq!(
            UserStatus::parse("APPROVED_FOR_SYNCING"),
            Some(UserStatus::ApprovedForSyncing)
        );
        assert_eq!(UserStatus::parse("banned"), None);
    }
}
