#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use clinic_sync::error::AppError;
use clinic_sync::remote::{DataPushResponse, SyncApi, ValidationErrors};
use clinic_sync::session::{LoggedInUser, UserSession, UserStatus};
use serde_json::{Value, json};
use uuid::Uuid;

/// In-process stand-in for the sync server.
///
/// Each endpoint keeps an append-only change log. Pull tokens are offsets
/// into that log, so a pull resumes exactly where the previous one stopped.
#[derive(Default)]
pub struct FakeSyncServer {
    logs: Mutex<HashMap<String, Vec<Value>>>,
    rejected: Mutex<HashSet<Uuid>>,
    offline: AtomicBool,
    pub push_calls: AtomicUsize,
    pub pull_calls: AtomicUsize,
}

fn resource_of(endpoint: &str) -> &str {
    endpoint.split('/').nth(1).unwrap_or(endpoint)
}

impl FakeSyncServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, id: Uuid) {
        self.rejected.lock().unwrap().insert(id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// A change made on the server by another device.
    pub fn seed(&self, endpoint: &str, payload: Value) {
        self.logs
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push(payload);
    }

    pub fn received(&self, endpoint: &str) -> Vec<Value> {
        self.logs
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SyncApi for FakeSyncServer {
    async fn push(
        &self,
        endpoint: &str,
        _resource: &str,
        payloads: Vec<Value>,
    ) -> Result<DataPushResponse, AppError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("server unreachable".to_string()));
        }

        let rejected = self.rejected.lock().unwrap().clone();
        let mut errors = Vec::new();
        let mut logs = self.logs.lock().unwrap();
        let log = logs.entry(endpoint.to_string()).or_default();

        for payload in payloads {
            let id = payload["id"]
                .as_str()
                .and_then(|id| Uuid::parse_str(id).ok())
                .expect("payload without id");
            if rejected.contains(&id) {
                errors.push(ValidationErrors {
                    id,
                    schema: vec!["rejected by test".to_string()],
                    fields: HashMap::new(),
                });
            } else {
                log.push(payload);
            }
        }

        Ok(DataPushResponse { errors })
    }

    async fn pull(&self, endpoint: &str, cursor: Option<&str>, limit: u32) -> Result<Value, AppError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("server unreachable".to_string()));
        }

        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let logs = self.logs.lock().unwrap();
        let log = logs.get(endpoint).cloned().unwrap_or_default();
        let end = (offset + limit as usize).min(log.len());
        let page: Vec<Value> = log.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();

        let mut body = serde_json::Map::new();
        body.insert(resource_of(endpoint).to_string(), Value::Array(page));
        body.insert("process_token".to_string(), json!(end.to_string()));
        Ok(Value::Object(body))
    }
}

pub fn user(status: UserStatus) -> LoggedInUser {
    LoggedInUser {
        id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        access_token: "test-token".to_string(),
        status,
    }
}

pub fn approved_session() -> UserSession {
    UserSession::new(Some(user(UserStatus::ApprovedForSyncing)))
}

pub fn facility_payload(name: &str) -> Value {
    let now = Utc::now();
    json!({
        "id": Uuid::new_v4(),
        "name": name,
        "facility_type": "PHC",
        "district": "Bathinda",
        "state": "Punjab",
        "country": "India",
        "protocol_id": null,
        "created_at": now,
        "updated_at": now,
        "deleted_at": null
    })
}
