use std::net::SocketAddr;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::remote::RemoteConfig;
use crate::session::{LoggedInUser, UserStatus};
use crate::sync::BatchSize;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub remote: RemoteConfig,
    pub batch_size: BatchSize,
    pub max_parallel_syncs: usize,
    pub user: Option<LoggedInUser>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://clinic.db".to_string());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("LISTEN_ADDR is invalid: {}", e)))?;

        let base_url = var("SYNC_API_URL")
            .ok_or_else(|| AppError::Config("SYNC_API_URL is not set".to_string()))?;

        let timeout_secs = match var("HTTP_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("HTTP_TIMEOUT_SECS is invalid: {}", e)))?,
            None => 30,
        };

        let batch_size = match var("SYNC_BATCH_SIZE") {
            Some(v) => v.parse::<BatchSize>().map_err(AppError::Config)?,
            None => BatchSize::Small,
        };

        let max_parallel_syncs = match var("MAX_PARALLEL_SYNCS") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::Config(format!("MAX_PARALLEL_SYNCS is invalid: {}", v)))?,
            None => 1,
        };

        Ok(Self {
            database_url,
            listen_addr,
            remote: RemoteConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            batch_size,
            max_parallel_syncs,
            user: user_from_lookup(&var)?,
        })
    }
}

/// The user is either fully configured or absent.
fn user_from_lookup<F>(var: &F) -> Result<Option<LoggedInUser>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let keys = ["USER_ID", "FACILITY_ID", "ACCESS_TOKEN"];
    let values: Vec<Option<String>> = keys.iter().map(|k| var(*k)).collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let mut present = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(values) {
        match value {
            Some(v) => present.push(v),
            None => return Err(AppError::Config(format!("{} is not set", key))),
        }
    }

    let parse_uuid = |key: &str, value: &str| {
        Uuid::parse_str(value).map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e)))
    };

    let status = match var("USER_STATUS") {
        Some(v) => UserStatus::parse(&v)
            .ok_or_else(|| AppError::Config(format!("USER_STATUS is invalid: {}", v)))?,
        None => UserStatus::ApprovedForSyncing,
    };

    Ok(Some(LoggedInUser {
        id: parse_uuid("USER_ID", &present[0])?,
        facility_id: parse_uuid("FACILITY_ID", &present[1])?,
        access_token: present[2].clone(),
        status,
    }))
}
