pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;
use crate::session::UserSession;

pub use dto::{DataPullResponse, DataPushResponse, ValidationErrors};

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// The server half of the sync protocol. Payloads travel as JSON values so
/// one implementation serves every entity.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// POST `payloads` wrapped as `{ "<resource>": [...] }`.
    async fn push(
        &self,
        endpoint: &str,
        resource: &str,
        payloads: Vec<Value>,
    ) -> Result<DataPushResponse, AppError>;

    /// GET up to `limit` records changed after `cursor`.
    async fn pull(&self, endpoint: &str, cursor: Option<&str>, limit: u32) -> Result<Value, AppError>;
}

pub struct HttpSyncApi {
    client: Client,
    base_url: Url,
    session: UserSession,
}

impl HttpSyncApi {
    pub fn new(config: RemoteConfig, session: UserSession) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;

        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::Config(format!("Invalid sync api url {}: {}", config.base_url, e)))?;
        // `Url::join` drops the last path segment unless it ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    fn url(&self, endpoint: &str) -> Result<Url, AppError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| AppError::Config(format!("Invalid endpoint {}: {}", endpoint, e)))
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, AppError> {
        let user = self
            .session
            .logged_in_user()
            .ok_or(AppError::Unauthenticated)?;

        Ok(request
            .bearer_auth(&user.access_token)
            .header("X-USER-ID", user.id.to_string())
            .header("X-FACILITY-ID", user.facility_id.to_string()))
    }

    async fn check_status(response: Response) -> Result<Response, AppError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn push(
        &self,
        endpoint: &str,
        resource: &str,
        payloads: Vec<Value>,
    ) -> Result<DataPushResponse, AppError> {
        let url = self.url(endpoint)?;
        debug!("POST {} ({} records)", url, payloads.len());

        let mut body = Map::new();
        body.insert(resource.to_string(), Value::Array(payloads));

        let response = self
            .authorize(self.client.post(url))?
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(response.json::<DataPushResponse>().await?)
    }

    async fn pull(&self, endpoint: &str, cursor: Option<&str>, limit: u32) -> Result<Value, AppError> {
        let mut url = self.url(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(token) = cursor {
                query.append_pair("process_token", token);
            }
        }
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(url))?.send().await?;
        let response = Self::check_status(response).await?;

        Ok(response.json::<Value>().await?)
    }
}

/// Accepts every push and has nothing to pull.
pub struct NoopSyncApi;

#[async_trait]
impl SyncApi for NoopSyncApi {
    async fn push(
        &self,
        _endpoint: &str,
        _resource: &str,
        _payloads: Vec<Value>,
    ) -> Result<DataPushResponse, AppError> {
        Ok(DataPushResponse::default())
    }

    async fn pull(&self, _endpoint: &str, _cursor: Option<&str>, _limit: u32) -> Result<Value, AppError> {
        Ok(Value::Object(Map::new()))
    }
}
