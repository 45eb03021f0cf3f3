use std::sync::Arc;

use sqlx::SqlitePool;

use crate::services::DataSync;
use crate::session::UserSession;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub data_sync: Arc<DataSync>,
    pub session: UserSession,
}
