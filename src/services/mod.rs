pub mod data_sync;
pub mod scheduler;

pub use data_sync::{DataSync, DataSyncStatus, SyncGroupResult, SyncProgress, SyncResult};
pub use scheduler::SyncScheduler;
