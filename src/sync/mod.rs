pub mod coordinator;
pub mod model_sync;

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

pub use coordinator::{PullStats, PushStats};
pub use model_sync::{EntitySync, ModelSync, model_syncs};

/// Syncs that are scheduled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncGroup {
    Frequent,
    Daily,
}

impl SyncGroup {
    pub const ALL: [SyncGroup; 2] = [SyncGroup::Frequent, SyncGroup::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncGroup::Frequent => "frequent",
            SyncGroup::Daily => "daily",
        }
    }

    pub fn interval(&self) -> SyncInterval {
        match self {
            SyncGroup::Frequent => SyncInterval::Frequent,
            SyncGroup::Daily => SyncInterval::Daily,
        }
    }
}

impl fmt::Display for SyncGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frequent" => Ok(SyncGroup::Frequent),
            "daily" => Ok(SyncGroup::Daily),
            other => Err(format!("unknown sync group: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncInterval {
    Frequent,
    Daily,
}

impl SyncInterval {
    pub fn duration(&self) -> Duration {
        match self {
            SyncInterval::Frequent => Duration::from_secs(16 * 60),
            SyncInterval::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    VerySmall,
    Small,
    Medium,
    Large,
}

impl BatchSize {
    pub fn records(&self) -> u32 {
        match self {
            BatchSize::VerySmall => 10,
            BatchSize::Small => 500,
            BatchSize::Medium => 1000,
            BatchSize::Large => 1500,
        }
    }
}

impl FromStr for BatchSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "very_small" => Ok(BatchSize::VerySmall),
            "small" => Ok(BatchSize::Small),
            "medium" => Ok(BatchSize::Medium),
            "large" => Ok(BatchSize::Large),
            other => Err(format!("unknown batch size: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Both,
    PullOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: SyncInterval,
    pub push_batch_size: BatchSize,
    pub pull_batch_size: BatchSize,
    pub group: SyncGroup,
}

impl SyncConfig {
    pub fn for_group(group: SyncGroup, batch_size: BatchSize) -> Self {
        Self {
            interval: group.interval(),
            push_batch_size: batch_size,
            pull_batch_size: batch_size,
            group,
        }
    }
}
