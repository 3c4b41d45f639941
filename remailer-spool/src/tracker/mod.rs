//! Cross-process read tracker.
//!
//! Each spool id has one entry, `read_tracker_<id>`, holding the integer
//! [`FileStatus`] code with a six hour TTL. The store is the only coordination
//! point between workers, so a claim must be a single atomic step.

mod memory;
mod redis_store;

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use remailer_common::{FileStatus, lifecycle};

pub use self::{memory::MemoryStore, redis_store::RedisStore};
use crate::TrackerError;

pub const TRACKER_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const KEY_PREFIX: &str = "read_tracker_";

/// Key/value operations the tracker needs from a backing store.
#[async_trait]
pub trait TrackerStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<i64>, TrackerError>;

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), TrackerError>;

    /// Atomically store `value` when the key is absent or currently holds one
    /// of `claimable`. Returns whether the write happened.
    async fn set_if(
        &self,
        key: &str,
        claimable: &[i64],
        value: i64,
        ttl: Duration,
    ) -> Result<bool, TrackerError>;
}

#[derive(Debug, Clone)]
pub struct Tracker {
    store: Arc<dyn TrackerStore>,
    ttl: Duration,
}

impl Tracker {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self {
            store,
            ttl: TRACKER_TTL,
        }
    }

    /// A tracker backed by process-local memory.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Connect to the configured store: Redis when an address is given,
    /// process memory otherwise.
    pub async fn connect(redis_addr: Option<&str>) -> Result<Self, TrackerError> {
        match redis_addr.map(str::trim).filter(|addr| !addr.is_empty()) {
            Some(addr) => {
                let store = RedisStore::connect(addr).await?;
                lifecycle!(level = INFO, "Read tracker connected to {addr}");
                Ok(Self::new(Arc::new(store)))
            }
            None => {
                lifecycle!(
                    level = WARN,
                    "No tracker store configured, claims only hold within this process"
                );
                Ok(Self::memory())
            }
        }
    }

    pub fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    pub async fn get_status(&self, id: &str) -> Result<FileStatus, TrackerError> {
        let key = Self::key(id);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| TrackerError::NotFound(key.clone()))?;

        FileStatus::from_code(value).ok_or(TrackerError::InvalidStatus { key, value })
    }

    pub async fn upsert_status(&self, id: &str, status: FileStatus) -> Result<(), TrackerError> {
        tracing::debug!(unit = %id, %status, "Updating tracker status");
        self.store.set(&Self::key(id), status.code(), self.ttl).await
    }

    /// Move `id` from absent or INIT to PROCESSING. Any other status means
    /// the unit is in flight or finished.
    pub async fn claim(&self, id: &str) -> Result<bool, TrackerError> {
        self.store
            .set_if(
                &Self::key(id),
                &[FileStatus::Init.code()],
                FileStatus::Processing.code(),
                self.ttl,
            )
            .await
    }
}
