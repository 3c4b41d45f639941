use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::TrackerStore;
use crate::TrackerError;

/// Process-local tracker store.
///
/// Entries expire like their Redis counterparts. Used by tests, by the
/// `readfile` command and when no external store is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, (i64, Instant)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_expired(entries: &mut HashMap<String, (i64, Instant)>, now: Instant) {
    entries.retain(|_, (_, expires_at)| *expires_at > now);
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, TrackerError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| *value))
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), TrackerError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        evict_expired(&mut entries, now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn set_if(
        &self,
        key: &str,
        claimable: &[i64],
        value: i64,
        ttl: Duration,
    ) -> Result<bool, TrackerError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        evict_expired(&mut entries, now);

        let current = entries.get(key).map(|(value, _)| *value);

        if current.is_some_and(|current| !claimable.contains(&current)) {
            return Ok(false);
        }

        entries.insert(key.to_string(), (value, now + ttl));
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let store = MemoryStore::new();
        store.set("k", 7, Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());

        assert!(store.set_if("k", &[], 1, Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn writes_evict_expired_entries() {
        let store = MemoryStore::new();
        store.set("a", 1, Duration::ZERO).await.unwrap();
        store.set("b", 1, Duration::ZERO).await.unwrap();
        store.set("c", 1, Duration::from_secs(60)).await.unwrap();
        assert!(store.set_if("d", &[], 1, Duration::from_secs(60)).await.unwrap());

        let raw = store.entries.read().unwrap();
        let mut keys: Vec<&String> = raw.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn set_if_respects_claimable_values() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("k", 0, ttl).await.unwrap();

        assert!(store.set_if("k", &[0], 1, ttl).await.unwrap());
        assert!(!store.set_if("k", &[0], 1, ttl).await.unwrap());
        assert_eq!(store.len(), 1);
    }
}
