/// In-process counter store.
///
/// Single-instance only: the cross-instance guarantees of the Redis backend
/// hold trivially inside one mutex. Used by tests and development mode.
use crate::cache::CounterStore;
use crate::error::AtlasResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> AtlasResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                Ok(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: ttl.map(|t| Instant::now() + t),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn get(&self, key: &str) -> AtlasResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> AtlasResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> AtlasResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> AtlasResult<Option<i64>> {
        let mut entries = self.entries.lock().unwrap();
        Self::prune(&mut entries, key);
        Ok(entries.get(key).and_then(|e| {
            e.expires_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs() as i64)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_wins_only_once() {
        let store = MemoryStore::new();
        assert!(store.set_nx("k", "1", None).await.unwrap());
        assert!(!store.set_nx("k", "2", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn incr_counts_and_expires() {
        let store = MemoryStore::new();
        let ttl = Some(Duration::from_millis(30));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        // Window elapsed, counter starts over.
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_keys_vanish() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.exists("k").await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
