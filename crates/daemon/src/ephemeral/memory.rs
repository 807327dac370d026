use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{EphemeralError, EphemeralStore};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    deadline: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

/// In-process [`EphemeralStore`]. Every operation holds the map lock for
/// its whole duration, so each one is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

fn bytes_of(key: &str, entry: &Entry) -> Result<Vec<u8>, EphemeralError> {
    match &entry.value {
        Value::Bytes(b) => Ok(b.clone()),
        Value::Set(_) => Err(EphemeralError::WrongType(key.to_string())),
    }
}

#[async_trait::async_trait]
impl EphemeralStore for MemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), EphemeralError> {
        let deadline = Instant::now() + ttl;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                deadline,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if Self::live_entry(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                deadline: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EphemeralError> {
        let mut entries = self.entries.lock();
        Self::live_entry(&mut entries, key, Instant::now())
            .map(|entry| bytes_of(key, entry))
            .transpose()
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let bytes = match Self::live_entry(&mut entries, key, now) {
            Some(entry) => bytes_of(key, entry)?,
            None => return Ok(None),
        };
        entries.remove(key);
        Ok(Some(bytes))
    }

    async fn delete(&self, key: &str) -> Result<bool, EphemeralError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|entry| entry.live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, EphemeralError> {
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key, Instant::now()).is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let Some(entry) = Self::live_entry(&mut entries, key, now) else {
            return Ok(false);
        };
        match &entry.value {
            Value::Bytes(current) if current.as_slice() == expected => {
                entry.value = Value::Bytes(new);
                entry.deadline = now + ttl;
                Ok(true)
            }
            Value::Bytes(_) => Ok(false),
            Value::Set(_) => Err(EphemeralError::WrongType(key.to_string())),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, now) {
            Some(entry) => {
                entry.deadline = now + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, now) {
            Some(entry) => match &mut entry.value {
                Value::Set(members) => {
                    entry.deadline = now + ttl;
                    Ok(members.insert(member.to_string()))
                }
                Value::Bytes(_) => Err(EphemeralError::WrongType(key.to_string())),
            },
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(HashSet::from([member.to_string()])),
                        deadline: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_members(&self, key: &str) -> Result<Option<HashSet<String>>, EphemeralError> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, Instant::now()) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(Some(members.clone())),
            Some(_) => Err(EphemeralError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<usize, EphemeralError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.live(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), MINUTE).await.unwrap();
        assert_eq!(store.take("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.take("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), MINUTE).await.unwrap();
        store.set_add("s", "1", MINUTE).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.set_members("s").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_expire() {
        let store = MemoryStore::new();
        store.set("short", vec![], Duration::from_secs(1)).await.unwrap();
        store.set("long", vec![], Duration::from_secs(1)).await.unwrap();
        assert!(store.expire("long", MINUTE).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.exists("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();
        assert!(!store
            .compare_and_swap("k", b"a", b"b".to_vec(), MINUTE)
            .await
            .unwrap());

        store.set("k", b"a".to_vec(), MINUTE).await.unwrap();
        assert!(store
            .compare_and_swap("k", b"a", b"b".to_vec(), MINUTE)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("k", b"a", b"c".to_vec(), MINUTE)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", vec![1], MINUTE).await.unwrap());
        assert!(!store.set_if_absent("k", vec![2], MINUTE).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_concurrent_set_adds_union() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.set_add("parts", &(i % 16).to_string(), MINUTE).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.set_members("parts").await.unwrap().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set_add("s", "1", MINUTE).await.unwrap();
        assert!(matches!(
            store.get("s").await,
            Err(EphemeralError::WrongType(_))
        ));
        store.set("b", vec![], MINUTE).await.unwrap();
        assert!(matches!(
            store.set_add("b", "1", MINUTE).await,
            Err(EphemeralError::WrongType(_))
        ));
    }
}
