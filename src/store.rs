//! The shared keyed store: a single map behind a read/write lock.
//!
//! Expiration is lazy. Readers that observe an entry past its deadline
//! promote to the write lock, re-check, and evict; there is no background
//! sweeper. Every mutating operation validates before touching the map, so a
//! failed command never leaves a partial write behind.

use std::collections::HashMap;

use globset::GlobMatcher;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::stream::{IdSpec, Stream, StreamError, StreamId};

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// The payload of a store entry; the variant is the entry's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub data: DataType,
    pub expiration: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expiration.is_some_and(|deadline| now > deadline)
    }
}

#[derive(Debug, Default)]
pub struct Store {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Returns the entry for `key` if present and not past its deadline.
    ///
    /// An expired entry is removed and reported absent.
    pub async fn get(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        // Expired: promote to exclusive access and re-check before evicting.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// Unconditional overwrite; replaces value, kind, and expiration.
    pub async fn set(&self, key: String, data: DataType, expiration: Option<Instant>) {
        let mut entries = self.entries.write().await;
        entries.insert(key, Entry { data, expiration });
    }

    /// Removes `key`, reporting whether a live entry was dropped. An entry
    /// already past its deadline is evicted but counts as absent.
    pub async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => !entry.is_expired(Instant::now()),
            None => false,
        }
    }

    pub async fn type_of(&self, key: &str) -> &'static str {
        match self.get(key).await {
            None => "none",
            Some(entry) => match entry.data {
                DataType::String(_) => "string",
                DataType::Stream(_) => "stream",
            },
        }
    }

    /// All live keys matching `matcher`. Expired entries encountered along
    /// the way are evicted.
    pub async fn keys(&self, matcher: &GlobMatcher) -> Vec<String> {
        let now = Instant::now();
        let mut matched = Vec::new();
        let mut expired = Vec::new();
        {
            let entries = self.entries.read().await;
            for (key, entry) in entries.iter() {
                if entry.is_expired(now) {
                    expired.push(key.clone());
                } else if matcher.is_match(key) {
                    matched.push(key.clone());
                }
            }
        }

        if !expired.is_empty() {
            let mut entries = self.entries.write().await;
            for key in expired {
                if entries.get(&key).is_some_and(|entry| entry.is_expired(now)) {
                    entries.remove(&key);
                }
            }
        }

        matched
    }

    /// Increments the integer stored at `key`, creating `1` for a missing
    /// key. The expiration of an existing entry is preserved.
    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            entries.remove(key);
        }

        if let Some(entry) = entries.get_mut(key) {
            let DataType::String(current) = &mut entry.data else {
                return Err(StoreError::WrongType);
            };
            let value = current
                .parse::<i64>()
                .ok()
                .and_then(|n| n.checked_add(1))
                .ok_or(StoreError::NotAnInteger)?;
            *current = value.to_string();
            return Ok(value);
        }

        entries.insert(
            key.to_string(),
            Entry {
                data: DataType::String("1".to_string()),
                expiration: None,
            },
        );
        Ok(1)
    }

    /// Appends an entry to the stream at `key`, creating the stream on first
    /// use. The append mutates the stored stream in place, under the write
    /// lock, so concurrent appends cannot be lost.
    pub async fn append_stream(
        &self,
        key: &str,
        spec: IdSpec,
        fields: Vec<(String, String)>,
    ) -> Result<StreamId, StoreError> {
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            data: DataType::Stream(Stream::new()),
            expiration: None,
        });
        let DataType::Stream(stream) = &mut entry.data else {
            return Err(StoreError::WrongType);
        };
        Ok(stream.append(spec, fields)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use globset::Glob;

    use super::*;
    use crate::stream::StreamId;

    fn string_entry(value: &str) -> DataType {
        DataType::String(value.to_string())
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = Store::new();
        store.set("grape".to_string(), string_entry("mango"), None).await;

        let entry = store.get("grape").await.expect("entry missing");
        assert_eq!(entry.data, string_entry("mango"));
        assert_eq!(entry.expiration, None);
        assert_eq!(store.get("absent").await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_kind() {
        let store = Store::new();
        store
            .append_stream("k", IdSpec::Explicit(StreamId { ms: 1, seq: 1 }), vec![])
            .await
            .expect("append failed");
        assert_eq!(store.type_of("k").await, "stream");

        store.set("k".to_string(), string_entry("v"), None).await;
        assert_eq!(store.type_of("k").await, "string");
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        tokio::time::pause();
        let store = Store::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        store
            .set("k".to_string(), string_entry("v"), Some(deadline))
            .await;

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(store.get("k").await.is_some(), "entry gone before deadline");

        tokio::time::advance(Duration::from_millis(90)).await;
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.type_of("k").await, "none");
    }

    #[tokio::test]
    async fn test_entry_without_deadline_never_expires() {
        tokio::time::pause();
        let store = Store::new();
        store.set("k".to_string(), string_entry("v"), None).await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(store.get("k").await.is_some());
    }

    #[tokio::test]
    async fn test_delete_reports_live_entries_only() {
        tokio::time::pause();
        let store = Store::new();
        store.set("live".to_string(), string_entry("v"), None).await;
        store
            .set(
                "dead".to_string(),
                string_entry("v"),
                Some(Instant::now() + Duration::from_millis(5)),
            )
            .await;
        tokio::time::advance(Duration::from_millis(20)).await;

        assert!(store.delete("live").await);
        assert!(!store.delete("dead").await);
        assert!(!store.delete("missing").await);
    }

    #[tokio::test]
    async fn test_keys_matches_globs_and_skips_expired() {
        tokio::time::pause();
        let store = Store::new();
        store.set("user:1".to_string(), string_entry("a"), None).await;
        store.set("user:2".to_string(), string_entry("b"), None).await;
        store
            .set(
                "user:3".to_string(),
                string_entry("c"),
                Some(Instant::now() + Duration::from_millis(5)),
            )
            .await;
        store.set("other".to_string(), string_entry("d"), None).await;
        tokio::time::advance(Duration::from_millis(20)).await;

        let matcher = Glob::new("user:*").expect("bad glob").compile_matcher();
        let mut keys = store.keys(&matcher).await;
        keys.sort();
        assert_eq!(keys, vec!["user:1".to_string(), "user:2".to_string()]);
    }

    #[tokio::test]
    async fn test_incr_counts_from_one_and_preserves_expiration() {
        tokio::time::pause();
        let store = Store::new();
        assert_eq!(store.incr("counter").await, Ok(1));
        assert_eq!(store.incr("counter").await, Ok(2));

        let deadline = Instant::now() + Duration::from_secs(10);
        store
            .set("timed".to_string(), string_entry("41"), Some(deadline))
            .await;
        assert_eq!(store.incr("timed").await, Ok(42));
        let entry = store.get("timed").await.expect("entry missing");
        assert_eq!(entry.expiration, Some(deadline));
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integers() {
        let store = Store::new();
        store.set("text".to_string(), string_entry("mango"), None).await;
        assert_eq!(store.incr("text").await, Err(StoreError::NotAnInteger));

        store
            .append_stream("s", IdSpec::Explicit(StreamId { ms: 1, seq: 1 }), vec![])
            .await
            .expect("append failed");
        assert_eq!(store.incr("s").await, Err(StoreError::WrongType));
    }

    #[tokio::test]
    async fn test_append_stream_creates_and_validates() {
        let store = Store::new();
        let first = store
            .append_stream("s", IdSpec::Explicit(StreamId { ms: 1, seq: 1 }), vec![])
            .await;
        assert_eq!(first, Ok(StreamId { ms: 1, seq: 1 }));

        let regressed = store
            .append_stream("s", IdSpec::Explicit(StreamId { ms: 1, seq: 1 }), vec![])
            .await;
        assert_eq!(
            regressed,
            Err(StoreError::Stream(StreamError::Regression))
        );

        store.set("plain".to_string(), string_entry("v"), None).await;
        let wrong = store
            .append_stream("plain", IdSpec::Explicit(StreamId { ms: 2, seq: 0 }), vec![])
            .await;
        assert_eq!(wrong, Err(StoreError::WrongType));
    }
}
