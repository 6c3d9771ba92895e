//! In-process cache backend.
//!
//! Entries live in an LRU map bounded by the configured capacity. Every write
//! takes a fresh sequence number and a `BTreeMap` from sequence to key gives
//! scans a stable order: the cursor is the last sequence number examined, so
//! keys deleted between pages never shift the remaining ones.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Bound;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::lock::mutex_lock;
use super::store::{CacheError, KvCache, ScanCursor, ScanPage};

const SOURCE: &str = "cache::memory";

struct Entry {
    value: Bytes,
    expires_at: Instant,
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    index: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.index.remove(&entry.seq);
        Some(entry)
    }
}

pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                index: BTreeMap::new(),
                next_seq: 1,
            }),
        }
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        mutex_lock(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut inner = mutex_lock(&self.inner, SOURCE, "get");

        match inner.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        inner.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::backend(format!("ttl {ttl:?} overflows the clock")))?;

        let mut inner = mutex_lock(&self.inner, SOURCE, "set_with_ttl");
        inner.remove(key);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.index.insert(seq, key.to_string());

        let entry = Entry {
            value,
            expires_at,
            seq,
        };
        if let Some((_, evicted)) = inner.entries.push(key.to_string(), entry) {
            inner.index.remove(&evicted.seq);
        }
        Ok(())
    }

    async fn scan(
        &self,
        cursor: ScanCursor,
        prefix: &str,
        page_size: u32,
    ) -> Result<ScanPage, CacheError> {
        let now = Instant::now();
        let page_size = page_size.max(1) as usize;
        let mut inner = mutex_lock(&self.inner, SOURCE, "scan");

        let mut keys = Vec::new();
        let mut expired = Vec::new();
        let mut last_seen = None;

        for (seq, key) in inner
            .index
            .range((Bound::Excluded(cursor.0), Bound::Unbounded))
            .take(page_size)
        {
            last_seen = Some(*seq);
            if !key.starts_with(prefix) {
                continue;
            }
            match inner.entries.peek(key) {
                Some(entry) if entry.is_live(now) => keys.push(key.clone()),
                _ => expired.push(key.clone()),
            }
        }

        for key in &expired {
            inner.remove(key);
        }

        let next = match last_seen {
            Some(seq)
                if inner
                    .index
                    .range((Bound::Excluded(seq), Bound::Unbounded))
                    .next()
                    .is_some() =>
            {
                ScanCursor(seq)
            }
            _ => ScanCursor::START,
        };

        Ok(ScanPage { keys, next })
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut inner = mutex_lock(&self.inner, SOURCE, "delete");

        let removed = keys
            .iter()
            .filter_map(|key| inner.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache(capacity: usize) -> MemoryCache {
        MemoryCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    async fn scan_all(cache: &MemoryCache, prefix: &str, page_size: u32) -> Vec<String> {
        let mut cursor = ScanCursor::START;
        let mut keys = Vec::new();
        loop {
            let page = cache.scan(cursor, prefix, page_size).await.unwrap();
            keys.extend(page.keys);
            if page.next.is_complete() {
                break;
            }
            cursor = page.next;
        }
        keys
    }

    #[tokio::test]
    async fn get_returns_stored_value() {
        let cache = cache(8);
        cache
            .set_with_ttl("k", Bytes::from_static(b"v"), HOUR)
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = cache(8);
        cache
            .set_with_ttl("k", Bytes::from_static(b"v"), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn overwrite_replaces_value_without_duplicating_index() {
        let cache = cache(8);
        cache.set_with_ttl("ns:a", Bytes::from_static(b"1"), HOUR).await.unwrap();
        cache.set_with_ttl("ns:a", Bytes::from_static(b"2"), HOUR).await.unwrap();

        assert_eq!(cache.get("ns:a").await.unwrap(), Some(Bytes::from_static(b"2")));
        assert_eq!(scan_all(&cache, "ns:", 10).await, vec!["ns:a".to_string()]);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = cache(2);
        cache.set_with_ttl("a", Bytes::from_static(b"1"), HOUR).await.unwrap();
        cache.set_with_ttl("b", Bytes::from_static(b"2"), HOUR).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set_with_ttl("c", Bytes::from_static(b"3"), HOUR).await.unwrap();

        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("a").await.unwrap().is_some());
        let mut keys = scan_all(&cache, "", 10).await;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn scan_pages_through_matching_keys_only() {
        let cache = cache(64);
        for i in 0..7 {
            cache
                .set_with_ttl(&format!("ns:user:{i}"), Bytes::from_static(b"x"), HOUR)
                .await
                .unwrap();
            cache
                .set_with_ttl(&format!("other:{i}"), Bytes::from_static(b"x"), HOUR)
                .await
                .unwrap();
        }

        let first = cache.scan(ScanCursor::START, "ns:user:", 3).await.unwrap();
        assert!(!first.next.is_complete());
        assert!(first.keys.len() <= 3);

        let mut keys = scan_all(&cache, "ns:user:", 3).await;
        keys.sort();
        let expected: Vec<String> = (0..7).map(|i| format!("ns:user:{i}")).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn deleting_between_pages_does_not_skip_keys() {
        let cache = cache(64);
        for i in 0..10 {
            cache
                .set_with_ttl(&format!("p:{i}"), Bytes::from_static(b"x"), HOUR)
                .await
                .unwrap();
        }

        let mut cursor = ScanCursor::START;
        let mut deleted = 0;
        loop {
            let page = cache.scan(cursor, "p:", 4).await.unwrap();
            deleted += cache.delete(&page.keys).await.unwrap();
            if page.next.is_complete() {
                break;
            }
            cursor = page.next;
        }

        assert_eq!(deleted, 10);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_counts_only_existing_keys() {
        let cache = cache(8);
        cache.set_with_ttl("a", Bytes::from_static(b"1"), HOUR).await.unwrap();

        let removed = cache
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.delete(&[]).await.unwrap(), 0);
    }
}
