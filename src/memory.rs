//! In-process object store.
//!
//! Backs the test suite. Timestamps come from a private clock that starts at
//! a fixed instant and advances one second per write, so listings are
//! reproducible.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::{stream, StreamExt};

use crate::store::{BucketInfo, ObjectEntry, ObjectStat, ObjectStore, ObjectStream, StoreError};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

struct MemoryBucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Default)]
struct Faults {
    listings: bool,
    bucket_listing: bool,
    removes: bool,
    put_keys_containing: HashSet<String>,
}

struct MemoryInner {
    buckets: BTreeMap<String, MemoryBucket>,
    clock: DateTime<Utc>,
    page_size: usize,
    repeat_page_tail: bool,
    faults: Faults,
    remove_calls: Vec<Vec<String>>,
}

pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let clock = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            inner: Mutex::new(MemoryInner {
                buckets: BTreeMap::new(),
                clock,
                page_size: DEFAULT_PAGE_SIZE,
                repeat_page_tail: false,
                faults: Faults::default(),
                remove_calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_bucket(self, name: &str) -> Self {
        self.create_bucket(name);
        self
    }

    pub fn create_bucket(&self, name: &str) {
        let mut inner = self.lock();
        let created = inner.tick();
        inner
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| MemoryBucket {
                created,
                objects: BTreeMap::new(),
            });
    }

    /// Splits listings into pages of `page_size`, and when `repeat_tail` is
    /// set re-emits the last key of each page at the start of the next one,
    /// the way a sloppy continuation token would.
    pub fn set_paging(&self, page_size: usize, repeat_tail: bool) {
        let mut inner = self.lock();
        inner.page_size = page_size.max(1);
        inner.repeat_page_tail = repeat_tail;
    }

    pub fn fail_listings(&self, fail: bool) {
        self.lock().faults.listings = fail;
    }

    pub fn fail_bucket_listing(&self, fail: bool) {
        self.lock().faults.bucket_listing = fail;
    }

    pub fn fail_removes(&self, fail: bool) {
        self.lock().faults.removes = fail;
    }

    pub fn fail_puts_containing(&self, fragment: &str) {
        self.lock()
            .faults
            .put_keys_containing
            .insert(fragment.to_string());
    }

    pub fn insert_at(&self, bucket: &str, key: &str, body: &[u8], at: DateTime<Utc>) {
        let mut inner = self.lock();
        let created = inner.clock;
        inner
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                created,
                objects: BTreeMap::new(),
            })
            .objects
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.to_vec(),
                    content_type: crate::keys::mime_type_for(key).to_string(),
                    last_modified: at,
                },
            );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    pub fn remove_calls(&self) -> Vec<Vec<String>> {
        self.lock().remove_calls.clone()
    }
}

impl MemoryInner {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn listing(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, StoreError> {
        let Some(stored) = self.buckets.get(bucket) else {
            return Err(StoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                message: "NoSuchBucket".to_string(),
            });
        };

        let matching: Vec<ObjectEntry> = stored
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| recursive || !key[prefix.len()..].contains('/'))
            .map(|(key, object)| ObjectEntry::new(key.clone(), object.last_modified))
            .collect();

        if !self.repeat_page_tail {
            return Ok(matching);
        }

        let mut paged = Vec::with_capacity(matching.len());
        for (index, page) in matching.chunks(self.page_size).enumerate() {
            if index > 0 {
                if let Some(previous) = paged.last().cloned() {
                    paged.push(previous);
                }
            }
            paged.extend_from_slice(page);
        }
        Ok(paged)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    fn list_objects(&self, bucket: &str, prefix: &str, recursive: bool) -> ObjectStream {
        let inner = self.lock();
        let listing = inner.listing(bucket, prefix, recursive);
        let fail = inner.faults.listings;
        drop(inner);

        let mut events: Vec<Result<ObjectEntry, StoreError>> = match listing {
            Ok(entries) => entries.into_iter().map(Ok).collect(),
            Err(err) => vec![Err(err)],
        };
        if fail {
            events.truncate(1);
            events.push(Err(StoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                message: "connection reset".to_string(),
            }));
        }
        stream::iter(events).boxed()
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner
            .faults
            .put_keys_containing
            .iter()
            .any(|fragment| key.contains(fragment.as_str()))
        {
            return Err(StoreError::Put {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        let last_modified = inner.tick();
        let Some(stored) = inner.buckets.get_mut(bucket) else {
            return Err(StoreError::Put {
                key: key.to_string(),
                message: "NoSuchBucket".to_string(),
            });
        };
        stored.objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: content_type.to_string(),
                last_modified,
            },
        );
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError> {
        let inner = self.lock();
        inner
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|object| ObjectStat {
                size: object.body.len() as i64,
                last_modified: object.last_modified,
                content_type: Some(object.content_type.clone()),
            })
            .ok_or_else(|| StoreError::Stat {
                key: key.to_string(),
                message: "NoSuchKey".to_string(),
            })
    }

    async fn remove_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.remove_calls.push(keys.to_vec());
        if inner.faults.removes {
            return Err(StoreError::Remove("injected failure".to_string()));
        }
        if let Some(stored) = inner.buckets.get_mut(bucket) {
            for key in keys {
                stored.objects.remove(key);
            }
        }
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StoreError> {
        let inner = self.lock();
        if inner.faults.bucket_listing {
            return Err(StoreError::Buckets("InvalidAccessKeyId".to_string()));
        }
        Ok(inner
            .buckets
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                creation_date: Some(bucket.created),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collect_listing;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[tokio::test]
    async fn non_recursive_listing_skips_nested_keys() {
        let store = MemoryStore::new().with_bucket("b");
        store.insert_at("b", "f/thumb/x.jpg", b"", at(1));
        store.insert_at("b", "f/thumb/sub/y.jpg", b"", at(2));
        store.insert_at("b", "g/z.jpg", b"", at(3));

        let flat = collect_listing(store.list_objects("b", "f/thumb/", false))
            .await
            .unwrap();
        assert_eq!(flat, vec![ObjectEntry::new("f/thumb/x.jpg", at(1))]);

        let deep = collect_listing(store.list_objects("b", "f/", true)).await.unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[tokio::test]
    async fn repeated_page_tails_duplicate_entries() {
        let store = MemoryStore::new().with_bucket("b");
        for i in 0..4 {
            store.insert_at("b", &format!("k{i}"), b"", at(i));
        }
        store.set_paging(2, true);
        let keys: Vec<String> = collect_listing(store.list_objects("b", "", true))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["k0", "k1", "k1", "k2", "k3"]);
    }

    #[tokio::test]
    async fn failed_listing_ends_with_error() {
        let store = MemoryStore::new().with_bucket("b");
        store.insert_at("b", "a/.keep", b"", at(1));
        store.fail_listings(true);
        assert!(collect_listing(store.list_objects("b", "", true)).await.is_err());
    }

    #[tokio::test]
    async fn writes_advance_the_clock() {
        let store = MemoryStore::new().with_bucket("b");
        store.put_object("b", "one", Bytes::from_static(&[1]), "x").await.unwrap();
        store.put_object("b", "two", Bytes::from_static(&[2]), "x").await.unwrap();
        let one = store.stat_object("b", "one").await.unwrap();
        let two = store.stat_object("b", "two").await.unwrap();
        assert!(two.last_modified > one.last_modified);
        assert!(store.put_object("missing", "k", Bytes::new(), "x").await.is_err());
    }
}
