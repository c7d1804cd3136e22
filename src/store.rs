use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("listing {bucket}/{prefix} failed: {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },
    #[error("upload of {key} failed: {message}")]
    Put { key: String, message: String },
    #[error("stat of {key} failed: {message}")]
    Stat { key: String, message: String },
    #[error("batch delete failed: {0}")]
    Remove(String),
    #[error("bucket listing failed: {0}")]
    Buckets(String),
    #[error("invalid client configuration: {0}")]
    Client(String),
}

/// Listing results arrive incrementally; the stream ends after the last key
/// or after the first error.
pub type ObjectStream = BoxStream<'static, Result<ObjectEntry, StoreError>>;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists keys under `prefix`. Non-recursive listings only yield keys that
    /// sit directly under the prefix.
    fn list_objects(&self, bucket: &str, prefix: &str, recursive: bool) -> ObjectStream;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError>;

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError>;

    /// Best-effort batch removal; per-key failures are not reported back.
    async fn remove_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError>;

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StoreError>;
}

pub async fn collect_listing(stream: ObjectStream) -> Result<Vec<ObjectEntry>, StoreError> {
    stream.try_collect().await
}

/// True when at least one key matching `keep` exists under the prefix.
/// Stops reading as soon as a match is seen.
pub async fn any_key(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    recursive: bool,
    keep: impl Fn(&ObjectEntry) -> bool,
) -> Result<bool, StoreError> {
    let mut stream = store.list_objects(bucket, prefix, recursive);
    while let Some(entry) = stream.try_next().await? {
        if keep(&entry) {
            return Ok(true);
        }
    }
    Ok(false)
}
