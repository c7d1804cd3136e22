use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client as S3Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};

use crate::config::ConnectionConfig;
use crate::store::{BucketInfo, ObjectEntry, ObjectStat, ObjectStore, ObjectStream, StoreError};

const DEFAULT_REGION: &str = "us-east-1";
const LIST_PAGE_SIZE: i32 = 1000;
const DELETE_BATCH_MAX: usize = 1000;

/// [`ObjectStore`] backed by an S3-compatible endpoint (MinIO and friends).
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn new(config: &ConnectionConfig) -> Result<Self, StoreError> {
        Ok(Self {
            client: to_s3_client(config)?,
        })
    }
}

fn to_s3_client(config: &ConnectionConfig) -> Result<S3Client, StoreError> {
    if config.access_key.trim().is_empty() || config.secret_key.trim().is_empty() {
        return Err(StoreError::Client("credentials are missing".to_string()));
    }
    let endpoint = config
        .endpoint_url()
        .map_err(|err| StoreError::Client(err.to_string()))?;

    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "thumbshelf",
    );

    let s3_config = aws_sdk_s3::config::Builder::new()
        .behavior_version_latest()
        .region(Region::new(DEFAULT_REGION))
        .credentials_provider(credentials)
        .endpoint_url(endpoint.as_str().trim_end_matches('/'))
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}

fn s3_datetime_to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    dt.to_millis()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

fn sdk_message<E>(err: E) -> String
where
    E: std::error::Error,
{
    DisplayErrorContext(err).to_string()
}

struct ListCursor {
    client: S3Client,
    bucket: String,
    prefix: String,
    recursive: bool,
    continuation_token: Option<String>,
    exhausted: bool,
}

impl ListCursor {
    async fn next_page(&mut self) -> Result<Vec<ObjectEntry>, StoreError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(self.bucket.clone())
            .max_keys(LIST_PAGE_SIZE)
            .prefix(self.prefix.clone());

        if !self.recursive {
            request = request.delimiter("/");
        }
        if let Some(token) = self.continuation_token.take() {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|err| StoreError::List {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            message: sdk_message(err),
        })?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|item| {
                let key = item.key()?;
                let last_modified = item
                    .last_modified()
                    .map(s3_datetime_to_utc)
                    .unwrap_or_else(Utc::now);
                Some(ObjectEntry::new(key, last_modified))
            })
            .collect();

        if output.is_truncated().unwrap_or(false) {
            self.continuation_token = output.next_continuation_token().map(str::to_string);
            self.exhausted = self.continuation_token.is_none();
        } else {
            self.exhausted = true;
        }

        Ok(entries)
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    fn list_objects(&self, bucket: &str, prefix: &str, recursive: bool) -> ObjectStream {
        let cursor = ListCursor {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            recursive,
            continuation_token: None,
            exhausted: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.exhausted {
                return Ok::<_, StoreError>(None);
            }
            let page = cursor.next_page().await?;
            tracing::debug!(
                bucket = %cursor.bucket,
                prefix = %cursor.prefix,
                keys = page.len(),
                "listed page"
            );
            Ok(Some((page, cursor)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket.to_string())
            .key(key.to_string())
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StoreError::Put {
                key: key.to_string(),
                message: sdk_message(err),
            })?;
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket.to_string())
            .key(key.to_string())
            .send()
            .await
            .map_err(|err| StoreError::Stat {
                key: key.to_string(),
                message: sdk_message(err),
            })?;

        Ok(ObjectStat {
            size: output.content_length().unwrap_or(0).max(0),
            last_modified: output
                .last_modified()
                .map(s3_datetime_to_utc)
                .unwrap_or_else(Utc::now),
            content_type: output.content_type().map(str::to_string),
        })
    }

    async fn remove_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        if keys.len() == 1 {
            self.client
                .delete_object()
                .bucket(bucket.to_string())
                .key(keys[0].clone())
                .send()
                .await
                .map_err(|err| StoreError::Remove(sdk_message(err)))?;
            return Ok(());
        }

        for chunk in keys.chunks(DELETE_BATCH_MAX) {
            let mut objects = Vec::with_capacity(chunk.len());
            for key in chunk {
                let object = ObjectIdentifier::builder()
                    .key(key.clone())
                    .build()
                    .map_err(|err| StoreError::Remove(format!("invalid object identifier: {err}")))?;
                objects.push(object);
            }

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|err| StoreError::Remove(format!("invalid delete payload: {err}")))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket.to_string())
                .delete(delete)
                .send()
                .await
                .map_err(|err| StoreError::Remove(sdk_message(err)))?;

            if !output.errors().is_empty() {
                tracing::warn!(
                    bucket,
                    failed = output.errors().len(),
                    requested = chunk.len(),
                    "batch delete partially failed"
                );
            }
        }

        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StoreError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| StoreError::Buckets(sdk_message(err)))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                Some(BucketInfo {
                    name: bucket.name()?.to_string(),
                    creation_date: bucket.creation_date().map(s3_datetime_to_utc),
                })
            })
            .collect())
    }
}
