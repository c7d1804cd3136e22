use std::path::Path;

use crate::config::{clear_config, save_config, ConnectionConfig};
use crate::error::{Error, Result};
use crate::store::{BucketInfo, ObjectStore};

#[derive(Clone, Debug, Default)]
pub struct LoginInput {
    pub end_point: String,
    pub port: String,
    pub use_ssl: bool,
    pub access_key: String,
    pub secret_key: String,
    pub default_bucket: Option<String>,
}

impl LoginInput {
    /// Checks the form and turns it into a connection record. Nothing is
    /// contacted yet.
    pub fn validate(&self) -> Result<ConnectionConfig> {
        let end_point = self.end_point.trim();
        let port = self.port.trim();
        let access_key = self.access_key.trim();
        if end_point.is_empty()
            || port.is_empty()
            || access_key.is_empty()
            || self.secret_key.is_empty()
        {
            return Err(Error::Login("all fields are required".to_string()));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| Error::Login(format!("invalid port {port:?}")))?;

        Ok(ConnectionConfig {
            end_point: end_point.to_string(),
            port,
            use_ssl: self.use_ssl,
            access_key: access_key.to_string(),
            secret_key: self.secret_key.clone(),
            default_bucket: self
                .default_bucket
                .as_deref()
                .map(str::trim)
                .filter(|bucket| !bucket.is_empty())
                .map(str::to_string),
        })
    }
}

/// Probes the endpoint with a bucket listing and persists `config` only once
/// that succeeds. Returns the visible buckets.
pub async fn login(
    store: &dyn ObjectStore,
    config: &ConnectionConfig,
    config_path: &Path,
) -> Result<Vec<BucketInfo>> {
    let buckets = store.list_buckets().await.map_err(|err| {
        tracing::warn!(endpoint = %config.end_point, %err, "login probe failed");
        Error::Login(err.to_string())
    })?;
    save_config(config_path, config)?;
    tracing::info!(identity = %config.identity(), buckets = buckets.len(), "logged in");
    Ok(buckets)
}

pub fn logout(config_path: &Path) -> Result<()> {
    clear_config(config_path)?;
    tracing::info!(path = %config_path.display(), "logged out");
    Ok(())
}

/// Buckets for the selection screen, oldest first, then by name.
pub async fn bucket_list(store: &dyn ObjectStore) -> Result<Vec<BucketInfo>> {
    let mut buckets = store.list_buckets().await?;
    buckets.sort_by(|a, b| {
        a.creation_date
            .cmp(&b.creation_date)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(buckets)
}

pub fn render_buckets(buckets: &[BucketInfo]) -> String {
    if buckets.is_empty() {
        return "(no buckets)\n".to_string();
    }
    buckets
        .iter()
        .map(|bucket| match bucket.creation_date {
            Some(created) => format!("{}  {}\n", created.format("%Y-%m-%d %H:%M:%S"), bucket.name),
            None => format!("{:19}  {}\n", "-", bucket.name),
        })
        .collect()
}
