use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Persisted connection record. Absent or incomplete means logged out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub end_point: String,
    pub port: u16,
    #[serde(rename = "useSSL", default)]
    pub use_ssl: bool,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<String>,
}

/// Same shape as [`ConnectionConfig`] with every field optional, so that a
/// partially written or emptied file still parses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfig {
    end_point: Option<String>,
    port: Option<u16>,
    #[serde(rename = "useSSL")]
    use_ssl: Option<bool>,
    access_key: Option<String>,
    secret_key: Option<String>,
    default_bucket: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StoredConfig {
    fn into_config(self) -> Option<ConnectionConfig> {
        Some(ConnectionConfig {
            end_point: non_empty(self.end_point)?,
            port: self.port.filter(|port| *port != 0)?,
            use_ssl: self.use_ssl.unwrap_or(false),
            access_key: non_empty(self.access_key)?,
            secret_key: non_empty(self.secret_key)?,
            default_bucket: non_empty(self.default_bucket),
        })
    }
}

impl ConnectionConfig {
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    pub fn endpoint_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}", self.scheme(), self.end_point, self.port))
    }

    /// `{scheme}://{endPoint}:{port}/{bucket}/{encoded key}`
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}://{}:{}/{}/{}",
            self.scheme(),
            self.end_point,
            self.port,
            bucket,
            crate::keys::encode_key_path(key)
        )
    }

    /// `accessKey @ endPoint:port`, the header line of the browser.
    pub fn identity(&self) -> String {
        format!("{} @ {}:{}", self.access_key, self.end_point, self.port)
    }
}

/// Reads the record at `path`. Any problem reading it is treated as logged out.
pub fn load_config(path: &Path) -> Option<ConnectionConfig> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "no connection config");
            return None;
        }
    };
    match serde_json::from_str::<StoredConfig>(&raw) {
        Ok(stored) => stored.into_config(),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "unreadable connection config");
            None
        }
    }
}

pub fn save_config(path: &Path, config: &ConnectionConfig) -> Result<(), Error> {
    ensure_parent_dir(path)?;
    fs::write(path, serde_json::to_vec_pretty(config)?)?;
    Ok(())
}

pub fn clear_config(path: &Path) -> Result<(), Error> {
    ensure_parent_dir(path)?;
    fs::write(path, b"{}")?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
