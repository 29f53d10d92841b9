//! Client configuration parsed from environment variables.

use reqwest::Url;

use crate::transport::StreamDecodePolicy;
use crate::translate::ServerVersion;
use crate::types::ClientError;

/// Local endpoint opened by the host's HTTP remote plugin.
pub const DEFAULT_URL: &str = "http://127.0.0.1:15702";
pub const DEFAULT_SERVER_VERSION: ServerVersion = ServerVersion::V0_16;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: Url,
    pub server_version: ServerVersion,
    /// TCP connect timeout. Requests themselves have no deadline, since watch
    /// streams stay open indefinitely.
    pub connect_timeout_secs: u64,
    pub stream_decode: StreamDecodePolicy,
}

impl ClientConfig {
    /// Config for `url` and `server_version` with default tuning.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] if `url` is not a valid URL.
    pub fn new(url: &str, server_version: ServerVersion) -> Result<Self, ClientError> {
        Ok(Self {
            url: parse_url(url)?,
            server_version,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            stream_decode: StreamDecodePolicy::default(),
        })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `BRP_URL`: default `http://127.0.0.1:15702`
    /// - `BRP_SERVER_VERSION`: `ignore`, `0.15`, or `0.16` (default)
    /// - `BRP_CONNECT_TIMEOUT_SECS`: default 10
    /// - `BRP_STREAM_DECODE`: `lenient` (default) or `strict`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] for an invalid URL or an unknown
    /// version or policy spelling.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let url = parse_url(lookup("BRP_URL").as_deref().unwrap_or(DEFAULT_URL))?;
        let server_version = lookup("BRP_SERVER_VERSION")
            .map(|raw| raw.parse::<ServerVersion>())
            .transpose()?
            .unwrap_or(DEFAULT_SERVER_VERSION);
        let connect_timeout_secs = lookup("BRP_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let stream_decode = lookup("BRP_STREAM_DECODE")
            .map(|raw| raw.parse::<StreamDecodePolicy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self { url, server_version, connect_timeout_secs, stream_decode })
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw.trim()).map_err(|e| ClientError::ConfigParse(format!("invalid BRP_URL '{raw}': {e}")))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
