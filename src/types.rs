//! Domain types: identifiers, typed result shapes, and errors.
//!
//! Component values stay `serde_json::Value` everywhere; only the envelope
//! of each result (which keys exist, which are lists of type paths) is typed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::RpcError;

/// Opaque host-side entity identifier.
pub type EntityId = u64;

/// Fully-qualified type name, e.g. `bevy_ecs::name::Name`.
pub type TypePath = String;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by client operations.
///
/// Host-reported failures are not here: they arrive as
/// [`Response::error`] and must be checked by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The endpoint could not be reached or the body could not be read.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The request could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(String),

    /// The response was not a JSON-RPC object of the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// A stream frame was malformed under the strict stream policy.
    #[error("stream frame decode failed: {0}")]
    StreamDecode(String),

    /// The host pushed an error frame on a stream under the strict policy.
    #[error("stream rejected by host: {0}")]
    StreamRejected(RpcError),
}

/// Grepable error codes, in the style of error frames.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Encode(_) => "E_ENCODE",
            Self::Decode(_) => "E_DECODE",
            Self::StreamDecode(_) => "E_STREAM_DECODE",
            Self::StreamRejected(_) => "E_STREAM_REJECTED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A decoded unary response.
///
/// At most one of `result` / `error` is set by a well-behaved host. A
/// missing `result` on success is normal for methods whose result is `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub id: Option<u64>,
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

impl<T> Response<T> {
    /// `true` when the host did not report an error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Turn the data-style protocol error into control flow.
    ///
    /// # Errors
    ///
    /// Returns the host's [`RpcError`], or an internal-error `RpcError` when
    /// the response carries neither a result nor an error.
    pub fn into_result(self) -> Result<T, RpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::empty_response()),
        }
    }
}

impl Response<()> {
    /// Success check for methods whose result is `null`.
    ///
    /// # Errors
    ///
    /// Returns the host's [`RpcError`] if one was reported.
    pub fn into_unit(self) -> Result<(), RpcError> {
        self.error.map_or(Ok(()), Err)
    }
}

// =============================================================================
// RESULT SHAPES
// =============================================================================

/// Result of a non-strict `bevy/get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    #[serde(default)]
    pub components: BTreeMap<TypePath, Value>,
    #[serde(default)]
    pub errors: BTreeMap<TypePath, RpcError>,
}

/// Result of a strict `bevy/get`: every requested component.
pub type GetStrictResult = BTreeMap<TypePath, Value>;

/// One row of a `bevy/query` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRow {
    pub entity: EntityId,
    #[serde(default)]
    pub components: BTreeMap<TypePath, Value>,
    /// Present only when the query asked for `has`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has: Option<BTreeMap<TypePath, bool>>,
}

/// Result of `bevy/spawn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnResult {
    pub entity: EntityId,
}

/// One push from a non-strict `bevy/get+watch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetWatchResult {
    #[serde(default)]
    pub components: BTreeMap<TypePath, Value>,
    #[serde(default)]
    pub removed: Vec<TypePath>,
    #[serde(default)]
    pub errors: BTreeMap<TypePath, RpcError>,
}

/// One push from a strict `bevy/get+watch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetWatchStrictResult {
    #[serde(default)]
    pub components: BTreeMap<TypePath, Value>,
    #[serde(default)]
    pub removed: Vec<TypePath>,
}

/// One push from `bevy/list+watch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListWatchResult {
    #[serde(default)]
    pub added: Vec<TypePath>,
    #[serde(default)]
    pub removed: Vec<TypePath>,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Last path segment of a type path, without generic parameters.
///
/// `bevy_ecs::something::Crypto<hell::Satan>` → `Crypto`.
#[must_use]
pub fn short_type_name(type_path: &str) -> &str {
    let base = type_path.split('<').next().unwrap_or(type_path);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
