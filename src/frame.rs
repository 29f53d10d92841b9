//! Frame codec: JSON-RPC 2.0 envelopes and stream framing.
//!
//! ARCHITECTURE
//! ============
//! Outgoing: `{jsonrpc, id, method, params}` is serialized, then translated
//! to the session's host spelling as text. Incoming unary bodies are
//! translated back to internal spelling and parsed as one response object.
//!
//! STREAMING
//! =========
//! Watch methods answer with one long body carrying a frame per host tick.
//! Chunk boundaries do not line up with frames, and frames may be preceded by
//! non-JSON noise (e.g. an SSE `data: ` prefix). [`StreamDecoder`] buffers
//! bytes, skips everything before the next `{`, and cuts out each balanced
//! top-level object (string-aware, so braces inside strings do not count).
//! A fragment waits for the next chunk; several frames in one chunk are all
//! emitted in order. Translation runs per complete frame.
//!
//! A balanced object that does not parse is dropped and reported as
//! [`StreamEvent::Malformed`]; what happens next is the transport's
//! [`StreamDecodePolicy`](crate::transport::StreamDecodePolicy).
//!
//! RESYNC
//! ======
//! An SSE event boundary (a blank line, or a line starting with `data:`)
//! outside a string always ends the current frame. An object still open at
//! that point was truncated by the host; it is reported as `Malformed` and
//! scanning restarts after it. A frame that grows past the size cap without
//! closing is dropped the same way, so pending bytes stay bounded.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::translate::Translator;
use crate::types::{ClientError, Response};

/// Protocol tag on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

// =============================================================================
// ERROR OBJECT
// =============================================================================

/// JSON-RPC error object as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const ENTITY_NOT_FOUND: i64 = -23401;
    pub const COMPONENT_ERROR: i64 = -23402;
    pub const COMPONENT_NOT_PRESENT: i64 = -23403;
    pub const SELF_REPARENT: i64 = -23404;

    pub(crate) fn empty_response() -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            message: "response carried neither result nor error".to_owned(),
            data: None,
        }
    }
}

impl crate::types::ErrorCode for RpcError {
    fn error_code(&self) -> &'static str {
        match self.code {
            Self::PARSE_ERROR => "E_RPC_PARSE",
            Self::INVALID_REQUEST => "E_RPC_INVALID_REQUEST",
            Self::METHOD_NOT_FOUND => "E_RPC_METHOD_NOT_FOUND",
            Self::INVALID_PARAMS => "E_RPC_INVALID_PARAMS",
            Self::INTERNAL_ERROR => "E_RPC_INTERNAL",
            Self::ENTITY_NOT_FOUND => "E_ENTITY_NOT_FOUND",
            Self::COMPONENT_ERROR => "E_COMPONENT_ERROR",
            Self::COMPONENT_NOT_PRESENT => "E_COMPONENT_NOT_PRESENT",
            Self::SELF_REPARENT => "E_SELF_REPARENT",
            _ => "E_RPC_OTHER",
        }
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// Outgoing request frame.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

/// Incoming response or notification frame.
///
/// Every field is optional on decode; an object with neither `result` nor
/// `error` is tolerated.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    /// `Some(Value::Null)` when the host sent `"result": null`.
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    /// Decode `result` into `T`, keeping `error` as data.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if `result` does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Response<T>, ClientError> {
        let result = self
            .result
            .map(serde_json::from_value::<T>)
            .transpose()
            .map_err(|e| ClientError::Decode(format!("unexpected result shape: {e}")))?;
        Ok(Response { id: self.id, result, error: self.error })
    }
}

// =============================================================================
// UNARY CODEC
// =============================================================================

/// Serialize a request and translate it to the host spelling.
///
/// # Errors
///
/// Returns [`ClientError::Encode`] if `params` cannot be serialized.
pub fn encode_request(
    translator: &Translator,
    id: u64,
    method: &str,
    params: &Value,
) -> Result<String, ClientError> {
    let frame = RpcRequest { jsonrpc: JSONRPC_VERSION, id, method, params };
    let text = serde_json::to_string(&frame).map_err(|e| ClientError::Encode(e.to_string()))?;
    Ok(translator.to_external(&text).into_owned())
}

/// Translate a full response body to internal spelling and parse it.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] if the body is not a JSON object.
pub fn decode_response(translator: &Translator, body: &str) -> Result<RpcResponse, ClientError> {
    let text = translator.to_internal(body);
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}

// =============================================================================
// STREAM CODEC
// =============================================================================

/// One decoded unit from a streaming body.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A frame carrying a non-null `result`.
    Result(Value),
    /// A frame carrying an `error`.
    Error(RpcError),
    /// A well-formed object with nothing to deliver.
    Ignored,
    /// Bytes that could not be parsed; they have been discarded.
    Malformed(String),
}

/// Largest frame the stream decoder holds back before giving up on it.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Incremental splitter for a continuous body of JSON-RPC frames.
#[derive(Debug)]
pub struct StreamDecoder {
    translator: Translator,
    buffer: Vec<u8>,
    max_frame: usize,
}

impl StreamDecoder {
    #[must_use]
    pub fn new(translator: Translator) -> Self {
        Self::with_max_frame(translator, MAX_FRAME_BYTES)
    }

    #[must_use]
    pub fn with_max_frame(translator: Translator, max_frame: usize) -> Self {
        Self { translator, buffer: Vec::new(), max_frame }
    }

    /// Feed one chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == b'{') else {
                self.buffer.clear();
                break;
            };
            self.buffer.drain(..start);

            match scan_object(&self.buffer) {
                Scan::Complete(end) => {
                    let frame: Vec<u8> = self.buffer.drain(..end).collect();
                    events.push(self.decode_frame(&frame));
                }
                Scan::Truncated(end) => {
                    self.buffer.drain(..end);
                    events.push(StreamEvent::Malformed(format!(
                        "frame truncated after {end} bytes at event boundary"
                    )));
                }
                Scan::Open if self.buffer.len() > self.max_frame => {
                    let dropped = self.buffer.len();
                    self.buffer.clear();
                    events.push(StreamEvent::Malformed(format!(
                        "frame exceeds {} bytes; dropped {dropped} bytes",
                        self.max_frame
                    )));
                    break;
                }
                Scan::Open => break,
            }
        }

        events
    }

    /// Bytes held back waiting for the rest of a frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode_frame(&self, bytes: &[u8]) -> StreamEvent {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return StreamEvent::Malformed("frame is not valid UTF-8".to_owned());
        };
        let translated = self.translator.to_internal(text);
        match serde_json::from_str::<RpcResponse>(&translated) {
            Ok(RpcResponse { result: Some(result), .. }) if !result.is_null() => StreamEvent::Result(result),
            Ok(RpcResponse { error: Some(error), .. }) => StreamEvent::Error(error),
            Ok(_) => StreamEvent::Ignored,
            Err(e) => StreamEvent::Malformed(e.to_string()),
        }
    }
}

/// Where the object at the start of the buffer ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Balanced object of this many bytes.
    Complete(usize),
    /// An event boundary cut the object off after this many bytes.
    Truncated(usize),
    /// Still waiting for the closing brace.
    Open,
}

/// Scan the object starting at `bytes[0]`, string-aware.
fn scan_object(bytes: &[u8]) -> Scan {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Scan::Complete(i + 1);
                }
            }
            b'\n' if is_event_boundary(&bytes[i + 1..]) => return Scan::Truncated(i),
            _ => {}
        }
    }
    Scan::Open
}

/// `rest` follows a newline outside any string.
fn is_event_boundary(rest: &[u8]) -> bool {
    rest.starts_with(b"\n") || rest.starts_with(b"\r\n") || rest.starts_with(b"data:")
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
