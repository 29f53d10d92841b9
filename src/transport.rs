//! HTTP transport: unary and streaming JSON-RPC exchanges.
//!
//! DESIGN
//! ======
//! Every call is its own HTTP POST; nothing is multiplexed, so there is no
//! id → pending-call table. Responses are consumed at the awaiting call site.
//! The correlation id counter starts at 0 and is bumped exactly once per
//! call, before anything can fail, so ids are never reused.
//!
//! Streaming calls read the body chunk by chunk and hand each decoded
//! `result` to the observer synchronously, in arrival order. A slow observer
//! delays reading the next chunk. The stream ends when the host closes the
//! body or the caller's cancel future resolves; dropping the response aborts
//! the connection.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures abort the call and are never retried. What happens to
//! a bad stream frame is the [`StreamDecodePolicy`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Waker};
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::frame::{RpcResponse, StreamDecoder, StreamEvent, decode_response, encode_request};
use crate::translate::Translator;
use crate::types::ClientError;

const JSON_MIME: &str = "application/json";

// =============================================================================
// STREAM DECODE POLICY
// =============================================================================

/// What a streaming call does with frames it cannot deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamDecodePolicy {
    /// Drop malformed frames, host error frames, and results of the wrong
    /// shape. Each drop is logged at `warn` and the subscription continues.
    #[default]
    Lenient,
    /// End the call with an error on the first frame that cannot be
    /// delivered.
    Strict,
}

impl fmt::Display for StreamDecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        })
    }
}

impl FromStr for StreamDecodePolicy {
    type Err = ClientError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ClientError::ConfigParse(format!(
                "unknown stream decode policy '{other}' (expected 'lenient' or 'strict')"
            ))),
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    url: Url,
    translator: Translator,
    policy: StreamDecodePolicy,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            url: config.url.clone(),
            translator: Translator::new(config.server_version),
            policy: config.stream_decode,
            next_id: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    #[must_use]
    pub fn policy(&self) -> StreamDecodePolicy {
        self.policy
    }

    /// Allocate the next correlation id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// One request, one full response body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the endpoint cannot be reached or
    /// the body cannot be read, and [`ClientError::Decode`] if the body is not
    /// a JSON-RPC object. A host-reported error is returned as data in
    /// [`RpcResponse::error`].
    pub async fn unary_call(&self, method: &str, params: &Value) -> Result<RpcResponse, ClientError> {
        let id = self.next_id();
        let body = encode_request(&self.translator, id, method, params)?;
        debug!(method, id, "rpc call");

        let response = self.post(body).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(method, id, status, bytes = text.len(), "rpc response");

        decode_response(&self.translator, &text)
    }

    /// Open a streaming call and feed each decoded `result` to `observer`
    /// until the host closes the stream or `cancel` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the endpoint cannot be reached or
    /// the connection fails mid-stream. Under [`StreamDecodePolicy::Strict`],
    /// also returns [`ClientError::StreamDecode`] for a malformed frame and
    /// [`ClientError::StreamRejected`] for a host error frame.
    pub async fn streaming_call<C, F>(
        &self,
        method: &str,
        params: &Value,
        cancel: C,
        mut observer: F,
    ) -> Result<(), ClientError>
    where
        C: Future<Output = ()>,
        F: FnMut(Value),
    {
        self.stream(method, params, cancel, |value| {
            observer(value);
            Ok(())
        })
        .await
    }

    /// Like [`HttpTransport::streaming_call`], decoding each `result` into
    /// `T` first. A result of the wrong shape is handled per the policy.
    ///
    /// # Errors
    ///
    /// As [`HttpTransport::streaming_call`]; under the strict policy a result
    /// that does not match `T` yields [`ClientError::StreamDecode`].
    pub async fn streaming_call_as<T, C, F>(
        &self,
        method: &str,
        params: &Value,
        cancel: C,
        mut observer: F,
    ) -> Result<(), ClientError>
    where
        T: DeserializeOwned,
        C: Future<Output = ()>,
        F: FnMut(T),
    {
        let policy = self.policy;
        self.stream(method, params, cancel, |value| match serde_json::from_value::<T>(value) {
            Ok(typed) => {
                observer(typed);
                Ok(())
            }
            Err(e) => match policy {
                StreamDecodePolicy::Lenient => {
                    warn!(method, error = %e, "dropping stream result with unexpected shape");
                    Ok(())
                }
                StreamDecodePolicy::Strict => Err(ClientError::StreamDecode(e.to_string())),
            },
        })
        .await
    }

    async fn stream<C, F>(&self, method: &str, params: &Value, cancel: C, mut deliver: F) -> Result<(), ClientError>
    where
        C: Future<Output = ()>,
        F: FnMut(Value) -> Result<(), ClientError>,
    {
        let id = self.next_id();
        let body = encode_request(&self.translator, id, method, params)?;
        debug!(method, id, "rpc stream open");

        let mut cancel = std::pin::pin!(cancel);
        let mut response = tokio::select! {
            () = &mut cancel => {
                info!(method, id, "rpc stream cancelled before response");
                return Ok(());
            }
            sent = self.post(body) => sent?,
        };

        let mut decoder = StreamDecoder::new(self.translator.clone());
        let mut delivered = 0_u64;
        loop {
            let chunk = tokio::select! {
                () = &mut cancel => {
                    info!(method, id, delivered, "rpc stream cancelled");
                    return Ok(());
                }
                chunk = response.chunk() => chunk.map_err(|e| ClientError::Transport(e.to_string()))?,
            };
            let Some(chunk) = chunk else {
                info!(method, id, delivered, "rpc stream closed by host");
                return Ok(());
            };

            for event in decoder.push(&chunk) {
                if cancelled(cancel.as_mut()) {
                    info!(method, id, delivered, "rpc stream cancelled");
                    return Ok(());
                }
                match event {
                    StreamEvent::Result(value) => {
                        debug!(method, id, "stream frame");
                        deliver(value)?;
                        delivered += 1;
                    }
                    StreamEvent::Ignored => debug!(method, id, "stream frame without result"),
                    StreamEvent::Error(error) => {
                        if self.policy == StreamDecodePolicy::Strict {
                            return Err(ClientError::StreamRejected(error));
                        }
                        warn!(method, id, code = error.code, message = %error.message, "dropping stream error frame");
                    }
                    StreamEvent::Malformed(reason) => {
                        if self.policy == StreamDecodePolicy::Strict {
                            return Err(ClientError::StreamDecode(reason));
                        }
                        warn!(method, id, %reason, "dropping malformed stream frame");
                    }
                }
            }
        }
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, ClientError> {
        self.http
            .post(self.url.clone())
            .header(CONTENT_TYPE, JSON_MIME)
            .header(ACCEPT, JSON_MIME)
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Non-blocking check between frames of one chunk, so an observer that
/// triggers cancellation sees no further frames.
fn cancelled<C: Future<Output = ()>>(cancel: Pin<&mut C>) -> bool {
    cancel.poll(&mut Context::from_waker(Waker::noop())).is_ready()
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
