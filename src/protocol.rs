//! Protocol session: the fixed BRP method catalogue.
//!
//! DESIGN
//! ======
//! Each operation assembles its params and hands them to the transport; the
//! result is decoded into the typed shape for that method. Host-reported
//! failures stay data on [`Response::error`]. Only transport, encode and
//! decode failures are `Err`.
//!
//! Watch operations never return a value: they call the observer once per
//! host push and resolve when the host closes the stream or `cancel`
//! resolves.

use std::collections::BTreeMap;
use std::future::Future;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::config::{self, ClientConfig};
use crate::translate::ServerVersion;
use crate::transport::HttpTransport;
use crate::types::{
    ClientError, EntityId, GetResult, GetStrictResult, GetWatchResult, GetWatchStrictResult, ListWatchResult, QueryRow,
    Response, SpawnResult, TypePath,
};

/// Method names, exactly as the host expects them.
pub mod methods {
    pub const GET: &str = "bevy/get";
    pub const QUERY: &str = "bevy/query";
    pub const SPAWN: &str = "bevy/spawn";
    pub const DESTROY: &str = "bevy/destroy";
    pub const REMOVE: &str = "bevy/remove";
    pub const INSERT: &str = "bevy/insert";
    pub const REPARENT: &str = "bevy/reparent";
    pub const LIST: &str = "bevy/list";
    pub const GET_WATCH: &str = "bevy/get+watch";
    pub const LIST_WATCH: &str = "bevy/list+watch";
}

// =============================================================================
// QUERY PARAMS
// =============================================================================

/// Params for `bevy/query`. Lists that were never set are left off the wire.
///
/// ```
/// use brp_client::protocol::QueryParams;
///
/// let params = QueryParams::new()
///     .components(["server::Position"])
///     .without(["server::Hidden"]);
/// assert_eq!(
///     serde_json::to_value(&params).unwrap(),
///     serde_json::json!({
///         "data": { "components": ["server::Position"] },
///         "filter": { "without": ["server::Hidden"] }
///     })
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    pub data: QueryData,
    pub filter: QueryFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryData {
    /// Required components, returned in each row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<TypePath>>,
    /// Optional components, returned when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<Vec<TypePath>>,
    /// Components reported as presence flags in each row's `has` map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has: Option<Vec<TypePath>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with: Option<Vec<TypePath>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub without: Option<Vec<TypePath>>,
}

fn type_list<I, S>(types: I) -> Option<Vec<TypePath>>
where
    I: IntoIterator<Item = S>,
    S: Into<TypePath>,
{
    Some(types.into_iter().map(Into::into).collect())
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn components<I: IntoIterator<Item = S>, S: Into<TypePath>>(mut self, types: I) -> Self {
        self.data.components = type_list(types);
        self
    }

    #[must_use]
    pub fn option<I: IntoIterator<Item = S>, S: Into<TypePath>>(mut self, types: I) -> Self {
        self.data.option = type_list(types);
        self
    }

    #[must_use]
    pub fn has<I: IntoIterator<Item = S>, S: Into<TypePath>>(mut self, types: I) -> Self {
        self.data.has = type_list(types);
        self
    }

    #[must_use]
    pub fn with<I: IntoIterator<Item = S>, S: Into<TypePath>>(mut self, types: I) -> Self {
        self.filter.with = type_list(types);
        self
    }

    #[must_use]
    pub fn without<I: IntoIterator<Item = S>, S: Into<TypePath>>(mut self, types: I) -> Self {
        self.filter.without = type_list(types);
        self
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A connection-less client for one host endpoint.
///
/// Safe to share between concurrent calls; the only mutable state is the
/// transport's id counter.
pub struct Session {
    transport: HttpTransport,
    server_version: ServerVersion,
}

impl Session {
    pub const DEFAULT_URL: &'static str = config::DEFAULT_URL;

    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config)?;
        info!(url = %config.url, server_version = %config.server_version, policy = %config.stream_decode, "brp session ready");
        Ok(Self { transport, server_version: config.server_version })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        self.transport.url()
    }

    #[must_use]
    pub fn server_version(&self) -> ServerVersion {
        self.server_version
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<Response<T>, ClientError> {
        self.transport.unary_call(method, params).await?.into_typed()
    }

    // -------------------------------------------------------------------------
    // Unary operations
    // -------------------------------------------------------------------------

    /// Fetch components of `entity`. Types the entity lacks, or the host
    /// cannot reflect, are reported per type in [`GetResult::errors`].
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn get(&self, entity: EntityId, components: &[&str]) -> Result<Response<GetResult>, ClientError> {
        let params = json!({ "entity": entity, "components": components, "strict": false });
        self.call(methods::GET, &params).await
    }

    /// Fetch components of `entity`; any missing type fails the whole call
    /// with a host error.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn get_strict(
        &self,
        entity: EntityId,
        components: &[&str],
    ) -> Result<Response<GetStrictResult>, ClientError> {
        let params = json!({ "entity": entity, "components": components, "strict": true });
        self.call(methods::GET, &params).await
    }

    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn query(&self, query: &QueryParams) -> Result<Response<Vec<QueryRow>>, ClientError> {
        let params = serde_json::to_value(query).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.call(methods::QUERY, &params).await
    }

    /// Spawn a new entity with `components`; the host picks the id.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn spawn(&self, components: &BTreeMap<TypePath, Value>) -> Result<Response<SpawnResult>, ClientError> {
        let params = json!({ "components": components });
        self.call(methods::SPAWN, &params).await
    }

    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn destroy(&self, entity: EntityId) -> Result<Response<()>, ClientError> {
        self.call(methods::DESTROY, &json!({ "entity": entity })).await
    }

    /// Remove `components` from `entity`. Absent types are not an error.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn remove(&self, entity: EntityId, components: &[&str]) -> Result<Response<()>, ClientError> {
        let params = json!({ "entity": entity, "components": components });
        self.call(methods::REMOVE, &params).await
    }

    /// Insert or overwrite `components` on `entity`.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn insert(
        &self,
        entity: EntityId,
        components: &BTreeMap<TypePath, Value>,
    ) -> Result<Response<()>, ClientError> {
        let params = json!({ "entity": entity, "components": components });
        self.call(methods::INSERT, &params).await
    }

    /// Move `entities` under `parent`, or detach them when `parent` is `None`.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn reparent(&self, entities: &[EntityId], parent: Option<EntityId>) -> Result<Response<()>, ClientError> {
        let mut params = Map::new();
        params.insert("entities".to_owned(), json!(entities));
        if let Some(parent) = parent {
            params.insert("parent".to_owned(), json!(parent));
        }
        self.call(methods::REPARENT, &Value::Object(params)).await
    }

    /// Types on `entity`, or every registered type when `entity` is `None`.
    ///
    /// # Errors
    ///
    /// Transport, encode, or decode failure.
    pub async fn list(&self, entity: Option<EntityId>) -> Result<Response<Vec<TypePath>>, ClientError> {
        self.call(methods::LIST, &entity_params(entity)).await
    }

    // -------------------------------------------------------------------------
    // Watch operations
    // -------------------------------------------------------------------------

    /// Subscribe to changes of `components` on `entity`. Per-type failures
    /// arrive in each push's [`GetWatchResult::errors`].
    ///
    /// # Errors
    ///
    /// As [`HttpTransport::streaming_call_as`].
    pub async fn get_watch<C, F>(
        &self,
        entity: EntityId,
        components: &[&str],
        cancel: C,
        observer: F,
    ) -> Result<(), ClientError>
    where
        C: Future<Output = ()>,
        F: FnMut(GetWatchResult),
    {
        let params = json!({ "entity": entity, "components": components, "strict": false });
        self.transport.streaming_call_as(methods::GET_WATCH, &params, cancel, observer).await
    }

    /// Strict [`Session::get_watch`]: a missing type makes the host answer
    /// with an error frame instead of a push.
    ///
    /// # Errors
    ///
    /// As [`HttpTransport::streaming_call_as`]; under the strict stream policy
    /// the host's error frame is [`ClientError::StreamRejected`].
    pub async fn get_watch_strict<C, F>(
        &self,
        entity: EntityId,
        components: &[&str],
        cancel: C,
        observer: F,
    ) -> Result<(), ClientError>
    where
        C: Future<Output = ()>,
        F: FnMut(GetWatchStrictResult),
    {
        let params = json!({ "entity": entity, "components": components, "strict": true });
        self.transport.streaming_call_as(methods::GET_WATCH, &params, cancel, observer).await
    }

    /// Subscribe to component-set membership changes on `entity`, or on the
    /// type registry when `entity` is `None`.
    ///
    /// # Errors
    ///
    /// As [`HttpTransport::streaming_call_as`].
    pub async fn list_watch<C, F>(&self, entity: Option<EntityId>, cancel: C, observer: F) -> Result<(), ClientError>
    where
        C: Future<Output = ()>,
        F: FnMut(ListWatchResult),
    {
        self.transport
            .streaming_call_as(methods::LIST_WATCH, &entity_params(entity), cancel, observer)
            .await
    }
}

fn entity_params(entity: Option<EntityId>) -> Value {
    entity.map_or(Value::Null, |entity| json!({ "entity": entity }))
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
