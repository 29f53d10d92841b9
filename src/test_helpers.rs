//! In-process mock host for transport and session tests.
//!
//! Two fixtures:
//! - [`ScriptedHost`] answers every POST with a fixed list of body chunks and
//!   records the raw request bodies it saw.
//! - [`WorldHost`] keeps a tiny entity/component store and speaks the method
//!   catalogue in the spelling of one host release.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use serde_json::{Map, Value, json};

use crate::config::ClientConfig;
use crate::frame::RpcError;
use crate::transport::StreamDecodePolicy;
use crate::translate::ServerVersion;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock host");
    let addr = listener.local_addr().expect("mock host addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mock host mutex should lock")
}

fn chunked_body(chunks: Vec<Vec<u8>>, hold_open: bool) -> Body {
    let stream = futures::stream::iter(chunks.into_iter().map(|c| Ok::<Bytes, Infallible>(Bytes::from(c))));
    if hold_open {
        Body::from_stream(stream.chain(futures::stream::pending()))
    } else {
        Body::from_stream(stream)
    }
}

/// Config pointing at a mock host.
pub fn config_for(addr: SocketAddr, version: ServerVersion, policy: StreamDecodePolicy) -> ClientConfig {
    let mut config = ClientConfig::new(&format!("http://{addr}/"), version).expect("valid mock url");
    config.stream_decode = policy;
    config
}

/// An address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    addr
}

/// Frame with SSE-style noise in front, as the host pushes on watch streams.
pub fn sse_frame(result: &Value) -> Vec<u8> {
    format!("data: {}\n\n", json!({ "jsonrpc": "2.0", "id": 0, "result": result })).into_bytes()
}

// =============================================================================
// SCRIPTED HOST
// =============================================================================

#[derive(Clone)]
struct Script {
    chunks: Vec<Vec<u8>>,
    hold_open: bool,
    seen: Arc<Mutex<Vec<String>>>,
}

pub struct ScriptedHost {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHost {
    /// Serve `chunks` as the body of every response. With `hold_open` the
    /// body never ends on its own.
    pub async fn spawn(chunks: Vec<Vec<u8>>, hold_open: bool) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let script = Script { chunks, hold_open, seen: Arc::clone(&seen) };
        let app = Router::new().route("/", post(scripted)).with_state(script);
        Self { addr: serve(app).await, seen }
    }

    /// Raw request bodies, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }

    /// Request bodies parsed as JSON.
    pub fn request_json(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|body| serde_json::from_str(body).expect("client sent json"))
            .collect()
    }
}

async fn scripted(State(script): State<Script>, body: String) -> Response {
    lock(&script.seen).push(body);
    ([("content-type", "application/json")], chunked_body(script.chunks.clone(), script.hold_open)).into_response()
}

// =============================================================================
// WORLD HOST
// =============================================================================

pub const POSITION: &str = "server::Position";
pub const SHAPE: &str = "server::Shape";
pub const FAVORITE: &str = "server::FavoriteEntity";
pub const DESCRIPTION: &str = "server::Description";
pub const LOVELY: &str = "server::LovelyOne";

struct World {
    name_key: &'static str,
    children_key: &'static str,
    entities: BTreeMap<u64, Map<String, Value>>,
    next_entity: u64,
    bodies: Vec<String>,
}

type Shared = Arc<Mutex<World>>;

pub struct WorldHost {
    pub addr: SocketAddr,
    world: Shared,
}

impl WorldHost {
    /// A host seeded with a favorite parent entity and two children, using
    /// the type spellings of `version`.
    pub async fn spawn(version: ServerVersion) -> Self {
        let (name_key, children_key) = match version {
            ServerVersion::V0_15 => ("bevy_core::name::Name", "bevy_hierarchy::components::children::Children"),
            _ => ("bevy_ecs::name::Name", "bevy_ecs::hierarchy::Children"),
        };

        let mut entities = BTreeMap::new();
        entities.insert(
            1,
            as_map(json!({
                name_key: "Parent Node",
                SHAPE: "Circle",
                FAVORITE: null,
                POSITION: { "x": 0.0, "y": 0.0, "z": 0.0 },
                children_key: [2, 3],
            })),
        );
        entities.insert(
            2,
            as_map(json!({
                name_key: "Child Node 1",
                SHAPE: "Pentagon",
                LOVELY: null,
                POSITION: { "x": 2.0, "y": 2.0, "z": 2.0 },
            })),
        );
        entities.insert(
            3,
            as_map(json!({
                name_key: "Child Node 2",
                SHAPE: "Square",
                DESCRIPTION: "This node has parent",
                POSITION: { "x": -2.0, "y": -2.0, "z": -2.0 },
            })),
        );

        let world = Arc::new(Mutex::new(World { name_key, children_key, entities, next_entity: 4, bodies: Vec::new() }));
        let app = Router::new().route("/", post(world_rpc)).with_state(Arc::clone(&world));
        Self { addr: serve(app).await, world }
    }

    /// The host-side spelling of the name component.
    pub fn name_key(&self) -> &'static str {
        lock(&self.world).name_key
    }

    /// Raw request bodies, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.world).bodies.clone()
    }

    /// Component keys on `entity`, in host spelling.
    pub fn component_keys(&self, entity: u64) -> Vec<String> {
        lock(&self.world)
            .entities
            .get(&entity)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entity_exists(&self, entity: u64) -> bool {
        lock(&self.world).entities.contains_key(&entity)
    }
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn registry(world: &World) -> Vec<String> {
    [world.name_key, world.children_key, POSITION, SHAPE, FAVORITE, DESCRIPTION, LOVELY]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn str_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn rpc_error(code: i64, message: String) -> RpcError {
    RpcError { code, message, data: None }
}

fn missing_component(name: &str, entity: u64) -> RpcError {
    rpc_error(RpcError::COMPONENT_NOT_PRESENT, format!("Component `{name}` not present in entity {entity}"))
}

fn unary(id: &Value, outcome: Result<Value, RpcError>) -> Response {
    let frame = match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    };
    ([("content-type", "application/json")], frame.to_string()).into_response()
}

async fn world_rpc(State(world): State<Shared>, body: String) -> Response {
    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default().to_owned();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let mut world = lock(&world);
    world.bodies.push(body);

    match method.as_str() {
        "bevy/get+watch" => {
            let frames = get_watch_frames(&world, &params);
            drop(world);
            ([("content-type", "application/json")], chunked_body(frames, true)).into_response()
        }
        "bevy/list+watch" => {
            let added = match params.get("entity").and_then(Value::as_u64) {
                Some(entity) => world.entities.get(&entity).map(|c| c.keys().cloned().collect()).unwrap_or_default(),
                None => registry(&world),
            };
            drop(world);
            let mut frames = vec![sse_frame(&json!({ "added": added, "removed": [] }))];
            frames.push(b"data: {not json}\n\n".to_vec());
            frames.push(sse_frame(&json!({ "added": [], "removed": [SHAPE] })));
            ([("content-type", "application/json")], chunked_body(frames, false)).into_response()
        }
        other => {
            let outcome = dispatch(&mut world, other, &params);
            unary(&id, outcome)
        }
    }
}

fn dispatch(world: &mut World, method: &str, params: &Value) -> Result<Value, RpcError> {
    let entity = params.get("entity").and_then(Value::as_u64);
    match method {
        "bevy/get" => get(world, params),
        "bevy/query" => Ok(query(world, params)),
        "bevy/spawn" => {
            let id = world.next_entity;
            world.next_entity += 1;
            let components = params.get("components").cloned().map(as_map).unwrap_or_default();
            world.entities.insert(id, components);
            Ok(json!({ "entity": id }))
        }
        "bevy/destroy" => {
            let entity = entity.unwrap_or_default();
            world
                .entities
                .remove(&entity)
                .map(|_| Value::Null)
                .ok_or_else(|| rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found")))
        }
        "bevy/insert" => {
            let entity = entity.unwrap_or_default();
            let components = params.get("components").cloned().map(as_map).unwrap_or_default();
            let target = world
                .entities
                .get_mut(&entity)
                .ok_or_else(|| rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found")))?;
            target.extend(components);
            Ok(Value::Null)
        }
        "bevy/remove" => {
            let entity = entity.unwrap_or_default();
            let names = str_list(params, "components");
            let target = world
                .entities
                .get_mut(&entity)
                .ok_or_else(|| rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found")))?;
            for name in names {
                target.remove(&name);
            }
            Ok(Value::Null)
        }
        "bevy/reparent" => reparent(world, params),
        "bevy/list" => match entity {
            None => Ok(json!(registry(world))),
            Some(entity) => world
                .entities
                .get(&entity)
                .map(|c| json!(c.keys().collect::<Vec<_>>()))
                .ok_or_else(|| rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found"))),
        },
        other => Err(rpc_error(RpcError::METHOD_NOT_FOUND, format!("Method `{other}` not found"))),
    }
}

fn get(world: &World, params: &Value) -> Result<Value, RpcError> {
    let entity = params.get("entity").and_then(Value::as_u64).unwrap_or_default();
    let strict = params.get("strict").and_then(Value::as_bool).unwrap_or(false);
    let stored = world
        .entities
        .get(&entity)
        .ok_or_else(|| rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found")))?;

    let mut components = Map::new();
    let mut errors = Map::new();
    for name in str_list(params, "components") {
        match stored.get(&name) {
            Some(value) => {
                components.insert(name, value.clone());
            }
            None if strict => return Err(missing_component(&name, entity)),
            None => {
                let error = serde_json::to_value(missing_component(&name, entity)).unwrap_or_default();
                errors.insert(name, error);
            }
        }
    }

    if strict {
        Ok(Value::Object(components))
    } else {
        Ok(json!({ "components": components, "errors": errors }))
    }
}

fn query(world: &World, params: &Value) -> Value {
    let data = params.get("data").cloned().unwrap_or_default();
    let filter = params.get("filter").cloned().unwrap_or_default();
    let required = str_list(&data, "components");
    let optional = str_list(&data, "option");
    let has = str_list(&data, "has");
    let with = str_list(&filter, "with");
    let without = str_list(&filter, "without");

    let rows: Vec<Value> = world
        .entities
        .iter()
        .filter(|(_, c)| required.iter().chain(&with).all(|n| c.contains_key(n)))
        .filter(|(_, c)| without.iter().all(|n| !c.contains_key(n)))
        .map(|(entity, c)| {
            let components: Map<String, Value> = required
                .iter()
                .chain(&optional)
                .filter_map(|n| c.get(n).map(|v| (n.clone(), v.clone())))
                .collect();
            let mut row = json!({ "entity": entity, "components": components });
            if !has.is_empty() {
                let flags: Map<String, Value> = has.iter().map(|n| (n.clone(), json!(c.contains_key(n)))).collect();
                row["has"] = Value::Object(flags);
            }
            row
        })
        .collect();
    Value::Array(rows)
}

fn reparent(world: &mut World, params: &Value) -> Result<Value, RpcError> {
    let children: Vec<u64> = params
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    let parent = params.get("parent").and_then(Value::as_u64);
    let children_key = world.children_key;

    if let Some(parent) = parent {
        if children.contains(&parent) {
            return Err(rpc_error(RpcError::SELF_REPARENT, format!("Cannot make entity {parent} its own parent")));
        }
        if !world.entities.contains_key(&parent) {
            return Err(rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {parent} not found")));
        }
    }

    for components in world.entities.values_mut() {
        if let Some(Value::Array(list)) = components.get_mut(children_key) {
            list.retain(|c| c.as_u64().is_none_or(|c| !children.contains(&c)));
        }
    }
    if let Some(parent) = parent {
        let list = world
            .entities
            .get_mut(&parent)
            .map(|c| c.entry(children_key).or_insert_with(|| json!([])));
        if let Some(Value::Array(list)) = list {
            list.extend(children.iter().map(|c| json!(c)));
        }
    }
    Ok(Value::Null)
}

fn get_watch_frames(world: &World, params: &Value) -> Vec<Vec<u8>> {
    let entity = params.get("entity").and_then(Value::as_u64).unwrap_or_default();
    let strict = params.get("strict").and_then(Value::as_bool).unwrap_or(false);
    let Some(stored) = world.entities.get(&entity) else {
        let error = rpc_error(RpcError::ENTITY_NOT_FOUND, format!("Entity {entity} not found"));
        return vec![format!("data: {}\n\n", json!({ "jsonrpc": "2.0", "id": 0, "error": error })).into_bytes()];
    };

    let mut components = Map::new();
    let mut errors = Map::new();
    for name in str_list(params, "components") {
        match stored.get(&name) {
            Some(value) => {
                components.insert(name, value.clone());
            }
            None if strict => {
                let error = missing_component(&name, entity);
                return vec![format!("data: {}\n\n", json!({ "jsonrpc": "2.0", "id": 0, "error": error })).into_bytes()];
            }
            None => {
                let error = serde_json::to_value(missing_component(&name, entity)).unwrap_or_default();
                errors.insert(name, error);
            }
        }
    }

    let mut first = json!({ "components": components, "removed": [] });
    if !strict {
        first["errors"] = Value::Object(errors);
    }
    let second = sse_frame(&json!({ "components": {}, "removed": [SHAPE] }));
    let (head, tail) = second.split_at(second.len() / 2);
    vec![sse_frame(&first), b": keep-alive\n\n".to_vec(), head.to_vec(), tail.to_vec()]
}
