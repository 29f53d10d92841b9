//! Value tree: path-addressable access into schema-less payloads.
//!
//! DESIGN
//! ======
//! Component values and error data are host-defined, so the client never
//! decodes them into static types. Every payload stays a `serde_json::Value`
//! and callers address nodes with a slice of [`PathSegment`]s.
//!
//! - A string segment only resolves against an object, an index segment only
//!   against an array. No coercion in either direction.
//! - Traversal stops at the first segment that does not resolve; absence is
//!   `None`, which is distinct from a present `Value::Null`.
//! - Paths are borrowed (`&[PathSegment]`), so traversal can never mutate a
//!   caller's path.
//! - `set_path` writes in place through `&mut Value`. [`SharedValue`] wraps a
//!   tree in shared ownership so every clone observes the others' writes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

// =============================================================================
// PATH
// =============================================================================

/// One step into a value tree: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Build a `Vec<PathSegment>` from string keys and integer indices.
///
/// ```
/// use brp_client::path;
/// let p = path!["components", "server::Position", "x"];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        ::std::vec::Vec::<$crate::value::PathSegment>::new()
    };
    ($($seg:expr),+ $(,)?) => {
        vec![$($crate::value::PathSegment::from($seg)),+]
    };
}

// =============================================================================
// PATH ACCESS
// =============================================================================

/// Path-based reads and writes over a value tree.
pub trait ValuePath {
    /// `true` when every segment resolves. The empty path always resolves.
    fn has_path(&self, path: &[PathSegment]) -> bool;

    /// The node at `path`, or `None` when any segment fails to resolve.
    fn get_path(&self, path: &[PathSegment]) -> Option<&Value>;

    /// Replace the node at `path`.
    ///
    /// The empty path replaces the whole tree. Otherwise the parent container
    /// must already exist: an object parent gets the key assigned (inserted if
    /// absent), an array parent gets an in-bounds index overwritten. Anything
    /// else is a silent no-op; no intermediate structure is created.
    fn set_path(&mut self, path: &[PathSegment], value: Value);

    /// Valid next segments at `path`: object keys in order, or `0..len` for
    /// arrays. Empty for scalars, null, and absent nodes.
    fn keys_at(&self, path: &[PathSegment]) -> Vec<PathSegment>;

    /// Immediate children at `path`, index-aligned with [`ValuePath::keys_at`].
    fn values_at(&self, path: &[PathSegment]) -> Vec<&Value>;
}

impl ValuePath for Value {
    fn has_path(&self, path: &[PathSegment]) -> bool {
        self.get_path(path).is_some()
    }

    fn get_path(&self, path: &[PathSegment]) -> Option<&Value> {
        let mut node = self;
        for segment in path {
            node = child(node, segment)?;
        }
        Some(node)
    }

    fn set_path(&mut self, path: &[PathSegment], value: Value) {
        let Some((last, parent_path)) = path.split_last() else {
            *self = value;
            return;
        };

        let mut parent = self;
        for segment in parent_path {
            let Some(next) = child_mut(parent, segment) else {
                return;
            };
            parent = next;
        }

        match (parent, last) {
            (Value::Object(map), PathSegment::Key(key)) => {
                map.insert(key.clone(), value);
            }
            (Value::Array(items), PathSegment::Index(index)) => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = value;
                }
            }
            _ => {}
        }
    }

    fn keys_at(&self, path: &[PathSegment]) -> Vec<PathSegment> {
        match self.get_path(path) {
            Some(Value::Object(map)) => map.keys().cloned().map(PathSegment::Key).collect(),
            Some(Value::Array(items)) => (0..items.len()).map(PathSegment::Index).collect(),
            _ => Vec::new(),
        }
    }

    fn values_at(&self, path: &[PathSegment]) -> Vec<&Value> {
        match self.get_path(path) {
            Some(Value::Object(map)) => map.values().collect(),
            Some(Value::Array(items)) => items.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn child<'a>(node: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

// =============================================================================
// SHARED TREE
// =============================================================================

/// A value tree with shared ownership.
///
/// Clones point at the same tree: a `set` through one handle is visible
/// through every other. Reads return owned copies of the addressed node.
#[derive(Debug, Clone, Default)]
pub struct SharedValue {
    inner: Arc<Mutex<Value>>,
}

impl SharedValue {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { inner: Arc::new(Mutex::new(value)) }
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        // A panic mid-write cannot leave a `Value` structurally invalid.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn has(&self, path: &[PathSegment]) -> bool {
        self.lock().has_path(path)
    }

    #[must_use]
    pub fn get(&self, path: &[PathSegment]) -> Option<Value> {
        self.lock().get_path(path).cloned()
    }

    pub fn set(&self, path: &[PathSegment], value: Value) {
        self.lock().set_path(path, value);
    }

    #[must_use]
    pub fn keys(&self, path: &[PathSegment]) -> Vec<PathSegment> {
        self.lock().keys_at(path)
    }

    #[must_use]
    pub fn values(&self, path: &[PathSegment]) -> Vec<Value> {
        self.lock().values_at(path).into_iter().cloned().collect()
    }

    /// Copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.lock().clone()
    }

    /// `true` when both handles share one tree.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Value> for SharedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod tests;
