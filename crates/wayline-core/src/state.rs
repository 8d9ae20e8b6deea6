//! # Route State — Shared State Objects and Layered Lookup
//!
//! Every segment of a route target carries one [`StateObject`]: a JSON
//! object behind a shared handle. Identity matters. The same object may be
//! referenced by several history targets (a common prefix reuses the active
//! object), and snapshots preserve that sharing by interning objects by
//! identity rather than by value.
//!
//! [`MergedState`] is the read/write view over the state objects of a whole
//! path: lookups walk descendant-before-ancestor (most specific wins), and
//! writes are dispatched to the layer that owns the key.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};

use crate::error::{json_type_name, StateError};

/// A partial state delta applied on top of a target's merged state.
pub type StatePart = Map<String, Value>;

// ─── StateObject ─────────────────────────────────────────────────────

/// A shared, identity-bearing JSON object holding one segment's state.
///
/// Cloning the handle shares the object. Use [`StateObject::ptr_eq`] to
/// compare identity and `==` to compare contents.
#[derive(Clone)]
pub struct StateObject {
    inner: Rc<RefCell<Map<String, Value>>>,
}

impl StateObject {
    /// Wrap a map as a new state object with a fresh identity.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(fields)),
        }
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(path: &[String], value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(StateError::NotAnObject {
                path: path.to_vec(),
                found: json_type_name(&other),
            }),
        }
    }

    /// Read a field.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().get(key).cloned()
    }

    /// Whether the object has its own field `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }

    /// Write a field in place. Visible through every handle to this object.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.borrow_mut().insert(key.into(), value);
    }

    /// Copy of the fields.
    pub fn to_map(&self) -> Map<String, Value> {
        self.inner.borrow().clone()
    }

    /// The fields as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// A new object with the same fields and a fresh identity.
    pub fn detached_copy(&self) -> Self {
        Self::new(self.to_map())
    }

    /// Whether two handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address-based identity key. Only meaningful while the object is alive;
    /// pair it with a [`WeakStateObject`] when stored.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Non-owning handle to this object.
    pub fn downgrade(&self) -> WeakStateObject {
        WeakStateObject {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for StateObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.inner.borrow() == *other.inner.borrow()
    }
}

impl fmt::Debug for StateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateObject")
            .field(&*self.inner.borrow())
            .finish()
    }
}

/// Non-owning handle to a [`StateObject`].
#[derive(Clone, Debug)]
pub struct WeakStateObject {
    inner: Weak<RefCell<Map<String, Value>>>,
}

impl WeakStateObject {
    /// Upgrade to a strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<StateObject> {
        self.inner.upgrade().map(|inner| StateObject { inner })
    }

    /// Whether this handle refers to `object`.
    pub fn refers_to(&self, object: &StateObject) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Rc::as_ptr(&object.inner))
    }
}

// ─── MergedState ─────────────────────────────────────────────────────

/// Layered lookup over the state objects of a path.
///
/// Layers are ordered ancestor first. Reads return the value from the
/// deepest layer that has the key. Writes go to that same owning layer,
/// or to the leaf layer when no layer has the key yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedState {
    layers: Vec<StateObject>,
}

impl MergedState {
    /// Build a merged view over `layers` (ancestor first).
    pub fn new(layers: Vec<StateObject>) -> Self {
        Self { layers }
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// The layers, ancestor first.
    pub fn layers(&self) -> &[StateObject] {
        &self.layers
    }

    /// Index of the layer that owns `key`, if any.
    pub fn owner_of(&self, key: &str) -> Option<usize> {
        self.layers.iter().rposition(|layer| layer.contains(key))
    }

    /// Read `key`, most specific layer wins.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.owner_of(key).and_then(|i| self.layers[i].get(key))
    }

    /// Write `key` into its owning layer. Returns the layer index written,
    /// or `None` when there are no layers.
    pub fn set(&self, key: &str, value: Value) -> Option<usize> {
        let index = self
            .owner_of(key)
            .or_else(|| self.layers.len().checked_sub(1))?;
        self.layers[index].set(key, value);
        Some(index)
    }

    /// All visible fields flattened into one map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for layer in &self.layers {
            for (key, value) in layer.to_map() {
                merged.insert(key, value);
            }
        }
        merged
    }

    /// All visible fields as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// A merged view extended by one more (deeper) layer.
    pub fn with_layer(&self, layer: StateObject) -> Self {
        let mut layers = self.layers.clone();
        layers.push(layer);
        Self { layers }
    }
}

/// Apply `part` to `layers` copy-on-write.
///
/// Each key goes to its owning layer (or the leaf layer). Every affected
/// layer is replaced by a detached copy carrying the new values, so other
/// holders of the original objects see no change. Returns the new layer
/// list; untouched layers keep their identity.
pub fn apply_state_part(layers: &[StateObject], part: &StatePart) -> Vec<StateObject> {
    let merged = MergedState::new(layers.to_vec());
    let mut result = layers.to_vec();
    let mut copied = vec![false; layers.len()];
    let Some(leaf) = layers.len().checked_sub(1) else {
        return result;
    };
    for (key, value) in part {
        let index = merged.owner_of(key).unwrap_or(leaf);
        if !copied[index] {
            result[index] = result[index].detached_copy();
            copied[index] = true;
        }
        result[index].set(key.clone(), value.clone());
    }
    result
}
