//! # Snapshot Codec
//!
//! Serializes the whole reachable history chain of the active target into
//! a compact JSON document and restores it.
//!
//! ## Wire format
//!
//! ```text
//! {
//!   "operation": "push",
//!   "entry": {
//!     "path": ["home", "hello"],
//!     "states": [0, {"value": "en"}],
//!     "previous": { "path": ["home"], "states": [0] }
//!   },
//!   "objects": [{"user": "a"}]
//! }
//! ```
//!
//! A number in `states` indexes `objects`. Two segments holding the same
//! state object share one index, so identity survives a round trip within
//! one decode. `{"value": ...}` marks a derived state, stored as the
//! derivation input and recomputed on decode. `{}` is a derived state
//! computed without an input, and `{"value": null}` one whose input was
//! an explicit `null`.
//!
//! ## Traversal order
//!
//! Each entry encodes its own states first, then its `previous` chain, then
//! its `next` chain. Objects are numbered in first-visit order, which makes
//! re-encoding a decoded snapshot byte-identical.
//!
//! Entries nest one level per history step. Encoding and decoding walk the
//! chain with an explicit stack, and parsing lifts the JSON recursion limit
//! and grows the stack on demand, so long histories are not capped by
//! nesting depth.

use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use wayline_core::{MergedState, RouterError, SnapshotError, StateError, StateObject};

use crate::derivation::DerivationTable;
use crate::schema::{derive_state, Schema, StateSchema};
use crate::target::{OperationKind, RouteTarget};

/// A serialized history chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Operation that installed the head.
    pub operation: OperationKind,
    /// The head entry with its neighbours.
    pub entry: SnapshotEntry,
    /// Shared state objects.
    pub objects: Vec<Value>,
}

/// One serialized history location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Segment names.
    pub path: Vec<String>,
    /// One state reference per segment.
    pub states: Vec<SnapshotState>,
    /// Earlier neighbour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<SnapshotEntry>>,
    /// Later neighbour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<SnapshotEntry>>,
}

/// A segment state reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotState {
    /// Index into `Snapshot::objects`.
    Index(usize),
    /// Derivation input of a derived state.
    Derived {
        /// The input, `None` when the state was derived without one.
        /// `Some(Value::Null)` is an explicit `null` input.
        #[serde(
            default,
            deserialize_with = "present_value",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Value>,
    },
}

/// A field that is present deserializes to `Some`, even when it is `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Snapshot {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string of any nesting depth.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut parser = serde_json::Deserializer::from_str(json);
        parser.disable_recursion_limit();
        let snapshot = Snapshot::deserialize(serde_stacker::Deserializer::new(&mut parser))?;
        parser.end()?;
        Ok(snapshot)
    }

    /// Number of entries in the chain, head included.
    pub fn entry_count(&self) -> usize {
        let left = std::iter::successors(self.entry.previous.as_deref(), |e| e.previous.as_deref());
        let right = std::iter::successors(self.entry.next.as_deref(), |e| e.next.as_deref());
        1 + left.count() + right.count()
    }
}

// ─── Chain walk ──────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Side {
    Previous,
    Next,
}

/// A chain flattened in traversal order. Every node after the head names
/// its parent by position (the head is 0) and the side it hangs from.
struct Flattened<N> {
    head: N,
    rest: Vec<(N, usize, Side)>,
}

/// Visit `head` and everything reachable from it in traversal order.
fn flatten<'a, S, N>(
    head: &'a S,
    neighbours: impl Fn(&'a S) -> (Option<&'a S>, Option<&'a S>),
    mut visit: impl FnMut(&'a S) -> Result<N, RouterError>,
) -> Result<Flattened<N>, RouterError> {
    let expand = |stack: &mut Vec<(&'a S, usize, Side)>, node: &'a S, position: usize| {
        let (previous, next) = neighbours(node);
        if let Some(next) = next {
            stack.push((next, position, Side::Next));
        }
        if let Some(previous) = previous {
            stack.push((previous, position, Side::Previous));
        }
    };

    let mut stack = Vec::new();
    let head_node = visit(head)?;
    expand(&mut stack, head, 0);
    let mut rest = Vec::new();
    while let Some((source, parent, side)) = stack.pop() {
        rest.push((visit(source)?, parent, side));
        expand(&mut stack, source, rest.len());
    }
    Ok(Flattened {
        head: head_node,
        rest,
    })
}

impl<N> Flattened<N> {
    /// Rebuild the chain bottom-up: children are linked before parents.
    fn assemble<T>(self, mut link: impl FnMut(N, Option<T>, Option<T>) -> T) -> T {
        let mut links: Vec<(Option<T>, Option<T>)> = std::iter::repeat_with(|| (None, None))
            .take(self.rest.len() + 1)
            .collect();
        for (offset, (node, parent, side)) in self.rest.into_iter().enumerate().rev() {
            let (previous, next) = std::mem::take(&mut links[offset + 1]);
            let built = link(node, previous, next);
            match side {
                Side::Previous => links[parent].0 = Some(built),
                Side::Next => links[parent].1 = Some(built),
            }
        }
        let (previous, next) = std::mem::take(&mut links[0]);
        link(self.head, previous, next)
    }
}

// ─── Encode ──────────────────────────────────────────────────────────

struct Encoder<'a> {
    schema: &'a Schema,
    derivations: &'a DerivationTable,
    strict: bool,
    interned: Vec<StateObject>,
    objects: Vec<Value>,
}

impl Encoder<'_> {
    fn intern(&mut self, object: &StateObject) -> usize {
        if let Some(index) = self.interned.iter().position(|o| o.ptr_eq(object)) {
            return index;
        }
        self.interned.push(object.clone());
        self.objects.push(object.to_value());
        self.objects.len() - 1
    }

    fn states(&mut self, target: &RouteTarget) -> Result<Vec<SnapshotState>, RouterError> {
        let lineage = self.schema.lineage(target.path())?;
        let mut states = Vec::with_capacity(lineage.len());
        for (index, (node, object)) in lineage.iter().zip(target.states()).enumerate() {
            let state = match self.schema.state(*node) {
                StateSchema::Derived(deriver) => match self.derivations.lookup(object) {
                    Some(record) if record.produced_by(deriver) => SnapshotState::Derived {
                        value: record.input.clone(),
                    },
                    _ if self.derivations.is_edited(object) => {
                        SnapshotState::Index(self.intern(object))
                    }
                    _ => {
                        let path = &target.path()[..=index];
                        if self.strict {
                            return Err(SnapshotError::MissingDerivation {
                                path: path.to_vec(),
                            }
                            .into());
                        }
                        tracing::warn!(
                            path = ?path,
                            "derived state has no derivation record, storing it by value"
                        );
                        SnapshotState::Index(self.intern(object))
                    }
                },
                StateSchema::Static(_) | StateSchema::None => {
                    SnapshotState::Index(self.intern(object))
                }
            };
            states.push(state);
        }
        Ok(states)
    }
}

/// Encode the chain around `head`.
pub(crate) fn encode(
    schema: &Schema,
    derivations: &DerivationTable,
    operation: OperationKind,
    head: &RouteTarget,
    strict: bool,
) -> Result<Snapshot, RouterError> {
    let mut encoder = Encoder {
        schema,
        derivations,
        strict,
        interned: Vec::new(),
        objects: Vec::new(),
    };
    let flattened = flatten(
        head,
        |target| (target.previous(), target.next()),
        |target| Ok((target.path().to_vec(), encoder.states(target)?)),
    )?;
    let entry = flattened.assemble(|(path, states), previous, next| SnapshotEntry {
        path,
        states,
        previous: previous.map(Box::new),
        next: next.map(Box::new),
    });
    Ok(Snapshot {
        operation,
        entry,
        objects: encoder.objects,
    })
}

// ─── Decode ──────────────────────────────────────────────────────────

struct Decoder<'a> {
    schema: &'a Schema,
    derivations: &'a mut DerivationTable,
    objects: Vec<StateObject>,
}

impl Decoder<'_> {
    fn states(&mut self, entry: &SnapshotEntry) -> Result<Vec<StateObject>, RouterError> {
        let lineage = self
            .schema
            .lineage(&entry.path)
            .map_err(|_| SnapshotError::UnknownSegment {
                path: entry.path.clone(),
            })?;
        if entry.states.len() != entry.path.len() {
            return Err(SnapshotError::StateCountMismatch {
                path: entry.path.clone(),
                segments: entry.path.len(),
                states: entry.states.len(),
            }
            .into());
        }

        let mut merged = MergedState::default();
        let mut states = Vec::with_capacity(entry.states.len());
        for (index, (node, state)) in lineage.iter().zip(&entry.states).enumerate() {
            let path = &entry.path[..=index];
            let schema_state = self.schema.state(*node);
            let object = match state {
                SnapshotState::Index(i) => {
                    let object = self.objects.get(*i).cloned().ok_or(
                        SnapshotError::MissingObject {
                            index: *i,
                            len: self.objects.len(),
                        },
                    )?;
                    if matches!(schema_state, StateSchema::Derived(_)) {
                        self.derivations.record_edited(&object);
                    }
                    object
                }
                SnapshotState::Derived { value } => match schema_state {
                    StateSchema::Derived(deriver) => {
                        let object = derive_state(deriver, value.as_ref(), &merged, path)?;
                        self.derivations
                            .record(&object, Rc::clone(deriver), value.clone());
                        object
                    }
                    StateSchema::Static(_) | StateSchema::None => match value {
                        Some(value) => StateObject::from_value(path, value.clone())?,
                        None => {
                            return Err(StateError::NotAnObject {
                                path: path.to_vec(),
                                found: "null",
                            }
                            .into())
                        }
                    },
                },
            };
            merged = merged.with_layer(object.clone());
            states.push(object);
        }
        Ok(states)
    }
}

/// Decode a snapshot into a linked head target.
pub(crate) fn decode(
    schema: &Schema,
    derivations: &mut DerivationTable,
    snapshot: &Snapshot,
) -> Result<RouteTarget, RouterError> {
    let objects = snapshot
        .objects
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(fields) => Ok(StateObject::new(fields.clone())),
            _ => Err(SnapshotError::NotAnObject { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut decoder = Decoder {
        schema,
        derivations,
        objects,
    };
    let flattened = flatten(
        &snapshot.entry,
        |entry| (entry.previous.as_deref(), entry.next.as_deref()),
        |entry| Ok((entry.path.clone(), decoder.states(entry)?)),
    )?;
    Ok(flattened.assemble(|(path, states), previous, next| {
        RouteTarget::from_parts(path, states, previous.map(Rc::new), next.map(Rc::new))
    }))
}
