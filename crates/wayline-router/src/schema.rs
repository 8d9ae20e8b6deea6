//! # Schema Tree
//!
//! The author-provided description of every valid route segment: names,
//! nesting, per-segment state and `exact` flags. Pure data. The router
//! resolves paths against it and consults it when building and
//! (de)serializing targets.
//!
//! ## State kinds
//!
//! - **None**: the segment carries no default. Navigating to it without an
//!   explicit state fails with `SchemaError::MissingState`.
//! - **Static**: a JSON object copied into every freshly built target.
//! - **Derived**: a function of an optional input and the merged state of
//!   all ancestor segments. Snapshots store the input, not the output, and
//!   re-derive on restore.
//!
//! ```text
//! Schema::builder()
//!     .segment("home", SegmentSchema::new().state(json!({"user": null}))
//!         .child("hello", SegmentSchema::new().derived(greeting)))
//!     .segment("about", SegmentSchema::new().state(json!({})).exact())
//!     .build()?
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use wayline_core::{MergedState, RouterError, SchemaError, StateError, StateObject};

/// A derived-state function: `(input, merged ancestor state) -> object`.
pub type DeriveFn = Rc<dyn Fn(Option<&Value>, &MergedState) -> Value>;

/// Index of a node in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaNodeId(usize);

/// How a segment obtains its state.
#[derive(Clone)]
pub enum StateSchema {
    /// No default; an explicit state must be supplied.
    None,
    /// A static default object.
    Static(Map<String, Value>),
    /// A derived state recomputed from an input and the ancestor state.
    Derived(DeriveFn),
}

impl StateSchema {
    /// Whether the state is derived.
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived(_))
    }
}

impl fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(fields) => f.debug_tuple("Static").field(fields).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Run a derived-state function and wrap its output.
pub(crate) fn derive_state(
    deriver: &DeriveFn,
    input: Option<&Value>,
    upper: &MergedState,
    path: &[String],
) -> Result<StateObject, StateError> {
    StateObject::from_value(path, deriver(input, upper))
}

// ─── Builder ─────────────────────────────────────────────────────────

/// Author-facing description of one segment and its subtree.
#[derive(Clone, Debug)]
pub struct SegmentSchema {
    state: SegmentState,
    exact: bool,
    children: Vec<(String, SegmentSchema)>,
}

#[derive(Clone)]
enum SegmentState {
    None,
    Static(Value),
    Derived(DeriveFn),
}

impl fmt::Debug for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl Default for SegmentSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentSchema {
    /// A stateless, prefix-matching segment with no children.
    pub fn new() -> Self {
        Self {
            state: SegmentState::None,
            exact: false,
            children: Vec::new(),
        }
    }

    /// Give the segment a static default state (must be a JSON object).
    pub fn state(mut self, value: Value) -> Self {
        self.state = SegmentState::Static(value);
        self
    }

    /// Give the segment a derived state.
    pub fn derived(mut self, f: impl Fn(Option<&Value>, &MergedState) -> Value + 'static) -> Self {
        self.state = SegmentState::Derived(Rc::new(f));
        self
    }

    /// Route handles for this segment match exactly by default.
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Add a child segment.
    pub fn child(mut self, name: impl Into<String>, child: SegmentSchema) -> Self {
        self.children.push((name.into(), child));
        self
    }
}

/// Collects root segments and validates them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    roots: Vec<(String, SegmentSchema)>,
}

impl SchemaBuilder {
    /// Add a root segment.
    pub fn segment(mut self, name: impl Into<String>, segment: SegmentSchema) -> Self {
        self.roots.push((name.into(), segment));
        self
    }

    /// Validate and flatten the tree.
    ///
    /// Fails on duplicate sibling names and on static states that are not
    /// JSON objects.
    pub fn build(self) -> Result<Schema, RouterError> {
        let mut schema = Schema {
            nodes: Vec::new(),
            roots: BTreeMap::new(),
        };
        for (name, segment) in self.roots {
            let id = schema.insert(None, Vec::new(), name.clone(), segment)?;
            if schema.roots.insert(name.clone(), id).is_some() {
                return Err(SchemaError::DuplicateSegment {
                    parent: Vec::new(),
                    name,
                }
                .into());
            }
        }
        Ok(schema)
    }
}

// ─── Schema ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct SchemaNode {
    path: Vec<String>,
    parent: Option<SchemaNodeId>,
    state: StateSchema,
    exact: bool,
    children: BTreeMap<String, SchemaNodeId>,
}

/// Validated, flattened schema tree.
#[derive(Debug)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    roots: BTreeMap<String, SchemaNodeId>,
}

impl Schema {
    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    fn insert(
        &mut self,
        parent: Option<SchemaNodeId>,
        parent_path: Vec<String>,
        name: String,
        segment: SegmentSchema,
    ) -> Result<SchemaNodeId, RouterError> {
        let mut path = parent_path;
        path.push(name);

        let state = match segment.state {
            SegmentState::None => StateSchema::None,
            SegmentState::Static(value) => match StateObject::from_value(&path, value) {
                Ok(object) => StateSchema::Static(object.to_map()),
                Err(err) => return Err(err.into()),
            },
            SegmentState::Derived(f) => StateSchema::Derived(f),
        };

        let id = SchemaNodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            path: path.clone(),
            parent,
            state,
            exact: segment.exact,
            children: BTreeMap::new(),
        });

        for (child_name, child) in segment.children {
            let child_id = self.insert(Some(id), path.clone(), child_name.clone(), child)?;
            if self.nodes[id.0]
                .children
                .insert(child_name.clone(), child_id)
                .is_some()
            {
                return Err(SchemaError::DuplicateSegment {
                    parent: path,
                    name: child_name,
                }
                .into());
            }
        }
        Ok(id)
    }

    /// Number of segments in the schema.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the schema has no segments.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root segment by name.
    pub fn root(&self, name: &str) -> Option<SchemaNodeId> {
        self.roots.get(name).copied()
    }

    /// Root segment names.
    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Child of `node` by name.
    pub fn child(&self, node: SchemaNodeId, name: &str) -> Option<SchemaNodeId> {
        self.nodes[node.0].children.get(name).copied()
    }

    /// Child segment names of `node`.
    pub fn child_names(&self, node: SchemaNodeId) -> impl Iterator<Item = &str> {
        self.nodes[node.0].children.keys().map(String::as_str)
    }

    /// Parent of `node`.
    pub fn parent(&self, node: SchemaNodeId) -> Option<SchemaNodeId> {
        self.nodes[node.0].parent
    }

    /// Full path of `node`.
    pub fn path(&self, node: SchemaNodeId) -> &[String] {
        &self.nodes[node.0].path
    }

    /// Segment name of `node`.
    pub fn name(&self, node: SchemaNodeId) -> &str {
        self.nodes[node.0]
            .path
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// State schema of `node`.
    pub fn state(&self, node: SchemaNodeId) -> &StateSchema {
        &self.nodes[node.0].state
    }

    /// Whether handles for `node` match exactly by default.
    pub fn is_exact(&self, node: SchemaNodeId) -> bool {
        self.nodes[node.0].exact
    }

    /// Resolve a full path to its node.
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Result<SchemaNodeId, SchemaError> {
        self.lineage(path)?
            .last()
            .copied()
            .ok_or_else(|| SchemaError::UnknownSegment { path: Vec::new() })
    }

    /// Resolve every prefix of `path`: element `i` is the node for
    /// `path[..=i]`.
    pub fn lineage<S: AsRef<str>>(&self, path: &[S]) -> Result<Vec<SchemaNodeId>, SchemaError> {
        let unknown = || SchemaError::UnknownSegment {
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
        };
        let mut lineage = Vec::with_capacity(path.len());
        let mut current: Option<SchemaNodeId> = None;
        for segment in path {
            let segment = segment.as_ref();
            let next = match current {
                None => self.root(segment),
                Some(node) => self.child(node, segment),
            }
            .ok_or_else(unknown)?;
            lineage.push(next);
            current = Some(next);
        }
        Ok(lineage)
    }
}
