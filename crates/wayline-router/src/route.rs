//! # Route Handles
//!
//! A [`RouteNode`] is a handle on one schema segment, bound to a router. It
//! builds navigation operations towards its segment and answers whether
//! the router's slots currently match it.
//!
//! ## Matching
//!
//! By default a node matches any path that *starts with* its own path, so
//! `home` is matched while `home/hello` is active. An exact node (see
//! [`RouteNode::exact`] and `SegmentSchema::exact`) matches only its own
//! path.
//!
//! ## State overrides
//!
//! [`RouteNode::with_state`] returns a copy carrying a state override for
//! the node's segment. Overrides accumulate down the tree:
//!
//! ```text
//! router.route(&["home"])?.with_state(json!({"user": "b"}))
//!     .child("hello")?.with_state(json!({"greeting": "hey"}))
//!     .push()?.commit()?;
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use wayline_core::{NavigationError, RouterError, SchemaError};

use crate::operation::{NavigationRequest, RouteOperation};
use crate::router::{Router, Slots};
use crate::schema::SchemaNodeId;
use crate::target;

/// Path predicate used by directed navigation and slot matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RouteMatcher {
    path: Vec<String>,
    exact: bool,
}

impl RouteMatcher {
    pub(crate) fn matches(&self, path: &[String]) -> bool {
        if self.exact {
            path == self.path.as_slice()
        } else {
            path.starts_with(&self.path)
        }
    }
}

/// Handle on one schema segment.
#[derive(Clone)]
pub struct RouteNode {
    router: Router,
    node: SchemaNodeId,
    exact: bool,
    overrides: BTreeMap<usize, Value>,
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("path", &self.path())
            .field("exact", &self.exact)
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl PartialEq for RouteNode {
    fn eq(&self, other: &Self) -> bool {
        self.router.ptr_eq(&other.router)
            && self.node == other.node
            && self.exact == other.exact
            && self.overrides == other.overrides
    }
}

impl RouteNode {
    pub(crate) fn resolve<S: AsRef<str>>(router: &Router, path: &[S]) -> Result<Self, RouterError> {
        let node = router.schema().resolve(path)?;
        Ok(Self::at(router.clone(), node, BTreeMap::new()))
    }

    fn at(router: Router, node: SchemaNodeId, overrides: BTreeMap<usize, Value>) -> Self {
        let exact = router.schema().is_exact(node);
        Self {
            router,
            node,
            exact,
            overrides,
        }
    }

    /// The router this handle is bound to.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Schema node id.
    pub fn id(&self) -> SchemaNodeId {
        self.node
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        self.router.schema().name(self.node)
    }

    /// Full path from the root.
    pub fn path(&self) -> &[String] {
        self.router.schema().path(self.node)
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        self.path().len()
    }

    /// Whether this handle matches only its own path.
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// The exact-match variant of this handle.
    pub fn exact(&self) -> RouteNode {
        RouteNode {
            exact: true,
            ..self.clone()
        }
    }

    /// Child handle, carrying this handle's overrides.
    pub fn child(&self, name: &str) -> Result<RouteNode, RouterError> {
        let child = self
            .router
            .schema()
            .child(self.node, name)
            .ok_or_else(|| SchemaError::UnknownSegment {
                path: self
                    .path()
                    .iter()
                    .cloned()
                    .chain(std::iter::once(name.to_string()))
                    .collect(),
            })?;
        Ok(Self::at(self.router.clone(), child, self.overrides.clone()))
    }

    /// Parent handle, keeping the overrides of the remaining segments.
    pub fn parent(&self) -> Option<RouteNode> {
        let parent = self.router.schema().parent(self.node)?;
        let depth = self.router.schema().path(parent).len();
        let overrides = self
            .overrides
            .range(..depth)
            .map(|(i, v)| (*i, v.clone()))
            .collect();
        Some(Self::at(self.router.clone(), parent, overrides))
    }

    /// Copy carrying `state` as the override for this segment.
    pub fn with_state(&self, state: Value) -> RouteNode {
        let mut node = self.clone();
        node.overrides.insert(self.depth() - 1, state);
        node
    }

    /// Overrides keyed by path index.
    pub fn overrides(&self) -> &BTreeMap<usize, Value> {
        &self.overrides
    }

    pub(crate) fn matcher(&self) -> RouteMatcher {
        RouteMatcher {
            path: self.path().to_vec(),
            exact: self.exact,
        }
    }

    /// Whether `path` is matched by this handle.
    pub fn matches(&self, path: &[String]) -> bool {
        self.matcher().matches(path)
    }

    // ─── Slot predicates ─────────────────────────────────────────────

    fn slot_matches(&self, pick: impl FnOnce(&Slots) -> Option<Vec<String>>) -> bool {
        self.router
            .with_slots(pick)
            .is_some_and(|path| self.matches(&path))
    }

    /// The active entry matches.
    pub fn is_active(&self) -> bool {
        self.slot_matches(|s| s.active().map(|slot| slot.entry().path()))
    }

    /// The transition entry matches.
    pub fn is_transition(&self) -> bool {
        self.slot_matches(|s| s.transition().map(|slot| slot.entry().path()))
    }

    /// The switching entry matches.
    pub fn is_switching(&self) -> bool {
        self.slot_matches(|s| s.switching().map(|slot| slot.entry().path()))
    }

    /// Any slot matches.
    pub fn is_matched(&self) -> bool {
        self.is_active() || self.is_transition() || self.is_switching()
    }

    // ─── Operations ──────────────────────────────────────────────────

    fn has_history(&self) -> bool {
        !self.router.is_idle() || self.router.active_entry().is_some()
    }

    fn operation(&self, request: NavigationRequest) -> RouteOperation {
        RouteOperation::new(self.router.clone(), request)
    }

    /// Discard history and navigate here.
    pub fn reset(&self) -> RouteOperation {
        self.operation(NavigationRequest::reset(
            self.path().to_vec(),
            self.overrides.clone(),
        ))
    }

    /// Navigate here, keeping the current location as the previous target.
    pub fn push(&self) -> Result<RouteOperation, RouterError> {
        if !self.has_history() {
            return Err(NavigationError::NoActiveEntry.into());
        }
        Ok(self.operation(NavigationRequest::push(
            self.path().to_vec(),
            self.overrides.clone(),
        )))
    }

    /// Navigate here in place of the current location.
    pub fn replace(&self) -> Result<RouteOperation, RouterError> {
        if !self.has_history() {
            return Err(NavigationError::NoActiveEntry.into());
        }
        Ok(self.operation(NavigationRequest::replace(
            self.path().to_vec(),
            self.overrides.clone(),
        )))
    }

    /// Walk back to the nearest earlier target matched by this handle.
    /// `Ok(None)` when no earlier target matches.
    pub fn back_to(&self) -> Result<Option<RouteOperation>, RouterError> {
        let active = self
            .router
            .active_target()
            .ok_or(NavigationError::NoActiveEntry)?;
        let matcher = self.matcher();
        if target::walked_back(&active, |path| matcher.matches(path)).is_none() {
            return Ok(None);
        }
        Ok(Some(self.operation(NavigationRequest::back_to(matcher))))
    }

    /// Walk forward to the nearest later target matched by this handle.
    /// `Ok(None)` when no later target matches.
    pub fn forward_to(&self) -> Result<Option<RouteOperation>, RouterError> {
        let active = self
            .router
            .active_target()
            .ok_or(NavigationError::NoActiveEntry)?;
        let matcher = self.matcher();
        if target::walked_forward(&active, |path| matcher.matches(path)).is_none() {
            return Ok(None);
        }
        Ok(Some(self.operation(NavigationRequest::forward_to(matcher))))
    }
}
