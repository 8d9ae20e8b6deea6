//! # Route Targets
//!
//! A [`RouteTarget`] describes one point in history: a path, one state
//! object per path segment, and links to earlier and later targets.
//!
//! ## History chain
//!
//! The back/forward chain is stored as a zipper. The head target links to
//! its previous and next neighbours; a target reached through `previous`
//! only carries leftward history (its own `next` is empty), and a target
//! reached through `next` only carries rightward history.
//!
//! ```text
//!            previous          previous
//!   [A] ◀────────────── [B] ◀──────────── [C]* ──────────▶ [D]
//!                                              next
//!   back():  [B]* with previous → [A], next → [C] → [D]
//! ```
//!
//! Targets are never edited once installed. Navigation builds new heads
//! that share the untouched parts of the chain and the state objects.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use wayline_core::{
    apply_state_part, MergedState, NavigationError, RouterError, SchemaError, StateObject,
    StatePart,
};

use crate::derivation::DerivationTable;
use crate::schema::{derive_state, Schema, StateSchema};

/// The navigation operation that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// History discarded.
    Reset,
    /// Appended after the previous active target.
    Push,
    /// Swapped in place of the previous active target.
    Replace,
    /// Moved to an earlier target.
    Back,
    /// Moved to a later target.
    Forward,
}

impl OperationKind {
    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Push => "push",
            Self::Replace => "replace",
            Self::Back => "back",
            Self::Forward => "forward",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── RouteTarget ─────────────────────────────────────────────────────

/// One history location.
#[derive(Clone, Debug)]
pub struct RouteTarget {
    path: Vec<String>,
    states: Vec<StateObject>,
    previous: Option<Rc<RouteTarget>>,
    next: Option<Rc<RouteTarget>>,
    pending_state_part: Option<StatePart>,
}

impl RouteTarget {
    pub(crate) fn from_parts(
        path: Vec<String>,
        states: Vec<StateObject>,
        previous: Option<Rc<RouteTarget>>,
        next: Option<Rc<RouteTarget>>,
    ) -> Self {
        debug_assert_eq!(path.len(), states.len());
        Self {
            path,
            states,
            previous,
            next,
            pending_state_part: None,
        }
    }

    /// Segment names from the root.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// One state object per path segment.
    pub fn states(&self) -> &[StateObject] {
        &self.states
    }

    /// State object of segment `index`.
    pub fn state_at(&self, index: usize) -> Option<&StateObject> {
        self.states.get(index)
    }

    /// Layered view over all segment states.
    pub fn merged_state(&self) -> MergedState {
        MergedState::new(self.states.clone())
    }

    /// The earlier neighbour.
    pub fn previous(&self) -> Option<&RouteTarget> {
        self.previous.as_deref()
    }

    /// The later neighbour.
    pub fn next(&self) -> Option<&RouteTarget> {
        self.next.as_deref()
    }

    /// State delta to fold in when a switch completes.
    pub fn pending_state_part(&self) -> Option<&StatePart> {
        self.pending_state_part.as_ref()
    }

    /// Number of targets reachable through `previous`.
    pub fn back_depth(&self) -> usize {
        std::iter::successors(self.previous(), |t| t.previous()).count()
    }

    /// Number of targets reachable through `next`.
    pub fn forward_depth(&self) -> usize {
        std::iter::successors(self.next(), |t| t.next()).count()
    }

    /// Same location and states with new neighbours.
    pub(crate) fn relinked(
        &self,
        previous: Option<Rc<RouteTarget>>,
        next: Option<Rc<RouteTarget>>,
    ) -> RouteTarget {
        RouteTarget {
            path: self.path.clone(),
            states: self.states.clone(),
            previous,
            next,
            pending_state_part: None,
        }
    }

    /// This target as somebody's previous neighbour (rightward history dropped).
    pub(crate) fn as_previous(&self) -> Rc<RouteTarget> {
        Rc::new(self.relinked(self.previous.clone(), None))
    }

    /// This target as somebody's next neighbour (leftward history dropped).
    pub(crate) fn as_next(&self) -> Rc<RouteTarget> {
        Rc::new(self.relinked(None, self.next.clone()))
    }

    /// Merge `part` into the states, copy-on-write. Replaced derived layers
    /// are recorded as edited in `derivations`.
    pub(crate) fn with_state_part(
        mut self,
        part: &StatePart,
        derivations: &mut DerivationTable,
    ) -> RouteTarget {
        let states = apply_state_part(&self.states, part);
        derivations.carry_edits(&self.states, &states);
        self.states = states;
        self
    }

    pub(crate) fn with_pending_state_part(mut self, part: Option<StatePart>) -> RouteTarget {
        self.pending_state_part = part;
        self
    }

    /// Fold the pending state part in and clear it.
    pub(crate) fn settled(&self, derivations: &mut DerivationTable) -> RouteTarget {
        let mut target = self.clone();
        if let Some(part) = target.pending_state_part.take() {
            target = target.with_state_part(&part, derivations);
        }
        target
    }
}

// ─── Chain operations ────────────────────────────────────────────────

/// Link a freshly built target after `active`.
pub(crate) fn pushed(active: &RouteTarget, fresh: RouteTarget) -> RouteTarget {
    fresh.relinked(Some(active.as_previous()), None)
}

/// Put a freshly built target in place of `active`.
pub(crate) fn replaced(active: &RouteTarget, fresh: RouteTarget) -> RouteTarget {
    fresh.relinked(active.previous.clone(), active.next.clone())
}

/// Step one target back.
pub(crate) fn stepped_back(active: &RouteTarget) -> Result<RouteTarget, NavigationError> {
    let previous = active.previous.as_ref().ok_or(NavigationError::NoPreviousEntry)?;
    Ok(previous.relinked(previous.previous.clone(), Some(active.as_next())))
}

/// Step one target forward.
pub(crate) fn stepped_forward(active: &RouteTarget) -> Result<RouteTarget, NavigationError> {
    let next = active.next.as_ref().ok_or(NavigationError::NoNextEntry)?;
    Ok(next.relinked(Some(active.as_previous()), next.next.clone()))
}

/// Walk back until `accept` matches a path, re-linking skipped targets.
pub(crate) fn walked_back(
    active: &RouteTarget,
    accept: impl Fn(&[String]) -> bool,
) -> Option<RouteTarget> {
    let mut carried = active.as_next();
    let mut cursor = active.previous.clone();
    while let Some(candidate) = cursor {
        if accept(candidate.path()) {
            return Some(candidate.relinked(candidate.previous.clone(), Some(carried)));
        }
        carried = Rc::new(candidate.relinked(None, Some(carried)));
        cursor = candidate.previous.clone();
    }
    None
}

/// Walk forward until `accept` matches a path, re-linking skipped targets.
pub(crate) fn walked_forward(
    active: &RouteTarget,
    accept: impl Fn(&[String]) -> bool,
) -> Option<RouteTarget> {
    let mut carried = active.as_previous();
    let mut cursor = active.next.clone();
    while let Some(candidate) = cursor {
        if accept(candidate.path()) {
            return Some(candidate.relinked(Some(carried), candidate.next.clone()));
        }
        carried = Rc::new(candidate.relinked(Some(carried), None));
        cursor = candidate.next.clone();
    }
    None
}

// ─── State construction ──────────────────────────────────────────────

/// Length of the shared leading segments of two paths.
pub(crate) fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Build an unlinked target for `path`.
///
/// Segments shared with `active` reuse its state objects unless an
/// override is given for that index. Other segments take the override,
/// else a copy of the static default, else the derived value. Derived
/// objects are recorded in `derivations`.
pub(crate) fn build_target(
    schema: &Schema,
    derivations: &mut DerivationTable,
    path: &[String],
    overrides: &BTreeMap<usize, Value>,
    active: Option<&RouteTarget>,
) -> Result<RouteTarget, RouterError> {
    let lineage = schema.lineage(path)?;
    let common = active.map_or(0, |a| common_prefix_len(a.path(), path));

    let mut merged = MergedState::default();
    let mut states = Vec::with_capacity(path.len());
    for (index, node) in lineage.into_iter().enumerate() {
        let segment_path = &path[..=index];
        let input = overrides.get(&index);

        let reused = match (active, input) {
            (Some(active), None) if index < common => active.state_at(index).cloned(),
            _ => None,
        };

        let object = match reused {
            Some(object) => object,
            None => match schema.state(node) {
                StateSchema::Derived(deriver) => {
                    let object = derive_state(deriver, input, &merged, segment_path)?;
                    derivations.record(&object, Rc::clone(deriver), input.cloned());
                    object
                }
                StateSchema::Static(default) => match input {
                    Some(value) => StateObject::from_value(segment_path, value.clone())?,
                    None => StateObject::new(default.clone()),
                },
                StateSchema::None => match input {
                    Some(value) => StateObject::from_value(segment_path, value.clone())?,
                    None => {
                        return Err(SchemaError::MissingState {
                            path: segment_path.to_vec(),
                        }
                        .into())
                    }
                },
            },
        };

        merged = merged.with_layer(object.clone());
        states.push(object);
    }

    Ok(RouteTarget::from_parts(path.to_vec(), states, None, None))
}
