//! # Views — Lifecycle-Aware Projections of Route Nodes
//!
//! A [`View`] watches the router slots on behalf of a UI region. On every
//! slot change it collects the slots whose entry matches one of its route
//! nodes and maintains a list of [`ViewEntry`] values for them.
//!
//! ## Modes
//!
//! - **Parallel**: one view entry per matching slot, keyed by the route
//!   entry id. An entry moving from the transition slot to the active slot
//!   keeps its view entry.
//! - **Single**: at most one view entry for the whole region. When both
//!   the active and the transition entry match, the region shows the active
//!   entry as stable and never blocks. A matching switching entry takes the
//!   region over.
//!
//! ## Blocking
//!
//! A view entry registers itself as a blocker on its route entry only when
//! all of the following hold:
//!
//! ```text
//! entering blocker:  role == Entering  &&  interest.entering  &&  !entered
//! leaving blocker:   role == Leaving   &&  interest.leaving   &&  !left
//! ```
//!
//! `Activity::complete()` flips the latch and re-synchronises the
//! registration. Retired view entries release every block they hold.
//!
//! Switching never blocks. A view entry bound to the switching entry
//! reports `SwitchingRelation::To`; one bound to the active entry while a
//! switch is in flight reports `SwitchingRelation::From`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use wayline_core::{EntryId, MergedState, Observable, Subscription, ViewEntryKey};

use crate::entry::RouteEntry;
use crate::route::RouteNode;
use crate::router::{Router, Slots};
use crate::schema::SchemaNodeId;

/// How a view maps matching slots to view entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// One view entry per matching slot.
    Parallel,
    /// At most one view entry.
    Single,
}

/// Which lifecycle phases a consumer wants to hold back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionInterest {
    /// Block the incoming entry until `entering().complete()`.
    pub entering: bool,
    /// Block the outgoing entry until `leaving().complete()`.
    pub leaving: bool,
}

impl TransitionInterest {
    /// Interest in both phases.
    pub const BOTH: Self = Self {
        entering: true,
        leaving: true,
    };

    /// Interest in the entering phase only.
    pub const ENTERING: Self = Self {
        entering: true,
        leaving: false,
    };

    /// Interest in the leaving phase only.
    pub const LEAVING: Self = Self {
        entering: false,
        leaving: true,
    };
}

/// Lifecycle role of a view entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEntryRole {
    /// Bound to a settled entry.
    Stable,
    /// Bound to the incoming transition entry.
    Entering,
    /// Bound to the active entry while a transition is in flight.
    Leaving,
}

/// Side of a switch a view entry is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchingRelation {
    /// The entry being switched to.
    To,
    /// The entry being switched away from.
    From,
}

/// Switching exposure of a view entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchingView {
    /// Which side of the switch.
    pub rel: SwitchingRelation,
    /// Current switching state.
    pub state: Value,
}

pub(crate) type ViewKey = (Vec<(SchemaNodeId, bool)>, ViewMode);

/// Where one view entry should be bound after a recomputation.
struct Placement {
    entry: Rc<RouteEntry>,
    route: usize,
    role: ViewEntryRole,
    switching: Option<SwitchingView>,
}

// ─── ViewEntry ───────────────────────────────────────────────────────

struct Binding {
    entry: Rc<RouteEntry>,
    route: RouteNode,
    role: ViewEntryRole,
}

struct ViewEntryInner {
    key: ViewEntryKey,
    binding: RefCell<Binding>,
    interest: Cell<TransitionInterest>,
    entered: Cell<bool>,
    left: Cell<bool>,
    retired: Cell<bool>,
    entering_block: RefCell<Option<Rc<RouteEntry>>>,
    leaving_block: RefCell<Option<Rc<RouteEntry>>>,
    switching: Observable<Option<SwitchingView>>,
}

/// One lifecycle-tracked item of a [`View`].
#[derive(Clone)]
pub struct ViewEntry {
    inner: Rc<ViewEntryInner>,
}

impl fmt::Debug for ViewEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binding = self.inner.binding.borrow();
        f.debug_struct("ViewEntry")
            .field("key", &self.inner.key)
            .field("entry", &binding.entry.id())
            .field("role", &binding.role)
            .field("retired", &self.inner.retired.get())
            .finish()
    }
}

impl ViewEntry {
    fn new(
        router: &Router,
        routes: &[RouteNode],
        placement: &Placement,
        interest: TransitionInterest,
    ) -> Self {
        Self {
            inner: Rc::new(ViewEntryInner {
                key: router.ids().view_entry_key(),
                binding: RefCell::new(Binding {
                    entry: Rc::clone(&placement.entry),
                    route: routes[placement.route].clone(),
                    role: placement.role,
                }),
                interest: Cell::new(interest),
                entered: Cell::new(false),
                left: Cell::new(false),
                retired: Cell::new(false),
                entering_block: RefCell::new(None),
                leaving_block: RefCell::new(None),
                switching: router.runtime().observable(None),
            }),
        }
    }

    /// Stable key; also the blocker identity on route entries.
    pub fn key(&self) -> ViewEntryKey {
        self.inner.key
    }

    /// The bound route entry.
    pub fn entry(&self) -> Rc<RouteEntry> {
        Rc::clone(&self.inner.binding.borrow().entry)
    }

    /// Id of the bound route entry.
    pub fn entry_id(&self) -> EntryId {
        self.inner.binding.borrow().entry.id()
    }

    /// The view's route node that matched.
    pub fn route(&self) -> RouteNode {
        self.inner.binding.borrow().route.clone()
    }

    /// Current role.
    pub fn role(&self) -> ViewEntryRole {
        self.inner.binding.borrow().role
    }

    /// Path of the bound route entry.
    pub fn path(&self) -> Vec<String> {
        self.inner.binding.borrow().entry.path()
    }

    /// Merged state of the bound route entry.
    pub fn merged_state(&self) -> MergedState {
        self.inner.binding.borrow().entry.merged_state()
    }

    /// One merged state key of the bound route entry.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.inner.binding.borrow().entry.state(key)
    }

    /// The entering activity, while this entry is entering.
    pub fn entering(&self) -> Option<Activity> {
        (self.role() == ViewEntryRole::Entering).then(|| Activity {
            entry: self.clone(),
            kind: ActivityKind::Entering,
        })
    }

    /// The leaving activity, while this entry is leaving.
    pub fn leaving(&self) -> Option<Activity> {
        (self.role() == ViewEntryRole::Leaving).then(|| Activity {
            entry: self.clone(),
            kind: ActivityKind::Leaving,
        })
    }

    /// Whether `entering().complete()` has been called for the bound entry.
    pub fn is_entered(&self) -> bool {
        self.inner.entered.get()
    }

    /// Whether `leaving().complete()` has been called for the bound entry.
    pub fn is_left(&self) -> bool {
        self.inner.left.get()
    }

    /// Declared interest.
    pub fn interest(&self) -> TransitionInterest {
        self.inner.interest.get()
    }

    /// Declare which phases this entry holds back.
    pub fn declare_transition(&self, interest: TransitionInterest) {
        self.inner.interest.set(interest);
        self.sync_blockers();
    }

    /// Current switching exposure.
    pub fn switching(&self) -> Option<SwitchingView> {
        self.inner.switching.get()
    }

    /// Observe switching exposure changes. Equal values are not repeated
    /// and a retired entry publishes nothing further.
    pub fn subscribe_switching(
        &self,
        f: impl Fn(&Option<SwitchingView>) + 'static,
    ) -> Subscription {
        self.inner.switching.subscribe(f)
    }

    /// Whether the entry has left the view.
    pub fn is_retired(&self) -> bool {
        self.inner.retired.get()
    }

    /// Whether both handles refer to the same view entry.
    pub fn ptr_eq(&self, other: &ViewEntry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn rebind(&self, routes: &[RouteNode], placement: &Placement) {
        let mut binding = self.inner.binding.borrow_mut();
        if binding.entry.id() != placement.entry.id() {
            self.inner.entered.set(false);
            self.inner.left.set(false);
            binding.entry = Rc::clone(&placement.entry);
        }
        binding.route = routes[placement.route].clone();
        binding.role = placement.role;
    }

    fn publish_switching(&self, switching: Option<SwitchingView>) {
        if !self.is_retired() {
            self.inner.switching.set_if_changed(switching);
        }
    }

    fn retire(&self) {
        self.inner.retired.set(true);
        self.sync_blockers();
    }

    fn sync_blockers(&self) {
        let inner = &self.inner;
        let (want_entering, want_leaving) = {
            let binding = inner.binding.borrow();
            let interest = inner.interest.get();
            let live = !inner.retired.get();
            let entering = live
                && binding.role == ViewEntryRole::Entering
                && interest.entering
                && !inner.entered.get();
            let leaving = live
                && binding.role == ViewEntryRole::Leaving
                && interest.leaving
                && !inner.left.get();
            (
                entering.then(|| Rc::clone(&binding.entry)),
                leaving.then(|| Rc::clone(&binding.entry)),
            )
        };
        reconcile(
            &inner.entering_block,
            want_entering,
            inner.key,
            RouteEntry::block_entering,
            RouteEntry::unblock_entering,
        );
        reconcile(
            &inner.leaving_block,
            want_leaving,
            inner.key,
            RouteEntry::block_leaving,
            RouteEntry::unblock_leaving,
        );
    }
}

/// Move a block registration from the currently blocked entry to `want`.
fn reconcile(
    slot: &RefCell<Option<Rc<RouteEntry>>>,
    want: Option<Rc<RouteEntry>>,
    key: ViewEntryKey,
    block: fn(&RouteEntry, ViewEntryKey),
    unblock: fn(&RouteEntry, ViewEntryKey),
) {
    let current = slot.borrow().clone();
    let unchanged = match (&current, &want) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    if unchanged {
        return;
    }
    *slot.borrow_mut() = want.clone();
    if let Some(old) = current {
        unblock(&old, key);
    }
    if let Some(new) = want {
        block(&new, key);
    }
}

// ─── Activity ────────────────────────────────────────────────────────

/// The lifecycle phase an [`Activity`] controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// Entering phase.
    Entering,
    /// Leaving phase.
    Leaving,
}

/// Consumer handle for one lifecycle phase of a view entry.
#[derive(Clone)]
pub struct Activity {
    entry: ViewEntry,
    kind: ActivityKind,
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("entry", &self.entry.key())
            .field("kind", &self.kind)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Activity {
    /// Which phase.
    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    /// Whether the phase has been completed.
    pub fn is_complete(&self) -> bool {
        match self.kind {
            ActivityKind::Entering => self.entry.is_entered(),
            ActivityKind::Leaving => self.entry.is_left(),
        }
    }

    /// Mark the phase done and release the block. Repeat calls are no-ops.
    pub fn complete(&self) {
        let latch = match self.kind {
            ActivityKind::Entering => &self.entry.inner.entered,
            ActivityKind::Leaving => &self.entry.inner.left,
        };
        if latch.replace(true) {
            return;
        }
        self.entry.sync_blockers();
    }
}

// ─── View ────────────────────────────────────────────────────────────

pub(crate) struct ViewInner {
    router: Router,
    routes: Vec<RouteNode>,
    mode: ViewMode,
    interest: Cell<TransitionInterest>,
    entries: Observable<Vec<ViewEntry>>,
    signature: RefCell<Vec<(ViewEntryKey, EntryId, ViewEntryRole)>>,
    slots_sub: RefCell<Option<Subscription>>,
    switching_sub: RefCell<Option<(Observable<Value>, Subscription)>>,
    refreshing: Cell<bool>,
    dirty: Cell<bool>,
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        for entry in self.entries.get() {
            entry.retire();
        }
    }
}

impl ViewInner {
    fn refresh(self: &Rc<Self>) {
        if self.refreshing.replace(true) {
            self.dirty.set(true);
            return;
        }
        loop {
            self.dirty.set(false);
            self.recompute();
            if !self.dirty.get() {
                break;
            }
        }
        self.refreshing.set(false);
    }

    fn match_route(&self, entry: &RouteEntry) -> Option<usize> {
        let path = entry.path();
        self.routes.iter().position(|route| route.matches(&path))
    }

    fn placements(&self, slots: &Slots) -> Vec<Placement> {
        let switching_state = slots.switching().map(|s| s.state().get());
        let in_transition = slots.transition().is_some();
        let from = |state: &Option<Value>| {
            state.clone().map(|state| SwitchingView {
                rel: SwitchingRelation::From,
                state,
            })
        };

        let active = slots
            .active()
            .and_then(|slot| Some((slot.entry(), self.match_route(slot.entry())?)));
        let transition = slots
            .transition()
            .and_then(|slot| Some((slot.entry(), self.match_route(slot.entry())?)));
        let switching = slots.switching().and_then(|slot| {
            let route = self.match_route(slot.entry())?;
            Some(Placement {
                entry: Rc::clone(slot.entry()),
                route,
                role: ViewEntryRole::Stable,
                switching: Some(SwitchingView {
                    rel: SwitchingRelation::To,
                    state: slot.state().get(),
                }),
            })
        });

        match self.mode {
            ViewMode::Parallel => {
                let mut placements = Vec::with_capacity(3);
                if let Some((entry, route)) = active {
                    placements.push(Placement {
                        entry: Rc::clone(entry),
                        route,
                        role: if in_transition {
                            ViewEntryRole::Leaving
                        } else {
                            ViewEntryRole::Stable
                        },
                        switching: from(&switching_state),
                    });
                }
                if let Some((entry, route)) = transition {
                    placements.push(Placement {
                        entry: Rc::clone(entry),
                        route,
                        role: ViewEntryRole::Entering,
                        switching: None,
                    });
                }
                placements.extend(switching);
                placements
            }
            ViewMode::Single => {
                if let Some(switching) = switching {
                    return vec![switching];
                }
                let placement = match (active, transition) {
                    (Some((entry, route)), Some(_)) => Some(Placement {
                        entry: Rc::clone(entry),
                        route,
                        role: ViewEntryRole::Stable,
                        switching: None,
                    }),
                    (Some((entry, route)), None) => Some(Placement {
                        entry: Rc::clone(entry),
                        route,
                        role: if in_transition {
                            ViewEntryRole::Leaving
                        } else {
                            ViewEntryRole::Stable
                        },
                        switching: from(&switching_state),
                    }),
                    (None, Some((entry, route))) => Some(Placement {
                        entry: Rc::clone(entry),
                        route,
                        role: ViewEntryRole::Entering,
                        switching: None,
                    }),
                    (None, None) => None,
                };
                placement.into_iter().collect()
            }
        }
    }

    /// Follow the switching state cell of the current switch, if any.
    fn watch_switching(self: &Rc<Self>, slots: &Slots) {
        let cell = slots.switching().map(|s| s.state().clone());
        let mut current = self.switching_sub.borrow_mut();
        let unchanged = match (current.as_ref(), cell.as_ref()) {
            (Some((watched, _)), Some(cell)) => watched.ptr_eq(cell),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        *current = cell.map(|cell| {
            let weak = Rc::downgrade(self);
            let sub = cell.subscribe(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.refresh();
                }
            });
            (cell, sub)
        });
    }

    fn recompute(self: &Rc<Self>) {
        let slots = self.router.slots();
        self.watch_switching(&slots);
        let placements = self.placements(&slots);
        let previous = self.entries.get();

        let mut next: Vec<ViewEntry> = Vec::with_capacity(placements.len());
        for placement in &placements {
            let reused = match self.mode {
                ViewMode::Parallel => previous
                    .iter()
                    .find(|e| e.entry_id() == placement.entry.id())
                    .cloned(),
                ViewMode::Single => previous.first().cloned(),
            };
            let entry = match reused {
                Some(entry) => {
                    entry.rebind(&self.routes, placement);
                    entry
                }
                None => ViewEntry::new(&self.router, &self.routes, placement, self.interest.get()),
            };
            next.push(entry);
        }

        for old in &previous {
            if !next.iter().any(|e| e.ptr_eq(old)) {
                old.retire();
            }
        }
        for (entry, placement) in next.iter().zip(placements) {
            entry.sync_blockers();
            entry.publish_switching(placement.switching);
        }

        let signature: Vec<_> = next
            .iter()
            .map(|e| (e.key(), e.entry_id(), e.role()))
            .collect();
        let changed = *self.signature.borrow() != signature;
        if changed {
            *self.signature.borrow_mut() = signature;
            self.entries.set(next);
        }
    }
}

/// A cached projection of route nodes into view entries.
///
/// Views are shared per (route nodes, mode) while any handle is alive.
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("mode", &self.inner.mode)
            .field("routes", &self.inner.routes)
            .field("entries", &self.inner.entries.get())
            .finish()
    }
}

impl View {
    pub(crate) fn cached(router: &Router, routes: &[RouteNode], mode: ViewMode) -> View {
        let key: ViewKey = (routes.iter().map(|r| (r.id(), r.is_exact())).collect(), mode);
        let existing = router.views().borrow().get(&key).and_then(Weak::upgrade);
        if let Some(inner) = existing {
            return View { inner };
        }

        let inner = Rc::new(ViewInner {
            router: router.clone(),
            routes: routes.to_vec(),
            mode,
            interest: Cell::new(TransitionInterest::default()),
            entries: router.runtime().observable(Vec::new()),
            signature: RefCell::new(Vec::new()),
            slots_sub: RefCell::new(None),
            switching_sub: RefCell::new(None),
            refreshing: Cell::new(false),
            dirty: Cell::new(false),
        });
        let weak = Rc::downgrade(&inner);
        let sub = router.subscribe(move |_| {
            if let Some(view) = weak.upgrade() {
                view.refresh();
            }
        });
        *inner.slots_sub.borrow_mut() = Some(sub);
        inner.refresh();

        let mut views = router.views().borrow_mut();
        views.retain(|_, view| view.strong_count() > 0);
        views.insert(key, Rc::downgrade(&inner));
        View { inner }
    }

    /// Route nodes this view projects.
    pub fn routes(&self) -> &[RouteNode] {
        &self.inner.routes
    }

    /// Projection mode.
    pub fn mode(&self) -> ViewMode {
        self.inner.mode
    }

    /// Current view entries.
    pub fn entries(&self) -> Vec<ViewEntry> {
        self.inner.entries.get()
    }

    /// Whether no slot matches.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.with(Vec::is_empty)
    }

    /// Observe changes of the entry list (membership or roles).
    pub fn subscribe(&self, f: impl Fn(&[ViewEntry]) + 'static) -> Subscription {
        self.inner.entries.subscribe(move |entries: &Vec<ViewEntry>| f(entries))
    }

    /// Number of entry list changes so far.
    pub fn revision(&self) -> u64 {
        self.inner.entries.version()
    }

    /// Default interest for current and future entries.
    pub fn declare_transition(&self, interest: TransitionInterest) {
        self.inner.interest.set(interest);
        for entry in self.inner.entries.get() {
            entry.declare_transition(interest);
        }
    }

    /// Default interest.
    pub fn interest(&self) -> TransitionInterest {
        self.inner.interest.get()
    }

    /// Whether both handles share one view.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
