//! # Router — The Navigation State Machine
//!
//! The router owns three observable slots and moves route entries between
//! them:
//!
//! ```text
//!                    commit()                        blockers clear
//!   Idle ─────────────────────────▶ Transitioning ──────────────────▶ Idle
//!    │   (transition ← new entry)     (active frozen)   (active ← transition)
//!    │
//!    │   switch()                      complete()
//!    └──────────────▶ Switching ──────────────────▶ Idle (active ← switching)
//!                          │           abort()
//!                          └──────────────────────▶ Idle (switching cleared)
//! ```
//!
//! ## Design
//!
//! - **One write per slot change.** Every transition between states is a
//!   single update of the `Slots` observable inside a runtime batch, so
//!   observers never see an empty active slot next to an empty transition
//!   slot mid-swap.
//!
//! - **FIFO queue.** A request arriving while a transition or switch is in
//!   flight (or while older requests are still queued) is queued and started
//!   after the in-flight one settles. The queue is bounded by
//!   `RouterConfig::max_pending_navigations`.
//!
//! - **Level-triggered completion.** A plain transition completes on the
//!   first scheduler tick after it started at which the outgoing entry is not
//!   leaving-blocked and the incoming entry is not entering-blocked.
//!
//! - **Listeners run after state changes.** Events are dispatched once the
//!   slots are updated. Listener failures are logged and ignored.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use wayline_core::{
    EntryId, IdAllocator, ListenerId, NavigationError, Observable, RouterError, Runtime,
    Subscription,
};

use crate::config::RouterConfig;
use crate::derivation::DerivationTable;
use crate::entry::RouteEntry;
use crate::event::{dispatch, ListenerRegistry, RouterEvent};
use crate::operation::{Navigation, NavigationRequest, RouteOperation, Switching};
use crate::plugin::{RouteSegment, RouterPlugin};
use crate::route::RouteNode;
use crate::schema::Schema;
use crate::snapshot::{self, Snapshot};
use crate::target::{OperationKind, RouteTarget};
use crate::view::{View, ViewInner, ViewKey, ViewMode};

// ─── Slots ───────────────────────────────────────────────────────────

/// An entry installed in the active or transition slot.
#[derive(Clone, Debug)]
pub struct SlotEntry {
    operation: OperationKind,
    entry: Rc<RouteEntry>,
}

impl SlotEntry {
    /// Operation that installed the entry.
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// The installed entry.
    pub fn entry(&self) -> &Rc<RouteEntry> {
        &self.entry
    }
}

/// The entry being switched to, with its caller-driven progress state.
#[derive(Clone, Debug)]
pub struct SwitchingSlot {
    operation: OperationKind,
    entry: Rc<RouteEntry>,
    state: Observable<Value>,
    route_ref: Option<String>,
}

impl SwitchingSlot {
    /// Operation that started the switch.
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// The switching entry.
    pub fn entry(&self) -> &Rc<RouteEntry> {
        &self.entry
    }

    /// The observable switching state.
    pub fn state(&self) -> &Observable<Value> {
        &self.state
    }

    /// Address fragment reported by the installed plugin, if any.
    pub fn route_ref(&self) -> Option<&str> {
        self.route_ref.as_deref()
    }
}

/// The router's three slots. At most one of transition/switching is set.
#[derive(Clone, Debug, Default)]
pub struct Slots {
    active: Option<SlotEntry>,
    transition: Option<SlotEntry>,
    switching: Option<SwitchingSlot>,
}

impl Slots {
    /// Current location.
    pub fn active(&self) -> Option<&SlotEntry> {
        self.active.as_ref()
    }

    /// Entry waiting for its blockers to clear.
    pub fn transition(&self) -> Option<&SlotEntry> {
        self.transition.as_ref()
    }

    /// Entry being switched to.
    pub fn switching(&self) -> Option<&SwitchingSlot> {
        self.switching.as_ref()
    }

    /// Whether a transition or switch is in flight.
    pub fn is_busy(&self) -> bool {
        self.transition.is_some() || self.switching.is_some()
    }
}

// ─── Router ──────────────────────────────────────────────────────────

struct QueuedNavigation {
    request: NavigationRequest,
    navigation: Navigation,
}

pub(crate) struct RouterInner {
    schema: Schema,
    config: RouterConfig,
    runtime: Runtime,
    ids: IdAllocator,
    slots: Observable<Slots>,
    queue: RefCell<VecDeque<QueuedNavigation>>,
    derivations: RefCell<DerivationTable>,
    listeners: RefCell<ListenerRegistry>,
    views: RefCell<HashMap<ViewKey, Weak<ViewInner>>>,
    plugin: RefCell<Option<Rc<dyn RouterPlugin>>>,
}

/// Handle to a navigation state machine. Cloning shares the router.
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

/// Non-owning router handle.
#[derive(Clone)]
pub struct WeakRouter {
    inner: Weak<RouterInner>,
}

impl WeakRouter {
    /// The router, if it is still alive.
    pub fn upgrade(&self) -> Option<Router> {
        self.inner.upgrade().map(|inner| Router { inner })
    }
}

impl fmt::Debug for WeakRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRouter")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.inner.slots.get();
        f.debug_struct("Router")
            .field("active", &slots.active.as_ref().map(|s| s.entry.path()))
            .field("transition", &slots.transition.as_ref().map(|s| s.entry.path()))
            .field("switching", &slots.switching.as_ref().map(|s| s.entry.path()))
            .field("queued", &self.inner.queue.try_borrow().map(|q| q.len()).ok())
            .field("listeners", &self.inner.listeners.try_borrow().map(|l| l.len()).ok())
            .field(
                "derivations",
                &self.inner.derivations.try_borrow().map(|d| d.len()).ok(),
            )
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router with its own runtime.
    ///
    /// The router starts with no active entry; the first navigation must be
    /// a `reset` (or a `restore`).
    pub fn new(schema: Schema, config: RouterConfig) -> Self {
        Self::with_runtime(schema, config, Runtime::new())
    }

    /// Create a router driven by an existing runtime.
    pub fn with_runtime(schema: Schema, config: RouterConfig, runtime: Runtime) -> Self {
        let slots = runtime.observable(Slots::default());
        Self {
            inner: Rc::new(RouterInner {
                schema,
                config,
                runtime,
                ids: IdAllocator::new(),
                slots,
                queue: RefCell::new(VecDeque::new()),
                derivations: RefCell::new(DerivationTable::default()),
                listeners: RefCell::new(ListenerRegistry::default()),
                views: RefCell::new(HashMap::new()),
                plugin: RefCell::new(None),
            }),
        }
    }

    /// A non-owning handle.
    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same router.
    pub fn ptr_eq(&self, other: &Router) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The schema this router navigates.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// The runtime that drives deferred work.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Drive the runtime. See [`Runtime::flush`].
    pub fn flush(&self) -> usize {
        self.inner.runtime.flush()
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.inner.ids
    }

    pub(crate) fn derivations(&self) -> &RefCell<DerivationTable> {
        &self.inner.derivations
    }

    pub(crate) fn views(&self) -> &RefCell<HashMap<ViewKey, Weak<ViewInner>>> {
        &self.inner.views
    }

    /// Route handle for a schema path.
    pub fn route<S: AsRef<str>>(&self, path: &[S]) -> Result<RouteNode, RouterError> {
        RouteNode::resolve(self, path)
    }

    // ─── Slot queries ────────────────────────────────────────────────

    /// Current slot contents.
    pub fn slots(&self) -> Slots {
        self.inner.slots.get()
    }

    /// Read the slots through a borrow.
    pub(crate) fn with_slots<R>(&self, f: impl FnOnce(&Slots) -> R) -> R {
        self.inner.slots.with(f)
    }

    /// Observe every slot change.
    pub fn subscribe(&self, f: impl Fn(&Slots) + 'static) -> Subscription {
        self.inner.slots.subscribe(f)
    }

    /// The active entry.
    pub fn active_entry(&self) -> Option<Rc<RouteEntry>> {
        self.with_slots(|s| s.active.as_ref().map(|slot| Rc::clone(&slot.entry)))
    }

    /// Operation that installed the active entry.
    pub fn active_operation(&self) -> Option<OperationKind> {
        self.with_slots(|s| s.active.as_ref().map(|slot| slot.operation))
    }

    /// The entry in the transition slot.
    pub fn transition_entry(&self) -> Option<Rc<RouteEntry>> {
        self.with_slots(|s| s.transition.as_ref().map(|slot| Rc::clone(&slot.entry)))
    }

    /// The entry in the switching slot.
    pub fn switching_entry(&self) -> Option<Rc<RouteEntry>> {
        self.with_slots(|s| s.switching.as_ref().map(|slot| Rc::clone(&slot.entry)))
    }

    /// Current switching state, if a switch is in flight.
    pub fn switching_state(&self) -> Option<Value> {
        self.with_slots(|s| s.switching.as_ref().map(|slot| slot.state.get()))
    }

    pub(crate) fn active_target(&self) -> Option<Rc<RouteTarget>> {
        self.with_slots(|s| s.active.as_ref().map(|slot| slot.entry.target()))
    }

    /// No transition, no switch and nothing queued.
    pub fn is_idle(&self) -> bool {
        !self.with_slots(Slots::is_busy) && self.inner.queue.borrow().is_empty()
    }

    /// Number of requests waiting behind the in-flight one.
    pub fn queued_navigations(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether the active target has a previous neighbour.
    pub fn able_to_back(&self) -> bool {
        self.active_target()
            .is_some_and(|target| target.previous().is_some())
    }

    /// Whether the active target has a next neighbour.
    pub fn able_to_forward(&self) -> bool {
        self.active_target()
            .is_some_and(|target| target.next().is_some())
    }

    // ─── Operations ──────────────────────────────────────────────────

    /// Step back one target.
    pub fn back(&self) -> Result<RouteOperation, RouterError> {
        let active = self.active_target().ok_or(NavigationError::NoActiveEntry)?;
        if active.previous().is_none() {
            return Err(NavigationError::NoPreviousEntry.into());
        }
        Ok(RouteOperation::new(self.clone(), NavigationRequest::back()))
    }

    /// Step forward one target.
    pub fn forward(&self) -> Result<RouteOperation, RouterError> {
        let active = self.active_target().ok_or(NavigationError::NoActiveEntry)?;
        if active.next().is_none() {
            return Err(NavigationError::NoNextEntry.into());
        }
        Ok(RouteOperation::new(self.clone(), NavigationRequest::forward()))
    }

    /// Walk back to the nearest target matched by `route`.
    pub fn back_to(&self, route: &RouteNode) -> Result<Option<RouteOperation>, RouterError> {
        route.back_to()
    }

    /// Walk forward to the nearest target matched by `route`.
    pub fn forward_to(&self, route: &RouteNode) -> Result<Option<RouteOperation>, RouterError> {
        route.forward_to()
    }

    // ─── Listeners and plugin ────────────────────────────────────────

    /// Register a listener. Returned errors are logged, never propagated.
    pub fn add_listener(
        &self,
        listener: impl Fn(&RouterEvent) -> anyhow::Result<()> + 'static,
    ) -> ListenerId {
        let id = self.inner.ids.listener_id();
        self.inner.listeners.borrow_mut().add(id, Rc::new(listener));
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.borrow_mut().remove(id)
    }

    /// Install a plugin and run its setup hook.
    pub fn install(&self, plugin: Rc<dyn RouterPlugin>) {
        *self.inner.plugin.borrow_mut() = Some(Rc::clone(&plugin));
        plugin.setup(self);
    }

    /// Address fragment for `target`, as reported by the installed plugin.
    pub fn route_ref(&self, target: &RouteTarget) -> Option<String> {
        let plugin = self.inner.plugin.borrow().clone()?;
        let segments: Vec<RouteSegment> = target
            .path()
            .iter()
            .zip(target.states())
            .map(|(name, state)| RouteSegment {
                name: name.clone(),
                state: state.to_map(),
            })
            .collect();
        plugin.route_ref(&segments)
    }

    fn emit(&self, event: RouterEvent) {
        let listeners = self.inner.listeners.borrow().snapshot();
        dispatch(&listeners, &event);
    }

    // ─── Snapshot ────────────────────────────────────────────────────

    /// Encode the active history chain.
    pub fn snapshot(&self) -> Result<Snapshot, RouterError> {
        let (operation, target) = self
            .with_slots(|s| {
                s.active
                    .as_ref()
                    .map(|slot| (slot.operation, slot.entry.target()))
            })
            .ok_or(NavigationError::NoActiveEntry)?;
        let derivations = self.inner.derivations.borrow();
        snapshot::encode(
            &self.inner.schema,
            &derivations,
            operation,
            &target,
            self.inner.config.strict_derivations,
        )
    }

    /// Decode `snapshot` and install its head through the transition
    /// pipeline. Requires an idle router.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<Navigation, RouterError> {
        if !self.is_idle() {
            return Err(NavigationError::NotIdle.into());
        }
        let target = {
            let mut derivations = self.inner.derivations.borrow_mut();
            snapshot::decode(&self.inner.schema, &mut derivations, snapshot)?
        };
        self.submit(NavigationRequest::restore(snapshot.operation, target))
    }

    // ─── Views ───────────────────────────────────────────────────────

    /// The view over `routes` in `mode`, shared while any handle lives.
    pub fn view(&self, routes: &[RouteNode], mode: ViewMode) -> View {
        View::cached(self, routes, mode)
    }

    // ─── Transition pipeline ─────────────────────────────────────────

    /// Start `request` now, or queue it behind the in-flight navigation.
    pub(crate) fn submit(&self, request: NavigationRequest) -> Result<Navigation, RouterError> {
        let navigation = Navigation::pending();
        if !self.is_idle() {
            let limit = self.inner.config.max_pending_navigations;
            let operation = request.operation();
            let queued = {
                let mut queue = self.inner.queue.borrow_mut();
                if queue.len() >= limit {
                    return Err(NavigationError::QueueFull { limit }.into());
                }
                queue.push_back(QueuedNavigation {
                    request,
                    navigation: navigation.clone(),
                });
                queue.len()
            };
            tracing::debug!(operation = %operation, queued, "navigation queued");
            self.emit(RouterEvent::NavigationQueued { operation, queued });
            return Ok(navigation);
        }
        self.start_transition(request, navigation.clone())?;
        Ok(navigation)
    }

    fn start_transition(
        &self,
        request: NavigationRequest,
        navigation: Navigation,
    ) -> Result<(), RouterError> {
        let target = request.build_merged(self)?;
        let operation = request.operation();
        let entry = RouteEntry::new(&self.inner.runtime, self.inner.ids.entry_id(), target);
        let outgoing = self.active_entry();

        self.inner.runtime.batch(|| {
            self.inner.slots.update(|slots| {
                slots.transition = Some(SlotEntry {
                    operation,
                    entry: Rc::clone(&entry),
                });
            });
        });

        let entry_id = entry.id();
        let path = entry.path();
        tracing::debug!(operation = %operation, entry = %entry_id, path = ?path, "transition started");
        self.emit(RouterEvent::TransitionStarted {
            operation,
            entry: entry_id,
            path,
        });

        let weak = self.downgrade();
        self.inner.runtime.wait_until(
            move || {
                !outgoing.as_ref().is_some_and(|e| e.is_leaving_blocked())
                    && !entry.is_entering_blocked()
            },
            move || {
                if let Some(router) = weak.upgrade() {
                    router.complete_transition(entry_id, navigation);
                }
            },
        );
        Ok(())
    }

    fn complete_transition(&self, entry_id: EntryId, navigation: Navigation) {
        let Some(transition) = self.with_slots(|s| s.transition.clone()) else {
            return;
        };
        if transition.entry.id() != entry_id {
            return;
        }

        self.inner.runtime.batch(|| {
            self.inner.slots.update(|slots| {
                slots.active = Some(transition.clone());
                slots.transition = None;
            });
        });
        navigation.resolve(Ok(()));

        let path = transition.entry.path();
        tracing::debug!(
            operation = %transition.operation,
            entry = %entry_id,
            path = ?path,
            "transition completed"
        );
        self.emit(RouterEvent::TransitionCompleted {
            operation: transition.operation,
            entry: entry_id,
            path,
        });
        self.start_next_queued();
    }

    fn start_next_queued(&self) {
        loop {
            if self.with_slots(Slots::is_busy) {
                return;
            }
            let Some(next) = self.inner.queue.borrow_mut().pop_front() else {
                return;
            };
            let operation = next.request.operation();
            match self.start_transition(next.request, next.navigation.clone()) {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(operation = %operation, error = %err, "queued navigation failed");
                    next.navigation.resolve(Err(Rc::new(err)));
                }
            }
        }
    }

    // ─── Switching ───────────────────────────────────────────────────

    pub(crate) fn begin_switch(
        &self,
        request: NavigationRequest,
        state: Option<Value>,
    ) -> Result<Switching, RouterError> {
        self.with_slots(|s| {
            if s.transition.is_some() {
                Err(NavigationError::TransitionInFlight)
            } else if s.switching.is_some() {
                Err(NavigationError::SwitchInFlight)
            } else {
                Ok(())
            }
        })?;
        let seed = state
            .or_else(|| self.inner.config.default_switching_state.clone())
            .ok_or(NavigationError::MissingSwitchingState)?;

        let target = request.build_pending(self)?;
        let route_ref = self.route_ref(&target);
        let operation = request.operation();
        let entry = RouteEntry::new(&self.inner.runtime, self.inner.ids.entry_id(), target);
        let cell = self.inner.runtime.observable(seed);

        self.inner.runtime.batch(|| {
            self.inner.slots.update(|slots| {
                slots.switching = Some(SwitchingSlot {
                    operation,
                    entry: Rc::clone(&entry),
                    state: cell.clone(),
                    route_ref,
                });
            });
        });

        let path = entry.path();
        tracing::debug!(operation = %operation, entry = %entry.id(), path = ?path, "switch started");
        self.emit(RouterEvent::SwitchStarted {
            operation,
            entry: entry.id(),
            path,
        });
        Ok(Switching::new(self.downgrade(), entry.id(), cell))
    }

    fn current_switch(&self, entry_id: EntryId) -> Result<SwitchingSlot, RouterError> {
        self.with_slots(|s| s.switching.clone())
            .filter(|slot| slot.entry.id() == entry_id)
            .ok_or_else(|| NavigationError::StaleSwitch.into())
    }

    pub(crate) fn update_switch(&self, entry_id: EntryId, value: Value) -> Result<(), RouterError> {
        let slot = self.current_switch(entry_id)?;
        slot.state.set_if_changed(value);
        Ok(())
    }

    pub(crate) fn complete_switch(&self, entry_id: EntryId) -> Result<(), RouterError> {
        let slot = self.current_switch(entry_id)?;
        self.inner.runtime.batch(|| {
            slot.entry
                .settle_pending_state(&mut self.inner.derivations.borrow_mut());
            self.inner.slots.update(|slots| {
                slots.active = Some(SlotEntry {
                    operation: slot.operation,
                    entry: Rc::clone(&slot.entry),
                });
                slots.switching = None;
            });
        });

        let path = slot.entry.path();
        tracing::debug!(operation = %slot.operation, entry = %entry_id, path = ?path, "switch completed");
        self.emit(RouterEvent::SwitchCompleted {
            operation: slot.operation,
            entry: entry_id,
            path,
        });
        self.start_next_queued();
        Ok(())
    }

    pub(crate) fn abort_switch(&self, entry_id: EntryId) -> Result<(), RouterError> {
        self.current_switch(entry_id)?;
        self.inner.runtime.batch(|| {
            self.inner.slots.update(|slots| slots.switching = None);
        });

        tracing::debug!(entry = %entry_id, "switch aborted");
        self.emit(RouterEvent::SwitchAborted { entry: entry_id });
        self.start_next_queued();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SegmentSchema;
    use serde_json::json;
    use std::cell::Cell;

    fn router() -> Router {
        let schema = Schema::builder()
            .segment(
                "home",
                SegmentSchema::new()
                    .state(json!({"user": "a"}))
                    .child("hello", SegmentSchema::new().state(json!({}))),
            )
            .segment("about", SegmentSchema::new().state(json!({})))
            .build()
            .unwrap();
        Router::new(schema, RouterConfig::default())
    }

    fn settle(router: &Router, op: RouteOperation) {
        let nav = op.commit().unwrap();
        router.flush();
        assert!(matches!(nav.outcome(), Some(Ok(()))));
    }

    // ── Transition pipeline ──────────────────────────────────────────

    #[test]
    fn test_reset_installs_transition_then_active() {
        let router = router();
        let nav = router.route(&["home"]).unwrap().reset().commit().unwrap();
        assert!(router.active_entry().is_none());
        assert_eq!(router.transition_entry().unwrap().path(), vec!["home".to_string()]);
        assert!(!nav.is_settled());

        router.flush();
        assert!(nav.is_settled());
        assert!(router.transition_entry().is_none());
        assert_eq!(router.active_entry().unwrap().path(), vec!["home".to_string()]);
        assert_eq!(router.active_operation(), Some(OperationKind::Reset));
        assert!(router.is_idle());
    }

    #[test]
    fn test_push_requires_history() {
        let router = router();
        let err = router.route(&["about"]).unwrap().push().unwrap_err();
        assert!(matches!(
            err,
            RouterError::Navigation(NavigationError::NoActiveEntry)
        ));
    }

    #[test]
    fn test_requests_queue_fifo_during_transition() {
        let router = router();
        let home = router.route(&["home"]).unwrap();
        let about = router.route(&["about"]).unwrap();
        let first = home.reset().commit().unwrap();
        let second = about.push().unwrap().commit().unwrap();
        let third = home.child("hello").unwrap().push().unwrap().commit().unwrap();
        assert_eq!(router.queued_navigations(), 2);
        assert!(!router.is_idle());

        router.flush();
        assert!(first.is_settled() && second.is_settled() && third.is_settled());
        let active = router.active_target().unwrap();
        assert_eq!(active.path(), ["home".to_string(), "hello".to_string()]);
        assert_eq!(active.back_depth(), 2);
        assert_eq!(active.previous().unwrap().path(), ["about".to_string()]);
    }

    #[test]
    fn test_queue_bound() {
        let schema = Schema::builder()
            .segment("home", SegmentSchema::new().state(json!({})))
            .build()
            .unwrap();
        let config = RouterConfig {
            max_pending_navigations: 1,
            ..RouterConfig::default()
        };
        let router = Router::new(schema, config);
        let home = router.route(&["home"]).unwrap();
        home.reset().commit().unwrap();
        home.reset().commit().unwrap();
        let err = home.reset().commit().unwrap_err();
        assert!(matches!(
            err,
            RouterError::Navigation(NavigationError::QueueFull { limit: 1 })
        ));
    }

    #[test]
    fn test_back_and_forward() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        assert!(!router.able_to_back());
        settle(&router, router.route(&["about"]).unwrap().push().unwrap());
        assert!(router.able_to_back());

        settle(&router, router.back().unwrap());
        assert_eq!(router.active_entry().unwrap().path(), vec!["home".to_string()]);
        assert!(router.able_to_forward());
        assert!(!router.able_to_back());
        assert!(matches!(
            router.back().unwrap_err(),
            RouterError::Navigation(NavigationError::NoPreviousEntry)
        ));

        settle(&router, router.forward().unwrap());
        assert_eq!(router.active_entry().unwrap().path(), vec!["about".to_string()]);
        assert_eq!(router.active_operation(), Some(OperationKind::Forward));
    }

    #[test]
    fn test_slot_observers_see_one_update_per_swap() {
        let router = router();
        let writes = Rc::new(Cell::new(0));
        let count = Rc::clone(&writes);
        let _sub = router.subscribe(move |slots| {
            assert!(slots.active().is_some() || slots.transition().is_some());
            count.set(count.get() + 1);
        });
        settle(&router, router.route(&["home"]).unwrap().reset());
        assert_eq!(writes.get(), 2);
    }

    // ── Switching ────────────────────────────────────────────────────

    #[test]
    fn test_switch_rejected_while_transition_in_flight() {
        let router = router();
        router.route(&["home"]).unwrap().reset().commit().unwrap();
        let err = router
            .route(&["about"])
            .unwrap()
            .reset()
            .switch(Some(json!({"progress": 0})))
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Navigation(NavigationError::TransitionInFlight)
        ));
    }

    #[test]
    fn test_switch_requires_state_or_default() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        let err = router
            .route(&["about"])
            .unwrap()
            .push()
            .unwrap()
            .switch(None)
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Navigation(NavigationError::MissingSwitchingState)
        ));
    }

    #[test]
    fn test_switch_complete_and_stale_handle() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        let switching = router
            .route(&["about"])
            .unwrap()
            .push()
            .unwrap()
            .switch(Some(json!({"progress": 0})))
            .unwrap();
        assert_eq!(router.switching_state(), Some(json!({"progress": 0})));
        assert!(!router.is_idle());

        switching.update(json!({"progress": 1})).unwrap();
        assert_eq!(switching.state(), json!({"progress": 1}));
        switching.complete().unwrap();
        assert_eq!(router.active_entry().unwrap().path(), vec!["about".to_string()]);
        assert!(router.switching_entry().is_none());
        assert!(router.able_to_back());

        assert!(matches!(
            switching.abort().unwrap_err(),
            RouterError::Navigation(NavigationError::StaleSwitch)
        ));
    }

    #[test]
    fn test_switch_completion_settles_state_within_slot_update() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        let mut part = wayline_core::StatePart::new();
        part.insert("user".into(), json!("b"));
        let switching = router
            .route(&["home", "hello"])
            .unwrap()
            .push()
            .unwrap()
            .with_state_part(part)
            .switch(Some(json!(0)))
            .unwrap();
        let switching_entry = router.switching_entry().unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = router.subscribe(move |slots| {
            let active = slots.active().map(|slot| slot.entry().state("user"));
            sink.borrow_mut().push(active);
        });

        switching.complete().unwrap();
        assert_eq!(*seen.borrow(), vec![Some(Some(json!("b")))]);
        assert_eq!(switching_entry.state("user"), Some(json!("b")));
    }

    #[test]
    fn test_switch_abort_keeps_active() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        let switching = router
            .route(&["about"])
            .unwrap()
            .reset()
            .switch(Some(json!(0)))
            .unwrap();
        let queued = router.route(&["home", "hello"]).unwrap().push().unwrap().commit().unwrap();
        assert_eq!(router.queued_navigations(), 1);

        switching.abort().unwrap();
        assert_eq!(router.active_entry().unwrap().path(), vec!["home".to_string()]);
        router.flush();
        assert!(queued.is_settled());
        assert_eq!(
            router.active_entry().unwrap().path(),
            vec!["home".to_string(), "hello".to_string()]
        );
    }

    // ── Listeners ────────────────────────────────────────────────────

    #[test]
    fn test_listener_events_in_order() {
        let router = router();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let id = router.add_listener(move |event| {
            sink.borrow_mut().push(event.name());
            Ok(())
        });
        router.add_listener(|_| anyhow::bail!("listener failure"));

        settle(&router, router.route(&["home"]).unwrap().reset());
        assert_eq!(
            *events.borrow(),
            vec!["transition_started", "transition_completed"]
        );
        assert!(router.remove_listener(id));
    }

    #[test]
    fn test_restore_requires_idle() {
        let router = router();
        settle(&router, router.route(&["home"]).unwrap().reset());
        let snapshot = router.snapshot().unwrap();
        router.route(&["about"]).unwrap().push().unwrap().commit().unwrap();
        assert!(matches!(
            router.restore(&snapshot).unwrap_err(),
            RouterError::Navigation(NavigationError::NotIdle)
        ));
        router.flush();
        settle_restore(&router, &snapshot);
        assert_eq!(router.active_entry().unwrap().path(), vec!["home".to_string()]);
    }

    fn settle_restore(router: &Router, snapshot: &Snapshot) {
        let nav = router.restore(snapshot).unwrap();
        router.flush();
        assert!(matches!(nav.outcome(), Some(Ok(()))));
    }
}
