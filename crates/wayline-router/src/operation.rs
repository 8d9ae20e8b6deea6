//! # Route Operations
//!
//! A [`RouteOperation`] is a deferred navigation: an operation kind, a target
//! builder and an optional state part. Nothing happens until it is
//! committed (plain transition) or switched (caller-driven transition).
//!
//! The builder runs against the router state at the moment the request
//! starts, which for a queued request is after every earlier request has
//! settled. Preconditions are therefore checked twice: when the operation
//! is created and again when the builder runs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use serde_json::Value;

use wayline_core::{EntryId, NavigationError, Observable, RouterError, StatePart, Subscription};

use crate::route::RouteMatcher;
use crate::router::{Router, WeakRouter};
use crate::target::{self, OperationKind, RouteTarget};

/// Builds a linked target against the current router state.
pub(crate) type TargetBuilder = Rc<dyn Fn(&Router) -> Result<RouteTarget, RouterError>>;

// ─── NavigationRequest ───────────────────────────────────────────────

/// Operation kind, builder and state part of one navigation.
#[derive(Clone)]
pub(crate) struct NavigationRequest {
    operation: OperationKind,
    builder: TargetBuilder,
    state_part: Option<StatePart>,
}

fn require_active(router: &Router) -> Result<Rc<RouteTarget>, RouterError> {
    router
        .active_target()
        .ok_or_else(|| NavigationError::NoActiveEntry.into())
}

fn builder(
    f: impl Fn(&Router) -> Result<RouteTarget, RouterError> + 'static,
) -> TargetBuilder {
    Rc::new(f)
}

fn fresh_target(
    router: &Router,
    path: &[String],
    overrides: &BTreeMap<usize, Value>,
    active: Option<&RouteTarget>,
) -> Result<RouteTarget, RouterError> {
    let mut derivations = router.derivations().borrow_mut();
    target::build_target(router.schema(), &mut derivations, path, overrides, active)
}

impl NavigationRequest {
    fn new(operation: OperationKind, builder: TargetBuilder) -> Self {
        Self {
            operation,
            builder,
            state_part: None,
        }
    }

    pub(crate) fn reset(path: Vec<String>, overrides: BTreeMap<usize, Value>) -> Self {
        Self::new(
            OperationKind::Reset,
            builder(move |router| {
                let active = router.active_target();
                fresh_target(router, &path, &overrides, active.as_deref())
            }),
        )
    }

    pub(crate) fn push(path: Vec<String>, overrides: BTreeMap<usize, Value>) -> Self {
        Self::new(
            OperationKind::Push,
            builder(move |router| {
                let active = require_active(router)?;
                let fresh = fresh_target(router, &path, &overrides, Some(&active))?;
                Ok(target::pushed(&active, fresh))
            }),
        )
    }

    pub(crate) fn replace(path: Vec<String>, overrides: BTreeMap<usize, Value>) -> Self {
        Self::new(
            OperationKind::Replace,
            builder(move |router| {
                let active = require_active(router)?;
                let fresh = fresh_target(router, &path, &overrides, Some(&active))?;
                Ok(target::replaced(&active, fresh))
            }),
        )
    }

    pub(crate) fn back() -> Self {
        Self::new(
            OperationKind::Back,
            builder(|router| {
                let active = require_active(router)?;
                Ok(target::stepped_back(&active)?)
            }),
        )
    }

    pub(crate) fn forward() -> Self {
        Self::new(
            OperationKind::Forward,
            builder(|router| {
                let active = require_active(router)?;
                Ok(target::stepped_forward(&active)?)
            }),
        )
    }

    pub(crate) fn back_to(matcher: RouteMatcher) -> Self {
        Self::new(
            OperationKind::Back,
            builder(move |router| {
                let active = require_active(router)?;
                target::walked_back(&active, |path| matcher.matches(path))
                    .ok_or_else(|| NavigationError::NoPreviousEntry.into())
            }),
        )
    }

    pub(crate) fn forward_to(matcher: RouteMatcher) -> Self {
        Self::new(
            OperationKind::Forward,
            builder(move |router| {
                let active = require_active(router)?;
                target::walked_forward(&active, |path| matcher.matches(path))
                    .ok_or_else(|| NavigationError::NoNextEntry.into())
            }),
        )
    }

    /// Install an already decoded target.
    pub(crate) fn restore(operation: OperationKind, decoded: RouteTarget) -> Self {
        Self::new(operation, builder(move |_| Ok(decoded.clone())))
    }

    pub(crate) fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Build and merge the state part into the result.
    pub(crate) fn build_merged(&self, router: &Router) -> Result<RouteTarget, RouterError> {
        let target = (self.builder)(router)?;
        Ok(match &self.state_part {
            Some(part) => target.with_state_part(part, &mut router.derivations().borrow_mut()),
            None => target,
        })
    }

    /// Build and keep the state part pending until a switch completes.
    pub(crate) fn build_pending(&self, router: &Router) -> Result<RouteTarget, RouterError> {
        let target = (self.builder)(router)?;
        Ok(target.with_pending_state_part(self.state_part.clone()))
    }
}

// ─── RouteOperation ──────────────────────────────────────────────────

/// A navigation that has not been applied yet.
#[must_use = "a route operation does nothing until committed or switched"]
pub struct RouteOperation {
    router: Router,
    request: NavigationRequest,
}

impl fmt::Debug for RouteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOperation")
            .field("operation", &self.request.operation)
            .field("state_part", &self.request.state_part)
            .finish_non_exhaustive()
    }
}

impl RouteOperation {
    pub(crate) fn new(router: Router, request: NavigationRequest) -> Self {
        Self { router, request }
    }

    /// The operation kind.
    pub fn kind(&self) -> OperationKind {
        self.request.operation
    }

    /// Attach a state delta. Repeated calls accumulate; later keys win.
    pub fn with_state_part(mut self, part: StatePart) -> Self {
        match &mut self.request.state_part {
            Some(existing) => existing.extend(part),
            None => self.request.state_part = Some(part),
        }
        self
    }

    /// Build the target this operation would install, without installing it.
    pub fn preview(&self) -> Result<RouteTarget, RouterError> {
        self.request.build_merged(&self.router)
    }

    /// Address fragment of the previewed target, as reported by the plugin.
    pub fn route_ref(&self) -> Result<Option<String>, RouterError> {
        let target = self.preview()?;
        Ok(self.router.route_ref(&target))
    }

    /// Apply through the transition pipeline.
    pub fn commit(self) -> Result<Navigation, RouterError> {
        self.router.submit(self.request)
    }

    /// Start a caller-driven switch seeded with `state` (or the configured
    /// default).
    pub fn switch(self, state: Option<Value>) -> Result<Switching, RouterError> {
        self.router.begin_switch(self.request, state)
    }
}

// ─── Navigation ──────────────────────────────────────────────────────

/// Outcome of a committed navigation.
pub type NavigationOutcome = Result<(), Rc<RouterError>>;

#[derive(Default)]
struct NavigationState {
    outcome: Option<NavigationOutcome>,
    wakers: Vec<Waker>,
}

/// Completion handle of a committed navigation.
///
/// Settles when the transition completes, or with the builder error when a
/// queued request fails to start. Also usable as a `Future`.
#[derive(Clone, Default)]
pub struct Navigation {
    inner: Rc<RefCell<NavigationState>>,
}

impl fmt::Debug for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigation")
            .field("outcome", &self.inner.borrow().outcome)
            .finish()
    }
}

impl Navigation {
    pub(crate) fn pending() -> Self {
        Self::default()
    }

    pub(crate) fn resolve(&self, outcome: NavigationOutcome) {
        let wakers = {
            let mut state = self.inner.borrow_mut();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether the navigation has settled.
    pub fn is_settled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    /// The outcome, once settled.
    pub fn outcome(&self) -> Option<NavigationOutcome> {
        self.inner.borrow().outcome.clone()
    }
}

impl Future for Navigation {
    type Output = NavigationOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.borrow_mut();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

// ─── Switching ───────────────────────────────────────────────────────

/// Control handle of an in-flight switch.
///
/// The handle does not keep the router alive. Once the switch has been
/// completed or aborted every method fails with `StaleSwitch`.
pub struct Switching {
    router: WeakRouter,
    entry: EntryId,
    state: Observable<Value>,
}

impl fmt::Debug for Switching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switching")
            .field("entry", &self.entry)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Switching {
    pub(crate) fn new(router: WeakRouter, entry: EntryId, state: Observable<Value>) -> Self {
        Self {
            router,
            entry,
            state,
        }
    }

    fn router(&self) -> Result<Router, RouterError> {
        self.router
            .upgrade()
            .ok_or_else(|| NavigationError::RouterDropped.into())
    }

    /// Id of the switching entry.
    pub fn entry_id(&self) -> EntryId {
        self.entry
    }

    /// Current switching state.
    pub fn state(&self) -> Value {
        self.state.get()
    }

    /// Observe switching state changes.
    pub fn subscribe(&self, f: impl Fn(&Value) + 'static) -> Subscription {
        self.state.subscribe(f)
    }

    /// Publish a new switching state. Equal values are not re-published.
    pub fn update(&self, value: Value) -> Result<(), RouterError> {
        self.router()?.update_switch(self.entry, value)
    }

    /// Fold the pending state part in and promote the entry to active.
    pub fn complete(&self) -> Result<(), RouterError> {
        self.router()?.complete_switch(self.entry)
    }

    /// Clear the switching slot without promoting.
    pub fn abort(&self) -> Result<(), RouterError> {
        self.router()?.abort_switch(self.entry)
    }
}
