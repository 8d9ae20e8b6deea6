//! # Reactive Runtime — Push-Based Cells and a Cooperative Scheduler
//!
//! The router only needs notifications at a small, fixed set of mutation
//! points: slot swaps, blocker-set updates and switching-state updates.
//! This module provides exactly that:
//!
//! - [`Observable`]: a cell with get/set, a version counter and
//!   subscriptions.
//! - [`Runtime::batch`]: writes inside a batch settle as one notification
//!   per subscriber, delivered when the outermost batch ends.
//! - [`Runtime::defer`]: FIFO task queue (the "microtask" queue).
//! - [`Runtime::wait_until`]: level-triggered wait. The condition is first
//!   checked on the *next* tick and then once per tick until it holds.
//! - [`Runtime::flush`]: the host's scheduling checkpoint. Drains tasks,
//!   advances the tick, evaluates watchers, and repeats until nothing is
//!   ready.
//!
//! Everything is single-threaded (`Rc`/`RefCell`).
//!
//! ```text
//! flush():  ┌─▶ run tasks until empty
//!           │   tick += 1
//!           │   evaluate armed watchers ──ready──▶ enqueue continuations ─┐
//!           └─────────────────────────────────────────────────────────────┘
//!               (stop when no watcher became ready)
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

type Task = Box<dyn FnOnce()>;
type Notify = Rc<dyn Fn()>;

struct Watcher {
    armed_at: u64,
    condition: Box<dyn Fn() -> bool>,
    then: Task,
}

struct RuntimeInner {
    tasks: RefCell<VecDeque<Task>>,
    watchers: RefCell<Vec<Watcher>>,
    batch_depth: Cell<usize>,
    pending: RefCell<Vec<(u64, Notify)>>,
    tick: Cell<u64>,
    next_subscriber: Cell<u64>,
    flushing: Cell<bool>,
}

impl RuntimeInner {
    fn next_subscriber_id(&self) -> u64 {
        let id = self.next_subscriber.get();
        self.next_subscriber.set(id + 1);
        id
    }

    fn notify(&self, subscribers: Vec<(u64, Notify)>) {
        if self.batch_depth.get() > 0 {
            let mut pending = self.pending.borrow_mut();
            for (id, notify) in subscribers {
                if !pending.iter().any(|(queued, _)| *queued == id) {
                    pending.push((id, notify));
                }
            }
        } else {
            for (_, notify) in subscribers {
                notify();
            }
        }
    }

    fn deliver_pending(&self) {
        loop {
            let pending = std::mem::take(&mut *self.pending.borrow_mut());
            if pending.is_empty() {
                break;
            }
            for (_, notify) in pending {
                notify();
            }
        }
    }
}

// ─── Runtime ─────────────────────────────────────────────────────────

/// Cooperative scheduler and notification hub.
///
/// Cloning shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tick", &self.inner.tick.get())
            .field("tasks", &self.inner.tasks.borrow().len())
            .field("watchers", &self.inner.watchers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Create an empty runtime at tick 0.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                tasks: RefCell::new(VecDeque::new()),
                watchers: RefCell::new(Vec::new()),
                batch_depth: Cell::new(0),
                pending: RefCell::new(Vec::new()),
                tick: Cell::new(0),
                next_subscriber: Cell::new(0),
                flushing: Cell::new(false),
            }),
        }
    }

    /// Current tick.
    pub fn tick(&self) -> u64 {
        self.inner.tick.get()
    }

    /// Create an observable cell bound to this runtime.
    pub fn observable<T: 'static>(&self, value: T) -> Observable<T> {
        Observable {
            inner: Rc::new(ObservableInner {
                runtime: Rc::downgrade(&self.inner),
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Run `f` with notifications held back until the outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = self.inner.batch_depth.get();
        self.inner.batch_depth.set(depth + 1);
        let result = f();
        self.inner.batch_depth.set(depth);
        if depth == 0 {
            self.inner.deliver_pending();
        }
        result
    }

    /// Queue a task for the next [`Runtime::flush`].
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.tasks.borrow_mut().push_back(Box::new(task));
    }

    /// Run `then` once `condition` holds.
    ///
    /// The condition is evaluated no earlier than the next tick, and then
    /// once per tick. It is level-triggered: a condition that is already
    /// true resolves on the next tick.
    pub fn wait_until(
        &self,
        condition: impl Fn() -> bool + 'static,
        then: impl FnOnce() + 'static,
    ) {
        self.inner.watchers.borrow_mut().push(Watcher {
            armed_at: self.inner.tick.get(),
            condition: Box::new(condition),
            then: Box::new(then),
        });
    }

    /// Number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Number of watchers still waiting.
    pub fn pending_watchers(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Drive the scheduler until no task is queued and no watcher is ready.
    ///
    /// Returns the number of tasks run (watcher continuations included).
    /// A nested call from inside a task is a no-op returning 0.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }
        let mut ran = 0;
        loop {
            loop {
                let task = self.inner.tasks.borrow_mut().pop_front();
                match task {
                    Some(task) => {
                        task();
                        ran += 1;
                    }
                    None => break,
                }
            }

            let tick = self.inner.tick.get() + 1;
            self.inner.tick.set(tick);

            let watchers = std::mem::take(&mut *self.inner.watchers.borrow_mut());
            let mut waiting = Vec::with_capacity(watchers.len());
            let mut ready = Vec::new();
            for watcher in watchers {
                if watcher.armed_at < tick && (watcher.condition)() {
                    ready.push(watcher.then);
                } else {
                    waiting.push(watcher);
                }
            }
            {
                let mut slot = self.inner.watchers.borrow_mut();
                let added = std::mem::take(&mut *slot);
                waiting.extend(added);
                *slot = waiting;
            }

            if ready.is_empty() {
                break;
            }
            self.inner.tasks.borrow_mut().extend(ready);
        }
        self.inner.flushing.set(false);
        ran
    }
}

// ─── Observable ──────────────────────────────────────────────────────

struct ObservableInner<T> {
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<(u64, Notify)>>,
}

/// An observable cell.
///
/// Cloning shares the cell. Subscribers receive a clone of the value
/// after every write (coalesced inside a batch).
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: 'static> Observable<T> {
    /// Read through a borrow.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.changed();
    }

    /// Mutate in place and notify.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.changed();
        result
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Whether both handles share one cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn changed(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        let subscribers = self.inner.subscribers.borrow().clone();
        if subscribers.is_empty() {
            return;
        }
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.notify(subscribers),
            None => {
                for (_, notify) in subscribers {
                    notify();
                }
            }
        }
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Clone the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Subscribe to writes. The subscription ends when the returned handle
    /// is dropped.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let id = match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.next_subscriber_id(),
            None => self.inner.subscribers.borrow().len() as u64,
        };
        let weak = Rc::downgrade(&self.inner);
        let notify: Notify = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let value = inner.value.borrow().clone();
                f(&value);
            }
        });
        self.inner.subscribers.borrow_mut().push((id, notify));

        let weak = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }
}

impl<T: PartialEq + 'static> Observable<T> {
    /// Write and notify only when the value differs. Returns whether it did.
    pub fn set_if_changed(&self, value: T) -> bool {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }
}

// ─── Subscription ────────────────────────────────────────────────────

/// RAII handle for an [`Observable`] subscription.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Keep the subscription alive for the lifetime of the observable.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
