//! # Router Events
//!
//! Lifecycle notifications delivered to registered listeners after the
//! router state has already changed. A listener that fails is logged and
//! skipped; it cannot roll anything back.

use std::fmt;
use std::rc::Rc;

use wayline_core::{EntryId, ListenerId};

use crate::target::OperationKind;

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// An entry was installed in the transition slot.
    TransitionStarted {
        /// Operation being performed.
        operation: OperationKind,
        /// The incoming entry.
        entry: EntryId,
        /// Path of the incoming entry.
        path: Vec<String>,
    },
    /// The transition entry became active.
    TransitionCompleted {
        /// Operation performed.
        operation: OperationKind,
        /// The new active entry.
        entry: EntryId,
        /// Path of the new active entry.
        path: Vec<String>,
    },
    /// An entry was installed in the switching slot.
    SwitchStarted {
        /// Operation being performed.
        operation: OperationKind,
        /// The switching entry.
        entry: EntryId,
        /// Path of the switching entry.
        path: Vec<String>,
    },
    /// The switching entry became active.
    SwitchCompleted {
        /// Operation performed.
        operation: OperationKind,
        /// The new active entry.
        entry: EntryId,
        /// Path of the new active entry.
        path: Vec<String>,
    },
    /// The switching slot was cleared without promotion.
    SwitchAborted {
        /// The discarded entry.
        entry: EntryId,
    },
    /// A request arrived while the router was busy and was queued.
    NavigationQueued {
        /// Operation requested.
        operation: OperationKind,
        /// Queue length after the request was added.
        queued: usize,
    },
}

impl RouterEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransitionStarted { .. } => "transition_started",
            Self::TransitionCompleted { .. } => "transition_completed",
            Self::SwitchStarted { .. } => "switch_started",
            Self::SwitchCompleted { .. } => "switch_completed",
            Self::SwitchAborted { .. } => "switch_aborted",
            Self::NavigationQueued { .. } => "navigation_queued",
        }
    }
}

impl fmt::Display for RouterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A router listener.
pub type Listener = Rc<dyn Fn(&RouterEvent) -> anyhow::Result<()>>;

/// Registered listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Vec<(ListenerId, Listener)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, id: ListenerId, listener: Listener) {
        self.listeners.push((id, listener));
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Snapshot of the listeners so that delivery can run without a borrow.
    pub(crate) fn snapshot(&self) -> Vec<(ListenerId, Listener)> {
        self.listeners.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// Deliver `event` to every listener, logging failures.
pub(crate) fn dispatch(listeners: &[(ListenerId, Listener)], event: &RouterEvent) {
    for (id, listener) in listeners {
        if let Err(err) = listener(event) {
            tracing::error!(
                listener = %id,
                event = event.name(),
                error = %err,
                "router listener failed"
            );
        }
    }
}
