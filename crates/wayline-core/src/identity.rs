//! # Identifiers — Router-Scoped Newtypes
//!
//! Route entries, view entries and listeners are identified by monotonic
//! counters owned by one router instance. There is no process-wide counter,
//! so independent routers (for example in parallel tests) never share ids.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a route entry installed in a router slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

/// Identifier of a view entry. Doubles as its blocker identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewEntryKey(u64);

/// Identifier of a router listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

macro_rules! impl_id {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            /// The raw counter value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

impl_id!(EntryId, "entry");
impl_id!(ViewEntryKey, "view-entry");
impl_id!(ListenerId, "listener");

/// Monotonic id allocator owned by a router.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: Cell<u64>,
}

impl IdAllocator {
    /// Create an allocator starting at 1.
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    fn bump(&self) -> u64 {
        let id = self.next.get().max(1);
        self.next.set(id + 1);
        id
    }

    /// Allocate a route entry id.
    pub fn entry_id(&self) -> EntryId {
        EntryId(self.bump())
    }

    /// Allocate a view entry key.
    pub fn view_entry_key(&self) -> ViewEntryKey {
        ViewEntryKey(self.bump())
    }

    /// Allocate a listener id.
    pub fn listener_id(&self) -> ListenerId {
        ListenerId(self.bump())
    }
}
