//! # wayline-router — Hierarchical Navigation State Machine
//!
//! Routes form a tree described by a [`Schema`]. A location is a path
//! through that tree plus one state object per segment. The router keeps
//! the current location and its back/forward history, and moves between
//! locations through three observable slots.
//!
//! ## Modules
//!
//! - **Schema** (`schema.rs`): the segment tree, with static default
//!   states or derivation functions per segment.
//!
//! - **Targets** (`target.rs`): immutable history locations linked as a
//!   zipper, and the pure chain operations (`push`, `replace`, `back`,
//!   `forward`) over them.
//!
//! - **Entries** (`entry.rs`): a target installed in a slot, with
//!   entering/leaving blocker sets.
//!
//! - **Router** (`router.rs`): the active/transition/switching slots, the
//!   FIFO navigation queue, listeners and the installed plugin.
//!
//! - **Operations** (`operation.rs`): pending navigations built from route
//!   handles, committed as transitions or started as interactive switches.
//!
//! - **Route handles** (`route.rs`): a schema node bound to a router, with
//!   slot predicates and operation constructors.
//!
//! - **Views** (`view.rs`): per-route-set projections of the slots whose
//!   entries can hold a transition open until their activities finish.
//!
//! - **Snapshots** (`snapshot.rs`): a JSON form of the whole history chain
//!   that preserves shared state-object identity and re-derives derived
//!   states on restore.
//!
//! - **Plugins** (`plugin.rs`): the host adapter trait and an in-memory
//!   history adapter.
//!
//! ## Design
//!
//! Everything runs on one thread against a [`Runtime`]. Nothing happens in
//! the background: the host calls [`Router::flush`] (or
//! [`Runtime::flush`]) and deferred work runs until the router is quiescent.

pub mod config;
mod derivation;
pub mod entry;
pub mod event;
pub mod operation;
pub mod plugin;
pub mod route;
pub mod router;
pub mod schema;
pub mod snapshot;
pub mod target;
pub mod view;

// ─── Core re-exports ────────────────────────────────────────────────

pub use wayline_core::{
    EntryId, ListenerId, MergedState, NavigationError, Observable, RouterError, Runtime,
    SchemaError, SnapshotError, StateError, StateObject, StatePart, Subscription, ViewEntryKey,
};

// ─── Router re-exports ──────────────────────────────────────────────

pub use config::{ConfigError, RouterConfig};
pub use entry::RouteEntry;
pub use event::{Listener, RouterEvent};
pub use router::{Router, SlotEntry, Slots, SwitchingSlot, WeakRouter};

// ─── Navigation re-exports ──────────────────────────────────────────

pub use operation::{Navigation, NavigationOutcome, RouteOperation, Switching};
pub use route::RouteNode;
pub use target::{OperationKind, RouteTarget};

// ─── Schema re-exports ──────────────────────────────────────────────

pub use schema::{DeriveFn, Schema, SchemaBuilder, SchemaNodeId, SegmentSchema, StateSchema};

// ─── View re-exports ────────────────────────────────────────────────

pub use view::{
    Activity, ActivityKind, SwitchingRelation, SwitchingView, TransitionInterest, View,
    ViewEntry, ViewEntryRole, ViewMode,
};

// ─── Snapshot and plugin re-exports ─────────────────────────────────

pub use plugin::{HistoryRecord, MemoryHistory, RouteSegment, RouterPlugin};
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotState};
