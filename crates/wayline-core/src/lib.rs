//! # wayline-core — Foundational Types for Wayline
//!
//! This crate is the leaf of the Wayline workspace. It defines the pieces
//! the navigation state machine is built from, none of which know about
//! routes or schemas:
//!
//! 1. **Error hierarchy** ([`error`]). One `thiserror` enum per failure
//!    class, gathered under [`RouterError`].
//!
//! 2. **Route state** ([`state`]). [`StateObject`] is an identity-bearing
//!    JSON object; [`MergedState`] is the layered, most-specific-wins view
//!    over the states of a whole path.
//!
//! 3. **Reactive runtime** ([`reactive`]). Observable cells, batched
//!    notification, a FIFO task queue and level-triggered waits, driven by
//!    an explicit `flush()` checkpoint.
//!
//! 4. **Identifiers** ([`identity`]). Router-owned monotonic ids.
//!
//! ## Crate Policy
//!
//! - Single-threaded by construction (`Rc`/`RefCell`); nothing is `Send`.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod reactive;
pub mod state;

pub use error::{NavigationError, RouterError, SchemaError, SnapshotError, StateError};
pub use identity::{EntryId, IdAllocator, ListenerId, ViewEntryKey};
pub use reactive::{Observable, Runtime, Subscription};
pub use state::{apply_state_part, MergedState, StateObject, StatePart, WeakStateObject};
