//! # Route Entries
//!
//! A [`RouteEntry`] is the installed form of a [`RouteTarget`]. It lives in
//! one of the router slots, exposes the layered merged state, and carries
//! two blocker sets that gate when a transition may complete:
//!
//! - **entering** blockers hold back the incoming transition entry,
//! - **leaving** blockers hold back the outgoing active entry.
//!
//! Blockers are view-entry keys. The sets are observable so that hosts can
//! display "waiting on ..." without polling.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use wayline_core::{EntryId, MergedState, Observable, Runtime, ViewEntryKey};

use crate::derivation::DerivationTable;
use crate::target::RouteTarget;

/// An installed, lifecycle-tracked route target.
pub struct RouteEntry {
    id: EntryId,
    target: RefCell<Rc<RouteTarget>>,
    entering_blockers: Observable<BTreeSet<ViewEntryKey>>,
    leaving_blockers: Observable<BTreeSet<ViewEntryKey>>,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("id", &self.id)
            .field("path", &self.target.borrow().path())
            .field("entering_blockers", &self.entering_blockers.get())
            .field("leaving_blockers", &self.leaving_blockers.get())
            .finish()
    }
}

impl RouteEntry {
    pub(crate) fn new(runtime: &Runtime, id: EntryId, target: RouteTarget) -> Rc<Self> {
        Rc::new(Self {
            id,
            target: RefCell::new(Rc::new(target)),
            entering_blockers: runtime.observable(BTreeSet::new()),
            leaving_blockers: runtime.observable(BTreeSet::new()),
        })
    }

    /// Router-scoped identifier.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The target this entry was installed with.
    pub fn target(&self) -> Rc<RouteTarget> {
        Rc::clone(&self.target.borrow())
    }

    /// Segment names from the root.
    pub fn path(&self) -> Vec<String> {
        self.target.borrow().path().to_vec()
    }

    /// Layered view over all segment states; writes hit the owning layer.
    pub fn merged_state(&self) -> MergedState {
        self.target.borrow().merged_state()
    }

    /// Read one merged key.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.merged_state().get(key)
    }

    /// Write one merged key into its owning layer.
    pub fn set_state(&self, key: &str, value: Value) -> Option<usize> {
        self.merged_state().set(key, value)
    }

    /// Fold the pending state part into the target.
    pub(crate) fn settle_pending_state(&self, derivations: &mut DerivationTable) {
        let settled = self.target.borrow().settled(derivations);
        *self.target.borrow_mut() = Rc::new(settled);
    }

    // ─── Blockers ────────────────────────────────────────────────────

    /// Whether any view entry holds back this entry's entrance.
    pub fn is_entering_blocked(&self) -> bool {
        self.entering_blockers.with(|set| !set.is_empty())
    }

    /// Whether any view entry holds back this entry's exit.
    pub fn is_leaving_blocked(&self) -> bool {
        self.leaving_blockers.with(|set| !set.is_empty())
    }

    /// Observable entering blocker set.
    pub fn entering_blockers(&self) -> &Observable<BTreeSet<ViewEntryKey>> {
        &self.entering_blockers
    }

    /// Observable leaving blocker set.
    pub fn leaving_blockers(&self) -> &Observable<BTreeSet<ViewEntryKey>> {
        &self.leaving_blockers
    }

    pub(crate) fn block_entering(&self, key: ViewEntryKey) {
        insert_blocker(&self.entering_blockers, key);
    }

    pub(crate) fn unblock_entering(&self, key: ViewEntryKey) {
        remove_blocker(&self.entering_blockers, key);
    }

    pub(crate) fn block_leaving(&self, key: ViewEntryKey) {
        insert_blocker(&self.leaving_blockers, key);
    }

    pub(crate) fn unblock_leaving(&self, key: ViewEntryKey) {
        remove_blocker(&self.leaving_blockers, key);
    }
}

fn insert_blocker(set: &Observable<BTreeSet<ViewEntryKey>>, key: ViewEntryKey) {
    if !set.with(|s| s.contains(&key)) {
        set.update(|s| s.insert(key));
    }
}

fn remove_blocker(set: &Observable<BTreeSet<ViewEntryKey>>, key: ViewEntryKey) {
    if set.with(|s| s.contains(&key)) {
        set.update(|s| s.remove(&key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wayline_core::{IdAllocator, StateObject, StatePart};

    fn entry(rt: &Runtime, ids: &IdAllocator) -> Rc<RouteEntry> {
        let states = vec![
            StateObject::from_value(&[], json!({"user": "a", "theme": "dark"})).unwrap(),
            StateObject::from_value(&[], json!({"user": "b"})).unwrap(),
        ];
        let target =
            RouteTarget::from_parts(vec!["home".into(), "hello".into()], states, None, None);
        RouteEntry::new(rt, ids.entry_id(), target)
    }

    #[test]
    fn test_merged_state_descendant_wins() {
        let rt = Runtime::new();
        let ids = IdAllocator::new();
        let e = entry(&rt, &ids);
        assert_eq!(e.state("user"), Some(json!("b")));
        assert_eq!(e.state("theme"), Some(json!("dark")));
        assert_eq!(e.path(), vec!["home".to_string(), "hello".to_string()]);
    }

    #[test]
    fn test_set_state_writes_owning_layer() {
        let rt = Runtime::new();
        let ids = IdAllocator::new();
        let e = entry(&rt, &ids);
        assert_eq!(e.set_state("theme", json!("light")), Some(0));
        assert_eq!(e.set_state("fresh", json!(1)), Some(1));
        let target = e.target();
        assert_eq!(target.states()[0].get("theme"), Some(json!("light")));
        assert_eq!(target.states()[1].get("fresh"), Some(json!(1)));
    }

    #[test]
    fn test_blockers_notify_only_on_change() {
        let rt = Runtime::new();
        let ids = IdAllocator::new();
        let e = entry(&rt, &ids);
        let key = ids.view_entry_key();

        e.block_entering(key);
        e.block_entering(key);
        assert!(e.is_entering_blocked());
        assert_eq!(e.entering_blockers().version(), 1);

        e.unblock_entering(key);
        e.unblock_entering(key);
        assert!(!e.is_entering_blocked());
        assert_eq!(e.entering_blockers().version(), 2);

        e.block_leaving(key);
        assert!(e.is_leaving_blocked());
        e.unblock_leaving(key);
        assert!(!e.is_leaving_blocked());
    }

    #[test]
    fn test_settle_pending_state() {
        let rt = Runtime::new();
        let ids = IdAllocator::new();
        let mut part = StatePart::new();
        part.insert("theme".into(), json!("light"));
        let states = vec![StateObject::from_value(&[], json!({"theme": "dark"})).unwrap()];
        let original = states[0].clone();
        let target = RouteTarget::from_parts(vec!["home".into()], states, None, None)
            .with_pending_state_part(Some(part));
        let e = RouteEntry::new(&rt, ids.entry_id(), target);

        e.settle_pending_state(&mut DerivationTable::default());
        assert_eq!(e.state("theme"), Some(json!("light")));
        assert!(e.target().pending_state_part().is_none());
        assert_eq!(original.get("theme"), Some(json!("dark")));
    }
}
