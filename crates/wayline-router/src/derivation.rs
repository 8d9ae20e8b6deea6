//! Derivation records: which `(function, input)` pair produced a derived
//! state object, keyed by the object's identity.
//!
//! Snapshot encoding consults the table so that derived states are stored
//! as their input and re-derived on restore. A derived layer that a state
//! part has since replaced is recorded as edited: it no longer matches its
//! derivation and is stored by value. Records hold the object weakly; dead
//! records are pruned as the table grows.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use wayline_core::{StateObject, WeakStateObject};

use crate::schema::DeriveFn;

const PRUNE_THRESHOLD: usize = 256;

/// The function and input that produced a derived state object.
#[derive(Clone)]
pub(crate) struct Derivation {
    pub(crate) deriver: DeriveFn,
    pub(crate) input: Option<Value>,
}

impl Derivation {
    /// Whether this record was produced by `deriver`.
    pub(crate) fn produced_by(&self, deriver: &DeriveFn) -> bool {
        Rc::ptr_eq(&self.deriver, deriver)
    }
}

enum Provenance {
    Derived(Derivation),
    Edited,
}

#[derive(Default)]
pub(crate) struct DerivationTable {
    records: HashMap<usize, (WeakStateObject, Provenance)>,
    prune_at: usize,
}

impl DerivationTable {
    fn insert(&mut self, object: &StateObject, provenance: Provenance) {
        if self.records.len() >= self.prune_at.max(PRUNE_THRESHOLD) {
            self.prune();
            self.prune_at = self.records.len() * 2;
        }
        self.records
            .insert(object.identity(), (object.downgrade(), provenance));
    }

    fn provenance(&self, object: &StateObject) -> Option<&Provenance> {
        self.records
            .get(&object.identity())
            .filter(|(weak, _)| weak.refers_to(object))
            .map(|(_, provenance)| provenance)
    }

    pub(crate) fn record(&mut self, object: &StateObject, deriver: DeriveFn, input: Option<Value>) {
        self.insert(object, Provenance::Derived(Derivation { deriver, input }));
    }

    /// Mark `object` as a value-backed stand-in for a derived layer.
    pub(crate) fn record_edited(&mut self, object: &StateObject) {
        self.insert(object, Provenance::Edited);
    }

    pub(crate) fn lookup(&self, object: &StateObject) -> Option<&Derivation> {
        match self.provenance(object)? {
            Provenance::Derived(derivation) => Some(derivation),
            Provenance::Edited => None,
        }
    }

    pub(crate) fn is_edited(&self, object: &StateObject) -> bool {
        matches!(self.provenance(object), Some(Provenance::Edited))
    }

    /// Record every layer of `after` that replaced a derived or edited layer
    /// of `before` as edited.
    pub(crate) fn carry_edits(&mut self, before: &[StateObject], after: &[StateObject]) {
        for (old, new) in before.iter().zip(after) {
            if !old.ptr_eq(new) && self.provenance(old).is_some() {
                self.record_edited(new);
            }
        }
    }

    pub(crate) fn prune(&mut self) {
        self.records.retain(|_, (weak, _)| weak.upgrade().is_some());
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
