//! # Router Plugins — External Adapters
//!
//! A plugin connects the router to something outside it, typically an
//! address bar. The router calls [`RouterPlugin::setup`] once on install
//! and asks [`RouterPlugin::route_ref`] whenever a caller wants an address
//! for a target.
//!
//! [`MemoryHistory`] is the in-process adapter shipped with the crate. It
//! records the address and serialized snapshot of every completed
//! navigation, which is what a browser history adapter would push.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use serde_json::{Map, Value};

use crate::event::RouterEvent;
use crate::router::Router;
use crate::target::OperationKind;

/// One path segment as handed to a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSegment {
    /// Segment name.
    pub name: String,
    /// The segment's own state object, not merged with its ancestors.
    pub state: Map<String, Value>,
}

/// Adapter between the router and its host.
pub trait RouterPlugin {
    /// Called once when the plugin is installed.
    fn setup(&self, router: &Router);

    /// Address for the given path, or `None` if the plugin has none.
    fn route_ref(&self, segments: &[RouteSegment]) -> Option<String>;
}

// ─── Memory history ──────────────────────────────────────────────────

/// A navigation recorded by [`MemoryHistory`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Operation that produced the active entry.
    pub operation: OperationKind,
    /// Address of the active entry, if the plugin produced one.
    pub route_ref: Option<String>,
    /// Snapshot JSON of the whole history chain.
    pub snapshot: String,
}

/// Records every completed navigation in memory.
///
/// Addresses are `/`-joined segment names followed by the leaf segment's
/// state as a query string, e.g. `/home/hello?user=b`. Clones share the
/// same record list.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    records: Rc<RefCell<Vec<HistoryRecord>>>,
}

impl MemoryHistory {
    /// An empty history with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded navigations, oldest first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.borrow().clone()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<HistoryRecord> {
        self.records.borrow().last().cloned()
    }

    /// Number of recorded navigations.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether no navigation has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    fn record(router: &Router) -> anyhow::Result<HistoryRecord> {
        let operation = router
            .active_operation()
            .context("completed navigation left no active entry")?;
        let target = router
            .active_entry()
            .context("completed navigation left no active entry")?
            .target();
        let snapshot = router
            .snapshot()
            .context("encoding history snapshot")?
            .to_json()
            .context("serializing history snapshot")?;
        Ok(HistoryRecord {
            operation,
            route_ref: router.route_ref(&target),
            snapshot,
        })
    }
}

impl RouterPlugin for MemoryHistory {
    fn setup(&self, router: &Router) {
        let weak = router.downgrade();
        let records = Rc::clone(&self.records);
        // The listener lives as long as the router.
        router.add_listener(move |event| {
            if !matches!(
                event,
                RouterEvent::TransitionCompleted { .. } | RouterEvent::SwitchCompleted { .. }
            ) {
                return Ok(());
            }
            let Some(router) = weak.upgrade() else {
                return Ok(());
            };
            let record = Self::record(&router)?;
            tracing::debug!(
                operation = %record.operation,
                route_ref = ?record.route_ref,
                "history record"
            );
            records.borrow_mut().push(record);
            Ok(())
        });
    }

    fn route_ref(&self, segments: &[RouteSegment]) -> Option<String> {
        let mut out = String::new();
        for segment in segments {
            out.push('/');
            out.push_str(&segment.name);
        }
        if out.is_empty() {
            out.push('/');
        }
        if let Some(leaf) = segments.last() {
            let query: Vec<String> = leaf
                .state
                .iter()
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{key}={s}"),
                    other => format!("{key}={other}"),
                })
                .collect();
            if !query.is_empty() {
                out.push('?');
                out.push_str(&query.join("&"));
            }
        }
        Some(out)
    }
}
