//! # Listener and Plugin Scenarios
//!
//! - A failing listener is logged through `tracing` and never changes the
//!   router's state or stops delivery to other listeners.
//! - `MemoryHistory` records an address and a restorable snapshot for each
//!   completed navigation.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use serde_json::json;
use wayline_router::{
    MemoryHistory, OperationKind, RouteOperation, Router, RouterConfig, RouterEvent, Schema,
    SegmentSchema, Snapshot,
};

fn router() -> Router {
    let schema = Schema::builder()
        .segment(
            "home",
            SegmentSchema::new()
                .state(json!({"user": "a"}))
                .child("hello", SegmentSchema::new().state(json!({"lang": "en"}))),
        )
        .segment("about", SegmentSchema::new().state(json!({})))
        .build()
        .unwrap();
    Router::new(schema, RouterConfig::default())
}

fn settle(router: &Router, op: RouteOperation) {
    let nav = op.commit().unwrap();
    router.flush();
    assert!(matches!(nav.outcome(), Some(Ok(()))), "navigation failed");
}

/// Log sink shared with a `tracing-subscriber` fmt layer.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =========================================================================
// Listeners
// =========================================================================

#[test]
fn failing_listener_is_logged_and_isolated() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let router = router();
    let seen = Rc::new(RefCell::new(Vec::new()));
    tracing::subscriber::with_default(subscriber, || {
        router.add_listener(|event| {
            if matches!(event, RouterEvent::TransitionCompleted { .. }) {
                anyhow::bail!("listener exploded");
            }
            Ok(())
        });
        let sink = Rc::clone(&seen);
        router.add_listener(move |event| {
            sink.borrow_mut().push(event.name());
            Ok(())
        });
        settle(&router, router.route(&["home"]).unwrap().reset());
    });

    assert_eq!(
        *seen.borrow(),
        vec!["transition_started", "transition_completed"]
    );
    assert!(router.route(&["home"]).unwrap().is_active());

    let logs = captured.text();
    assert!(logs.contains("router listener failed"), "logs: {logs}");
    assert!(logs.contains("listener exploded"), "logs: {logs}");
    assert!(logs.contains("transition_completed"), "logs: {logs}");
    assert!(logs.contains("transition completed"), "logs: {logs}");
}

#[test]
fn removed_listener_stops_receiving() {
    let router = router();
    let count = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&count);
    let id = router.add_listener(move |_| {
        *sink.borrow_mut() += 1;
        Ok(())
    });
    settle(&router, router.route(&["home"]).unwrap().reset());
    assert_eq!(*count.borrow(), 2);

    assert!(router.remove_listener(id));
    assert!(!router.remove_listener(id));
    settle(&router, router.route(&["about"]).unwrap().push().unwrap());
    assert_eq!(*count.borrow(), 2);
}

// =========================================================================
// Memory history
// =========================================================================

#[test]
fn memory_history_records_each_completed_navigation() {
    let router = router();
    let history = MemoryHistory::new();
    router.install(Rc::new(history.clone()));

    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());
    settle(&router, home.child("hello").unwrap().push().unwrap());
    settle(&router, router.back().unwrap());

    let records = history.records();
    let refs: Vec<_> = records
        .iter()
        .map(|r| r.route_ref.clone().unwrap_or_default())
        .collect();
    assert_eq!(refs, vec!["/home?user=a", "/home/hello?lang=en", "/home?user=a"]);
    let ops: Vec<_> = records.iter().map(|r| r.operation).collect();
    assert_eq!(
        ops,
        vec![OperationKind::Reset, OperationKind::Push, OperationKind::Back]
    );
}

#[test]
fn memory_history_snapshot_restores_elsewhere() {
    let router = router();
    let history = MemoryHistory::new();
    router.install(Rc::new(history.clone()));
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());
    settle(&router, home.child("hello").unwrap().push().unwrap());

    let record = history.last().unwrap();
    let copy = self::router();
    let snapshot = Snapshot::from_json(&record.snapshot).unwrap();
    let nav = copy.restore(&snapshot).unwrap();
    copy.flush();
    assert!(nav.is_settled());
    assert_eq!(
        copy.active_entry().unwrap().path(),
        vec!["home".to_string(), "hello".to_string()]
    );
    assert!(copy.able_to_back());
}

#[test]
fn operation_route_ref_previews_without_navigating() {
    let router = router();
    router.install(Rc::new(MemoryHistory::new()));
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());

    let op = home
        .child("hello")
        .unwrap()
        .with_state(json!({"lang": "fr"}))
        .push()
        .unwrap();
    assert_eq!(op.route_ref().unwrap().as_deref(), Some("/home/hello?lang=fr"));
    assert!(home.is_active());
    assert!(router.is_idle());
}
