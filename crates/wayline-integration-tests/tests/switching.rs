//! # Switching Scenarios
//!
//! A switch is a caller-driven navigation: the target sits in the
//! switching slot while the caller publishes progress, then completes or
//! aborts. These tests check what views on both sides observe.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};
use wayline_router::{
    NavigationError, RouteOperation, Router, RouterConfig, RouterError, Schema,
    SegmentSchema, StatePart, SwitchingRelation, SwitchingView, TransitionInterest, ViewMode,
};

fn router_with(config: RouterConfig) -> Router {
    let schema = Schema::builder()
        .segment(
            "home",
            SegmentSchema::new()
                .state(json!({"user": "a"}))
                .child("hello", SegmentSchema::new().state(json!({}))),
        )
        .segment("about", SegmentSchema::new().state(json!({})))
        .build()
        .unwrap();
    Router::new(schema, config)
}

fn router() -> Router {
    router_with(RouterConfig::default())
}

fn settle(router: &Router, op: RouteOperation) {
    let nav = op.commit().unwrap();
    router.flush();
    assert!(matches!(nav.outcome(), Some(Ok(()))), "navigation failed");
}

fn from(state: Value) -> Option<SwitchingView> {
    Some(SwitchingView {
        rel: SwitchingRelation::From,
        state,
    })
}

#[test]
fn from_side_observes_each_progress_value_once() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    let about = router.route(&["about"]).unwrap();
    settle(&router, home.reset());

    let home_view = router.view(&[home.clone()], ViewMode::Single);
    let about_view = router.view(&[about.clone()], ViewMode::Single);
    let from_entry = home_view.entries()[0].clone();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _sub = from_entry.subscribe_switching(move |value| sink.borrow_mut().push(value.clone()));

    let switching = about
        .push()
        .unwrap()
        .switch(Some(json!({"progress": 0})))
        .unwrap();
    assert!(about.is_switching());
    let to_entry = about_view.entries()[0].clone();
    assert_eq!(
        to_entry.switching(),
        Some(SwitchingView {
            rel: SwitchingRelation::To,
            state: json!({"progress": 0}),
        })
    );

    switching.update(json!({"progress": 0.5})).unwrap();
    // Equal values are not re-published.
    switching.update(json!({"progress": 0.5})).unwrap();
    assert_eq!(to_entry.switching().unwrap().state, json!({"progress": 0.5}));

    switching.complete().unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![from(json!({"progress": 0})), from(json!({"progress": 0.5}))]
    );
    assert!(!home.is_switching());
    assert!(!about.is_switching());
    assert!(about.is_active());
    assert!(from_entry.is_retired());
    assert_eq!(about_view.entries()[0].switching(), None);
    assert!(router.is_idle());
}

#[test]
fn switching_never_waits_on_blockers() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    let about = router.route(&["about"]).unwrap();
    settle(&router, home.reset());

    let home_view = router.view(&[home.clone()], ViewMode::Parallel);
    home_view.declare_transition(TransitionInterest::BOTH);
    let about_view = router.view(&[about.clone()], ViewMode::Parallel);
    about_view.declare_transition(TransitionInterest::BOTH);

    let switching = about.push().unwrap().switch(Some(json!(0))).unwrap();
    assert!(!router.active_entry().unwrap().is_leaving_blocked());
    assert!(!router.switching_entry().unwrap().is_entering_blocked());

    switching.complete().unwrap();
    assert!(about.is_active());
    assert!(router.able_to_back());
}

#[test]
fn pending_state_part_applies_on_completion() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());

    let mut part = StatePart::new();
    part.insert("user".to_string(), json!("b"));
    let switching = home
        .child("hello")
        .unwrap()
        .push()
        .unwrap()
        .with_state_part(part)
        .switch(Some(json!(0)))
        .unwrap();

    let switching_entry = router.switching_entry().unwrap();
    assert_eq!(switching_entry.state("user"), Some(json!("a")));
    assert!(switching_entry.target().pending_state_part().is_some());

    switching.complete().unwrap();
    let active = router.active_entry().unwrap();
    assert_eq!(active.state("user"), Some(json!("b")));
    assert!(active.target().pending_state_part().is_none());
    let previous = active.target();
    let previous = previous.previous().unwrap();
    assert_eq!(previous.merged_state().get("user"), Some(json!("a")));
}

#[test]
fn abort_clears_switch_and_keeps_active() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    let about = router.route(&["about"]).unwrap();
    settle(&router, home.reset());

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    router.add_listener(move |event| {
        sink.borrow_mut().push(event.name());
        Ok(())
    });

    let home_view = router.view(&[home.clone()], ViewMode::Single);
    let switching = about.push().unwrap().switch(Some(json!(0))).unwrap();
    assert!(home_view.entries()[0].switching().is_some());

    switching.abort().unwrap();
    assert!(home.is_active());
    assert!(!about.is_switching());
    assert_eq!(home_view.entries()[0].switching(), None);
    assert!(matches!(
        switching.complete().unwrap_err(),
        RouterError::Navigation(NavigationError::StaleSwitch)
    ));
    assert_eq!(*events.borrow(), vec!["switch_started", "switch_aborted"]);
}

#[test]
fn navigation_during_switch_is_queued() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    let about = router.route(&["about"]).unwrap();
    settle(&router, home.reset());

    let switching = about.push().unwrap().switch(Some(json!(0))).unwrap();
    let nav = home.child("hello").unwrap().push().unwrap().commit().unwrap();
    assert_eq!(router.queued_navigations(), 1);
    router.flush();
    assert!(!nav.is_settled());

    switching.complete().unwrap();
    router.flush();
    assert!(matches!(nav.outcome(), Some(Ok(()))));
    let target = router.active_entry().unwrap().target();
    assert_eq!(target.path(), ["home".to_string(), "hello".to_string()]);
    assert_eq!(target.previous().unwrap().path(), ["about".to_string()]);
}

#[test]
fn switch_requires_state_or_default() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());
    let err = router
        .route(&["about"])
        .unwrap()
        .push()
        .unwrap()
        .switch(None)
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Navigation(NavigationError::MissingSwitchingState)
    ));

    let router = router_with(RouterConfig::default().with_default_switching_state(json!(0)));
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());
    let switching = router
        .route(&["about"])
        .unwrap()
        .push()
        .unwrap()
        .switch(None)
        .unwrap();
    assert_eq!(switching.state(), json!(0));
    assert_eq!(router.switching_state(), Some(json!(0)));
}

#[test]
fn switch_rejected_while_transition_in_flight() {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    home.reset().commit().unwrap();
    let err = home.reset().switch(Some(json!(0))).unwrap_err();
    assert!(matches!(
        err,
        RouterError::Navigation(NavigationError::TransitionInFlight)
    ));
}
