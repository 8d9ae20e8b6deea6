//! # Snapshot Round-Trip Scenarios
//!
//! Encodes a router's history chain, restores it into a fresh router built
//! from the same schema, and checks that the restored router is
//! indistinguishable: same active path and state, same neighbours, shared
//! state objects still shared, derived states re-derived, and identical
//! JSON on re-encoding.

use serde_json::json;
use wayline_router::{
    NavigationError, OperationKind, RouteOperation, Router, RouterConfig, RouterError, Schema,
    SegmentSchema, Snapshot, SnapshotState, StatePart,
};

fn schema() -> Schema {
    Schema::builder()
        .segment(
            "home",
            SegmentSchema::new()
                .state(json!({"user": "a"}))
                .child("hello", SegmentSchema::new().state(json!({})))
                .child(
                    "profile",
                    SegmentSchema::new().derived(|input, upper| {
                        json!({
                            "name": input.cloned().unwrap_or(json!("guest")),
                            "owner": upper.get("user"),
                        })
                    }),
                ),
        )
        .segment("about", SegmentSchema::new().state(json!({"tab": "team"})))
        .build()
        .unwrap()
}

fn router() -> Router {
    Router::new(schema(), RouterConfig::default())
}

fn settle(router: &Router, op: RouteOperation) {
    let nav = op.commit().unwrap();
    router.flush();
    assert!(matches!(nav.outcome(), Some(Ok(()))), "navigation failed");
}

fn strict_router() -> Router {
    let config = RouterConfig {
        strict_derivations: true,
        ..RouterConfig::default()
    };
    Router::new(schema(), config)
}

fn restored(snapshot_json: &str) -> Router {
    restored_into(router(), snapshot_json)
}

fn restored_into(router: Router, snapshot_json: &str) -> Router {
    let snapshot = Snapshot::from_json(snapshot_json).unwrap();
    let nav = router.restore(&snapshot).unwrap();
    router.flush();
    assert!(matches!(nav.outcome(), Some(Ok(()))), "restore failed");
    router
}

/// home → profile(alice) → about, then one step back.
fn navigated() -> Router {
    let router = router();
    let home = router.route(&["home"]).unwrap();
    settle(&router, home.reset());
    let profile = home.child("profile").unwrap().with_state(json!("alice"));
    settle(&router, profile.push().unwrap());
    settle(&router, router.route(&["about"]).unwrap().push().unwrap());
    settle(&router, router.back().unwrap());
    router
}

#[test]
fn restore_reproduces_active_location() {
    let original = navigated();
    let json = original.snapshot().unwrap().to_json().unwrap();
    let copy = restored(&json);

    let before = original.active_entry().unwrap();
    let after = copy.active_entry().unwrap();
    assert_eq!(after.path(), before.path());
    assert_eq!(after.merged_state().to_value(), before.merged_state().to_value());
    assert_eq!(after.state("name"), Some(json!("alice")));
    assert_eq!(after.state("owner"), Some(json!("a")));
    assert_eq!(copy.active_operation(), Some(OperationKind::Back));

    assert_eq!(copy.able_to_back(), original.able_to_back());
    assert_eq!(copy.able_to_forward(), original.able_to_forward());
    let target = after.target();
    assert_eq!(target.previous().unwrap().path(), ["home".to_string()]);
    assert_eq!(target.next().unwrap().path(), ["about".to_string()]);
}

#[test]
fn reencoding_restored_router_is_identical() {
    let original = navigated();
    let json = original.snapshot().unwrap().to_json().unwrap();
    let copy = restored(&json);
    assert_eq!(copy.snapshot().unwrap().to_json().unwrap(), json);
}

#[test]
fn shared_state_objects_stay_shared() {
    let original = navigated();
    let snapshot = original.snapshot().unwrap();
    // home's state is shared by the head and its previous target.
    assert!(matches!(snapshot.entry.states[0], SnapshotState::Index(0)));
    assert!(matches!(
        snapshot.entry.states[1],
        SnapshotState::Derived { .. }
    ));

    let copy = restored(&snapshot.to_json().unwrap());
    let target = copy.active_entry().unwrap().target();
    let previous = target.previous().unwrap();
    assert!(target.state_at(0).unwrap().ptr_eq(previous.state_at(0).unwrap()));

    // Writes through the shared object are visible from both targets.
    copy.active_entry().unwrap().set_state("user", json!("z"));
    assert_eq!(previous.merged_state().get("user"), Some(json!("z")));
}

#[test]
fn derived_state_is_rederived_on_restore() {
    let original = navigated();
    let mut snapshot = original.snapshot().unwrap();
    assert_eq!(
        snapshot.entry.states[1],
        SnapshotState::Derived {
            value: Some(json!("alice")),
        }
    );

    snapshot.entry.states[1] = SnapshotState::Derived {
        value: Some(json!("bob")),
    };
    let copy = restored(&snapshot.to_json().unwrap());
    assert_eq!(copy.active_entry().unwrap().state("name"), Some(json!("bob")));
}

#[test]
fn restore_requires_idle_router() {
    let original = navigated();
    let snapshot = original.snapshot().unwrap();

    let busy = router();
    busy.route(&["home"]).unwrap().reset().commit().unwrap();
    let err = busy.restore(&snapshot).unwrap_err();
    assert!(matches!(
        err,
        RouterError::Navigation(NavigationError::NotIdle)
    ));
}

#[test]
fn snapshot_requires_active_entry() {
    let router = router();
    assert!(matches!(
        router.snapshot().unwrap_err(),
        RouterError::Navigation(NavigationError::NoActiveEntry)
    ));
}

#[test]
fn malformed_snapshot_is_rejected() {
    let router = router();
    let bad = Snapshot::from_json(
        r#"{"operation":"push","entry":{"path":["home"],"states":[3]},"objects":[{}]}"#,
    )
    .unwrap();
    assert!(matches!(
        router.restore(&bad).unwrap_err(),
        RouterError::Snapshot(_)
    ));
    assert!(router.is_idle());
    assert!(router.active_entry().is_none());
}

#[test]
fn long_history_round_trips() {
    let original = router();
    settle(&original, original.route(&["home"]).unwrap().reset());
    for step in 0..250 {
        let path: &[&str] = if step % 2 == 0 { &["home", "hello"] } else { &["about"] };
        settle(&original, original.route(path).unwrap().push().unwrap());
    }
    let json = original.snapshot().unwrap().to_json().unwrap();

    let copy = restored(&json);
    let target = copy.active_entry().unwrap().target();
    assert_eq!(target.back_depth(), 250);
    assert_eq!(target.path(), ["about".to_string()]);
    assert_eq!(copy.snapshot().unwrap().to_json().unwrap(), json);
}

#[test]
fn explicit_null_input_survives_restore() {
    let original = router();
    let home = original.route(&["home"]).unwrap();
    settle(&original, home.reset());
    let profile = home.child("profile").unwrap().with_state(serde_json::Value::Null);
    settle(&original, profile.push().unwrap());
    assert_eq!(original.active_entry().unwrap().state("name"), Some(serde_json::Value::Null));

    let snapshot = original.snapshot().unwrap();
    assert_eq!(
        snapshot.entry.states[1],
        SnapshotState::Derived {
            value: Some(serde_json::Value::Null),
        }
    );
    let json = snapshot.to_json().unwrap();
    let copy = restored(&json);
    assert_eq!(copy.active_entry().unwrap().state("name"), Some(serde_json::Value::Null));
    assert_eq!(copy.snapshot().unwrap().to_json().unwrap(), json);
}

#[test]
fn edited_derived_state_snapshots_in_strict_mode() {
    let original = strict_router();
    let home = original.route(&["home"]).unwrap();
    settle(&original, home.reset());
    let mut part = StatePart::new();
    part.insert("name".into(), json!("x"));
    let profile = home.child("profile").unwrap().with_state(json!("alice"));
    settle(&original, profile.push().unwrap().with_state_part(part));

    let snapshot = original.snapshot().unwrap();
    assert!(matches!(snapshot.entry.states[1], SnapshotState::Index(_)));
    let json = snapshot.to_json().unwrap();

    let copy = restored_into(strict_router(), &json);
    let active = copy.active_entry().unwrap();
    assert_eq!(active.state("name"), Some(json!("x")));
    assert_eq!(active.state("owner"), Some(json!("a")));
    assert_eq!(copy.snapshot().unwrap().to_json().unwrap(), json);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn apply(router: &Router, op: u8) {
        let home = router.route(&["home"]).unwrap();
        let op = match op {
            0 => home.child("hello").unwrap().push().unwrap(),
            1 => router.route(&["about"]).unwrap().push().unwrap(),
            2 => home.child("profile").unwrap().with_state(json!("p")).replace().unwrap(),
            3 if router.able_to_back() => router.back().unwrap(),
            _ if router.able_to_forward() => router.forward().unwrap(),
            _ => home.push().unwrap(),
        };
        settle(router, op);
    }

    proptest! {
        #[test]
        fn round_trip_preserves_chain(ops in prop::collection::vec(0u8..5, 0..10)) {
            let original = router();
            settle(&original, original.route(&["home"]).unwrap().reset());
            for op in ops {
                apply(&original, op);
            }

            let json = original.snapshot().unwrap().to_json().unwrap();
            let copy = restored(&json);
            let before = original.active_entry().unwrap().target();
            let after = copy.active_entry().unwrap().target();
            prop_assert_eq!(after.path(), before.path());
            prop_assert_eq!(after.back_depth(), before.back_depth());
            prop_assert_eq!(after.forward_depth(), before.forward_depth());
            prop_assert_eq!(
                after.merged_state().to_value(),
                before.merged_state().to_value()
            );
            prop_assert_eq!(copy.snapshot().unwrap().to_json().unwrap(), json);
        }
    }
}
