// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::runtime::{
    controller::{self, Action},
    reflector::ObjectRef,
    watcher,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::ObjectKey;
use crate::config::ControllerConfig;
use crate::error::{Error, ErrorClass};
use crate::myappresource_types::MyAppResource;
use crate::reconciler::{Outcome, Reconciler};
use crate::shim_layer::controller_runtime::*;
use crate::shim_layer::GatewayError;
use crate::unit_tests::fake_control_plane::*;

fn config() -> ControllerConfig {
    ControllerConfig {
        error_requeue: Duration::from_secs(5),
        max_error_requeue: Duration::from_secs(60),
        conflict_requeue: Duration::from_secs(1),
        ..ControllerConfig::default()
    }
}

#[test]
pub fn test_transient_backoff_grows_and_caps() {
    let c = config();
    let delays: Vec<Option<Duration>> = (1..=6)
        .map(|n| retry_delay(ErrorClass::Transient, n, &c))
        .collect();
    assert_eq!(
        delays,
        vec![5, 10, 20, 40, 60, 60]
            .into_iter()
            .map(|s| Some(Duration::from_secs(s)))
            .collect::<Vec<_>>()
    );
    assert_eq!(
        retry_delay(ErrorClass::Transient, u32::MAX, &c),
        Some(Duration::from_secs(60))
    );
}

#[test]
pub fn test_conflict_and_fatal_delays() {
    let c = config();
    for n in [1, 5, 100] {
        assert_eq!(
            retry_delay(ErrorClass::Conflict, n, &c),
            Some(Duration::from_secs(1))
        );
        assert_eq!(retry_delay(ErrorClass::Fatal, n, &c), None);
    }
}

#[test]
pub fn test_outcome_delay() {
    let mut c = config();
    assert_eq!(outcome_delay(Outcome::Done, &c), None);
    assert_eq!(outcome_delay(Outcome::Requeue, &c), Some(Duration::ZERO));
    c.resync_period = Some(Duration::from_secs(300));
    assert_eq!(
        outcome_delay(Outcome::Done, &c),
        Some(Duration::from_secs(300))
    );
}

#[test]
pub fn test_object_key_requires_namespace() {
    let mut app = make_app("default", "demo", scenario_spec());
    assert_eq!(
        object_key(&app).unwrap(),
        ObjectKey::new("default", "demo")
    );
    app.metadata.namespace = None;
    assert!(matches!(
        object_key(&app),
        Err(Error::MissingObjectKey(".metadata.namespace"))
    ));
}

#[tokio::test]
async fn test_failures_reset_after_success() {
    let app = make_app("default", "demo", scenario_spec());
    let fake = FakeControlPlane::with_desired(app.clone());
    fake.state().fail_fetch_desired = Some(GatewayError::Unavailable("down".to_string()));
    let data = Arc::new(Data::new(Reconciler::new(fake), config()));
    let key = ObjectKey::new("default", "demo");

    let err = reconcile(Arc::new(app.clone()), data.clone())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
    error_policy(Arc::new(app.clone()), &err, data.clone());
    error_policy(Arc::new(app.clone()), &err, data.clone());
    assert_eq!(data.failure_count(&key), 2);

    assert!(reconcile(Arc::new(app), data.clone()).await.is_ok());
    assert_eq!(data.failure_count(&key), 0);
}

#[tokio::test]
async fn test_reconcile_reads_fresh_desired_state() {
    // The object handed in by the watch may be stale; the reconciler re-reads it.
    let stale = make_app("default", "demo", scenario_spec());
    let mut fresh = stale.clone();
    fresh.spec.replica_count = 6;
    let data = Arc::new(Data::new(
        Reconciler::new(FakeControlPlane::with_desired(fresh)),
        config(),
    ));

    reconcile(Arc::new(stale), data.clone()).await.unwrap();
    let d = data
        .reconciler
        .control_plane()
        .deployment("default", "demo-podinfo")
        .unwrap();
    assert_eq!(d.spec.unwrap().replicas, Some(6));
}

fn conflict_error() -> Error {
    Error::UpdateChildFailed {
        name: "demo-podinfo".to_string(),
        source: GatewayError::Conflict("object has been modified".to_string()),
    }
}

fn transient_error() -> Error {
    Error::CRGetFailed(GatewayError::Unavailable("connection refused".to_string()))
}

#[test]
pub fn test_conflicts_do_not_grow_backoff() {
    println!("Testing conflicts followed by a transient failure...");
    let app = Arc::new(make_app("default", "demo", scenario_spec()));
    let data = Arc::new(Data::new(Reconciler::new(FakeControlPlane::new()), config()));
    let key = ObjectKey::new("default", "demo");

    for _ in 0..3 {
        assert_eq!(
            error_policy(app.clone(), &conflict_error(), data.clone()),
            Action::requeue(Duration::from_secs(1))
        );
    }
    assert_eq!(data.failure_count(&key), 0);
    assert_eq!(
        error_policy(app.clone(), &transient_error(), data.clone()),
        Action::requeue(Duration::from_secs(5))
    );
    assert_eq!(data.failure_count(&key), 1);
}

#[test]
pub fn test_fatal_errors_are_not_counted() {
    let app = Arc::new(make_app("default", "demo", scenario_spec()));
    let data = Arc::new(Data::new(Reconciler::new(FakeControlPlane::new()), config()));
    let fatal = Error::InvalidSelector("bad".to_string());

    assert_eq!(
        error_policy(app.clone(), &fatal, data.clone()),
        Action::await_change()
    );
    assert_eq!(data.failure_count(&ObjectKey::new("default", "demo")), 0);
}

#[tokio::test]
async fn test_deleted_object_clears_failures() {
    let app = make_app("default", "demo", scenario_spec());
    let fake = FakeControlPlane::with_desired(app.clone());
    let data = Arc::new(Data::new(Reconciler::new(fake), config()));
    let key = ObjectKey::new("default", "demo");
    for _ in 0..4 {
        error_policy(Arc::new(app.clone()), &transient_error(), data.clone());
    }
    assert_eq!(data.failure_count(&key), 4);

    data.reconciler.control_plane().state().desired.clear();
    let action = reconcile(Arc::new(app), data.clone()).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(data.failure_count(&key), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_failures_are_pruned() {
    let gone = Arc::new(make_app("default", "gone", scenario_spec()));
    let live = Arc::new(make_app("default", "live", scenario_spec()));
    let data = Arc::new(Data::new(Reconciler::new(FakeControlPlane::new()), config()));
    for _ in 0..4 {
        error_policy(gone.clone(), &transient_error(), data.clone());
    }
    error_policy(live.clone(), &transient_error(), data.clone());
    assert_eq!(data.tracked_failures(), 2);

    // Still within the retry horizon of max_error_requeue (60s) times two.
    tokio::time::advance(Duration::from_secs(100)).await;
    error_policy(live.clone(), &transient_error(), data.clone());
    assert_eq!(data.failure_count(&ObjectKey::new("default", "gone")), 4);

    tokio::time::advance(Duration::from_secs(30)).await;
    error_policy(live, &transient_error(), data.clone());
    assert_eq!(data.failure_count(&ObjectKey::new("default", "gone")), 0);
    assert_eq!(data.failure_count(&ObjectKey::new("default", "live")), 3);
    assert_eq!(data.tracked_failures(), 1);
}

#[test]
pub fn test_only_conflicts_are_reported_as_lost_races() {
    let obj = ObjectRef::<MyAppResource>::new("demo")
        .within("default")
        .erase();
    let conflict: controller::Error<Error, watcher::Error> =
        controller::Error::ReconcilerFailed(conflict_error(), obj.clone());
    let transient: controller::Error<Error, watcher::Error> =
        controller::Error::ReconcilerFailed(transient_error(), obj);
    assert!(lost_write_race(&conflict));
    assert!(!lost_write_race(&transient));
}
