// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use crate::common::*;
use crate::comparator::{container_env, replicas};
use crate::myappresource_types::*;
use crate::resources::*;
use crate::unit_tests::fake_control_plane::{make_app, scenario_spec};

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
pub fn test_podinfo_deployment_identity() {
    println!("Testing make_podinfo_deployment()...");
    let d = make_podinfo_deployment(&make_app("team-a", "demo", scenario_spec()));
    let want = labels(&[("app", "podinfo"), ("podinfo_cr", "demo")]);

    assert_eq!(d.metadata.name.as_deref(), Some("demo-podinfo"));
    assert_eq!(d.metadata.namespace.as_deref(), Some("team-a"));
    assert_eq!(d.metadata.labels.as_ref(), Some(&want));
    assert!(d.metadata.owner_references.is_none());

    let spec = d.spec.unwrap();
    assert_eq!(spec.selector.match_labels.as_ref(), Some(&want));
    assert_eq!(
        spec.template.metadata.unwrap().labels.as_ref(),
        Some(&want)
    );
    let containers = spec.template.spec.unwrap().containers;
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, "podinfo");
    assert_eq!(containers[0].image.as_deref(), Some(PODINFO_IMAGE));
}

#[test]
pub fn test_podinfo_deployment_ignores_spec_image() {
    let d = make_podinfo_deployment(&make_app(
        "default",
        "demo",
        MyAppResourceSpec {
            image: Image {
                repository: "example/podinfo".to_string(),
                tag: "6.0.0".to_string(),
            },
            ..scenario_spec()
        },
    ));
    let containers = d.spec.unwrap().template.spec.unwrap().containers;
    assert_eq!(containers[0].image.as_deref(), Some(PODINFO_IMAGE));
}

#[test]
pub fn test_podinfo_deployment_replicas_and_env() {
    let d = make_podinfo_deployment(&make_app("default", "demo", scenario_spec()));
    assert_eq!(replicas(&d), 3);
    assert_eq!(
        container_env(&d, ChildRole::Podinfo),
        labels(&[
            ("FOO", "1"),
            (PODINFO_CACHE_SERVER, "tcp://cache:6379"),
            (PODINFO_UI_COLOR, "blue"),
            (PODINFO_UI_MESSAGE, "hi"),
        ])
    );
}

#[test]
pub fn test_zero_replicas_are_kept() {
    let d = make_podinfo_deployment(&make_app("default", "demo", MyAppResourceSpec::default()));
    assert_eq!(d.spec.unwrap().replicas, Some(0));
}

#[test]
pub fn test_derivation_is_deterministic() {
    let app = make_app("default", "demo", scenario_spec());
    assert_eq!(make_podinfo_deployment(&app), make_podinfo_deployment(&app));
    assert_eq!(
        serde_json::to_string(&make_podinfo_deployment(&app)).unwrap(),
        serde_json::to_string(&make_podinfo_deployment(&app)).unwrap()
    );
}

#[test]
pub fn test_redis_deployment_is_gated() {
    let app = make_app("default", "demo", scenario_spec());
    assert!(make_redis_deployment(&app).is_none());

    let app = make_app(
        "default",
        "demo",
        MyAppResourceSpec {
            redis: Redis { enabled: true },
            ..scenario_spec()
        },
    );
    let d = make_redis_deployment(&app).unwrap();
    assert_eq!(d.metadata.name.as_deref(), Some("demo-redis"));
    assert_eq!(
        d.metadata.labels.as_ref(),
        Some(&labels(&[("app", "redis"), ("redis_cr", "demo")]))
    );
    assert_eq!(replicas(&d), 3);
    let containers = d.spec.unwrap().template.spec.unwrap().containers;
    assert_eq!(containers[0].name, "redis");
    assert_eq!(containers[0].image.as_deref(), Some(REDIS_IMAGE));
    assert!(containers[0].env.is_none());
}

#[test]
pub fn test_env_vars_from_map_are_sorted() {
    let env = env_vars_from_map(&labels(&[("B", "2"), ("A", "1")]));
    let names: Vec<&str> = env.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(env.iter().all(|e| e.value_from.is_none()));
}
