// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeMap;

use crate::common::*;
use crate::myappresource_types::*;
use crate::resources::env_vars_from_map;

// The API server defaults an unset replica count to 1.
const DEFAULT_REPLICAS: i32 = 1;

/// Variables the controller injects into the podinfo container on top of the user's overlay.
pub fn synthesized_env(spec: &MyAppResourceSpec) -> Vec<EnvEntry> {
    let mut env = vec![
        EnvEntry::new(PODINFO_UI_COLOR, spec.ui.color.clone()),
        EnvEntry::new(PODINFO_UI_MESSAGE, spec.ui.message.clone()),
    ];
    if spec.cache_server.enabled {
        env.push(EnvEntry::new(
            PODINFO_CACHE_SERVER,
            cache_server_address(&spec.cache_server),
        ));
    }
    env
}

/// Folds the user overlay followed by the synthesized variables into one map.
///
/// Later entries win, so a synthesized variable overrides a user entry of the same
/// name, and among duplicated user entries the last one declared is kept.
pub fn merge_env(user: &[EnvEntry], synthesized: &[EnvEntry]) -> BTreeMap<String, String> {
    user.iter()
        .chain(synthesized.iter())
        .map(|e| (e.name.clone(), e.value.clone()))
        .collect()
}

pub fn expected_env(spec: &MyAppResourceSpec) -> BTreeMap<String, String> {
    merge_env(&spec.env, &synthesized_env(spec))
}

/// Every expected variable must be present in `observed` with the same value.
/// Variables only present in `observed` are tolerated.
pub fn env_satisfied(
    observed: &BTreeMap<String, String>,
    expected: &BTreeMap<String, String>,
) -> bool {
    expected
        .iter()
        .all(|(name, value)| observed.get(name) == Some(value))
}

/// The corrective patch for one managed child. Only replicas and env are ever patched;
/// image and labels are left as they were created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drift {
    pub replicas: Option<i32>,
    pub env: Option<BTreeMap<String, String>>,
}

impl Drift {
    pub fn is_empty(&self) -> bool {
        self.replicas.is_none() && self.env.is_none()
    }
}

pub fn replicas(deployment: &appsv1::Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(DEFAULT_REPLICAS)
}

fn container<'a>(
    deployment: &'a appsv1::Deployment,
    role: ChildRole,
) -> Option<&'a corev1::Container> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == role.app())
}

/// Reads the env of the role's container as a map. Entries sourced through
/// `valueFrom` read as empty strings.
pub fn container_env(deployment: &appsv1::Deployment, role: ChildRole) -> BTreeMap<String, String> {
    container(deployment, role)
        .and_then(|c| c.env.as_ref())
        .map(|env| {
            env.iter()
                .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn compute_drift(
    observed: &appsv1::Deployment,
    expected: &appsv1::Deployment,
    role: ChildRole,
) -> Drift {
    let mut drift = Drift::default();
    let expected_replicas = replicas(expected);
    if replicas(observed) != expected_replicas {
        drift.replicas = Some(expected_replicas);
    }
    let expected_env = container_env(expected, role);
    if !env_satisfied(&container_env(observed, role), &expected_env) {
        drift.env = Some(expected_env);
    }
    drift
}

/// Writes the drifted fields into the observed object and leaves everything else,
/// including the resource version, untouched.
pub fn apply_drift(
    mut observed: appsv1::Deployment,
    expected: &appsv1::Deployment,
    drift: &Drift,
    role: ChildRole,
) -> appsv1::Deployment {
    let spec = observed
        .spec
        .get_or_insert_with(|| expected.spec.clone().unwrap_or_default());
    if let Some(replicas) = drift.replicas {
        spec.replicas = Some(replicas);
    }
    if let Some(env) = drift.env.as_ref() {
        let pod_spec = spec.template.spec.get_or_insert_with(Default::default);
        match pod_spec.containers.iter_mut().find(|c| c.name == role.app()) {
            Some(c) => c.env = Some(env_vars_from_map(env)),
            None => {
                if let Some(c) = container(expected, role) {
                    pod_spec.containers.push(c.clone());
                }
            }
        }
    }
    observed
}
