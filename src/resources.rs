// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

use crate::common::*;
use crate::comparator::expected_env;
use crate::myappresource_types::*;

/// Builds the podinfo deployment the given MyAppResource asks for.
///
/// The result depends only on the resource's identity and spec, never on what is
/// currently in the cluster, so two calls with the same input are equal.
pub fn make_podinfo_deployment(app: &MyAppResource) -> appsv1::Deployment {
    let container = corev1::Container {
        name: ChildRole::Podinfo.app().to_string(),
        image: Some(ChildRole::Podinfo.image().to_string()),
        env: Some(env_vars_from_map(&expected_env(&app.spec))),
        ..corev1::Container::default()
    };
    make_deployment(app, ChildRole::Podinfo, container)
}

/// Builds the redis deployment, or `None` when the cache dependency is disabled.
pub fn make_redis_deployment(app: &MyAppResource) -> Option<appsv1::Deployment> {
    if !app.spec.redis.enabled {
        return None;
    }
    let container = corev1::Container {
        name: ChildRole::Redis.app().to_string(),
        image: Some(ChildRole::Redis.image().to_string()),
        ..corev1::Container::default()
    };
    Some(make_deployment(app, ChildRole::Redis, container))
}

fn make_deployment(
    app: &MyAppResource,
    role: ChildRole,
    container: corev1::Container,
) -> appsv1::Deployment {
    let labels = ChildLabels::new(role, parent_name(app)).to_map();
    appsv1::Deployment {
        metadata: ObjectMeta {
            name: Some(role.child_name(&parent_name(app))),
            namespace: app.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(app.spec.replica_count),
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(labels),
                    ..metav1::ObjectMeta::default()
                }),
                spec: Some(corev1::PodSpec {
                    containers: vec![container],
                    ..corev1::PodSpec::default()
                }),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

pub fn env_vars_from_map(env: &BTreeMap<String, String>) -> Vec<corev1::EnvVar> {
    env.iter()
        .map(|(name, value)| corev1::EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..corev1::EnvVar::default()
        })
        .collect()
}
