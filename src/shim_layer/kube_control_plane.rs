// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams, PostParams},
    Client, Resource,
};
use std::future::Future;
use std::time::Duration;
use tracing::*;

use crate::common::{ChildLabels, ObjectKey};
use crate::myappresource_types::MyAppResource;
use crate::shim_layer::{ControlPlane, GatewayError, PodRef};

/// ControlPlane backed by a kube-rs client. Every call is bounded by `call_timeout`.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    call_timeout: Duration,
}

impl KubeControlPlane {
    pub fn new(client: Client, call_timeout: Duration) -> KubeControlPlane {
        KubeControlPlane {
            client,
            call_timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res.map_err(|e| {
                debug!(op, error = %e, "kube api call failed");
                kube_error_to_gateway(&e)
            }),
            Err(_) => Err(GatewayError::Cancelled(format!(
                "{} did not finish within {:?}",
                op, self.call_timeout
            ))),
        }
    }

    fn deployments_in(&self, child: &Deployment) -> Result<Api<Deployment>, GatewayError> {
        let namespace = child
            .metadata
            .namespace
            .as_ref()
            .ok_or_else(|| GatewayError::Invalid("deployment has no namespace".to_string()))?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn fetch_desired(&self, key: &ObjectKey) -> Result<MyAppResource, GatewayError> {
        let api = Api::<MyAppResource>::namespaced(self.client.clone(), &key.namespace);
        self.bounded("get myappresource", api.get(&key.name)).await
    }

    async fn fetch_child(&self, key: &ObjectKey) -> Result<Deployment, GatewayError> {
        let api = Api::<Deployment>::namespaced(self.client.clone(), &key.namespace);
        self.bounded("get deployment", api.get(&key.name)).await
    }

    async fn create_child(&self, child: &Deployment) -> Result<Deployment, GatewayError> {
        let api = self.deployments_in(child)?;
        self.bounded(
            "create deployment",
            api.create(&PostParams::default(), child),
        )
        .await
    }

    async fn update_child(&self, child: &Deployment) -> Result<Deployment, GatewayError> {
        let api = self.deployments_in(child)?;
        let name = child
            .metadata
            .name
            .as_ref()
            .ok_or_else(|| GatewayError::Invalid("deployment has no name".to_string()))?;
        self.bounded(
            "replace deployment",
            api.replace(name, &PostParams::default(), child),
        )
        .await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &ChildLabels,
    ) -> Result<Vec<PodRef>, GatewayError> {
        let selector = selector.selector().map_err(GatewayError::Invalid)?;
        let api = Api::<Pod>::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&selector);
        let pods = self.bounded("list pods", api.list(&lp)).await?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name.map(|name| PodRef { name }))
            .collect())
    }

    fn link_ownership(
        &self,
        owner: &MyAppResource,
        child: &mut Deployment,
    ) -> Result<(), GatewayError> {
        let oref = owner.controller_owner_ref(&()).ok_or_else(|| {
            GatewayError::Invalid("owner is missing .metadata.name or .metadata.uid".to_string())
        })?;
        child.metadata.owner_references = Some(vec![oref]);
        Ok(())
    }
}

/// Translates a kube-rs error into the taxonomy the reconciler branches on.
/// API errors are matched on their reason first and their status code second;
/// anything that never reached the API server is treated as unavailability.
pub fn kube_error_to_gateway(error: &kube::Error) -> GatewayError {
    match error {
        kube::Error::Api(resp) => match resp.reason.as_str() {
            "NotFound" => GatewayError::NotFound,
            "AlreadyExists" => GatewayError::AlreadyExists,
            "Conflict" => GatewayError::Conflict(resp.message.clone()),
            "Invalid" | "BadRequest" => GatewayError::Invalid(resp.message.clone()),
            _ => match resp.code {
                404 => GatewayError::NotFound,
                409 => GatewayError::Conflict(resp.message.clone()),
                400 | 422 => GatewayError::Invalid(resp.message.clone()),
                _ => GatewayError::Unavailable(resp.message.clone()),
            },
        },
        _ => GatewayError::Unavailable(error.to_string()),
    }
}
