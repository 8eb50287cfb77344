// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod controller_runtime;
pub mod kube_control_plane;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use thiserror::Error;

use crate::common::{ChildLabels, ObjectKey};
use crate::myappresource_types::MyAppResource;

// The shim layer is the only place that talks to the Kubernetes API. The reconciler is
// written against ControlPlane so it can run on kube-rs in production and on an
// in-memory cluster in unit tests.

/// Errors reported by the control plane, classified the way the reconciler branches on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists")]
    AlreadyExists,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("control plane unavailable: {0}")]
    Unavailable(String),
    #[error("call cancelled: {0}")]
    Cancelled(String),
}

/// A pod matched by a child's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_desired(&self, key: &ObjectKey) -> Result<MyAppResource, GatewayError>;

    async fn fetch_child(&self, key: &ObjectKey) -> Result<Deployment, GatewayError>;

    async fn create_child(&self, child: &Deployment) -> Result<Deployment, GatewayError>;

    /// Replaces the child; the object must carry the resource version it was read at.
    async fn update_child(&self, child: &Deployment) -> Result<Deployment, GatewayError>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &ChildLabels,
    ) -> Result<Vec<PodRef>, GatewayError>;

    /// Marks `owner` as the controller of `child` so the garbage collector removes the
    /// child together with its owner.
    fn link_ownership(
        &self,
        owner: &MyAppResource,
        child: &mut Deployment,
    ) -> Result<(), GatewayError>;
}
