// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::apps::v1::Deployment;
use tracing::*;

use crate::common::*;
use crate::comparator::{apply_drift, compute_drift};
use crate::error::Error;
use crate::myappresource_types::MyAppResource;
use crate::resources::{make_podinfo_deployment, make_redis_deployment};
use crate::shim_layer::{ControlPlane, GatewayError};

/// What the delivery mechanism should do after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change.
    Done,
    /// Something was written; run again right away and check what the API server persisted.
    Requeue,
}

/// Where one managed child stands after a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildState {
    Created,
    Updated,
    InSync,
}

/// Drives the children of a MyAppResource towards its spec.
///
/// Each call to `reconcile` performs at most one write and then asks to be requeued,
/// so it never trusts the return value of a write and can be interrupted at any await.
/// It keeps no state between calls.
pub struct Reconciler<C> {
    control_plane: C,
}

impl<C: ControlPlane> Reconciler<C> {
    pub fn new(control_plane: C) -> Reconciler<C> {
        Reconciler { control_plane }
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    #[instrument(skip_all, fields(myappresource = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, Error> {
        // Always read the latest MyAppResource before taking any action.
        let app = match self.control_plane.fetch_desired(key).await {
            Ok(app) => app,
            Err(GatewayError::NotFound) => {
                info!("MyAppResource not found, ignoring since it must have been deleted");
                return Ok(Outcome::Done);
            }
            Err(e) => {
                error!(error = %e, "Failed to get MyAppResource");
                return Err(Error::CRGetFailed(e));
            }
        };
        let name = app
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let namespace = app
            .metadata
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

        let podinfo = make_podinfo_deployment(&app);
        if self.reconcile_child(&app, ChildRole::Podinfo, podinfo).await? != ChildState::InSync {
            return Ok(Outcome::Requeue);
        }

        if let Some(redis) = make_redis_deployment(&app) {
            if self.reconcile_child(&app, ChildRole::Redis, redis).await? != ChildState::InSync {
                return Ok(Outcome::Requeue);
            }
        }

        self.observe_pods(&namespace, &name).await?;
        Ok(Outcome::Done)
    }

    async fn reconcile_child(
        &self,
        app: &MyAppResource,
        role: ChildRole,
        expected: Deployment,
    ) -> Result<ChildState, Error> {
        let name = expected.metadata.name.clone().unwrap_or_default();
        let namespace = expected.metadata.namespace.clone().unwrap_or_default();
        let key = ObjectKey::new(namespace, name.clone());

        let observed = match self.control_plane.fetch_child(&key).await {
            Ok(observed) => observed,
            Err(GatewayError::NotFound) => {
                self.create_child(app, role, expected).await?;
                return Ok(ChildState::Created);
            }
            Err(e) => {
                error!(deployment = %key, error = %e, "Failed to get Deployment");
                return Err(Error::GetChildFailed { name, source: e });
            }
        };

        let drift = compute_drift(&observed, &expected, role);
        if drift.is_empty() {
            return Ok(ChildState::InSync);
        }
        info!(
            deployment = %key,
            %role,
            replicas = ?drift.replicas,
            env_drifted = drift.env.is_some(),
            "Updating Deployment"
        );
        let updated = apply_drift(observed, &expected, &drift, role);
        match self.control_plane.update_child(&updated).await {
            Ok(_) => Ok(ChildState::Updated),
            Err(e) => {
                match e {
                    GatewayError::Conflict(_) => {
                        info!(deployment = %key, error = %e, "Deployment changed concurrently, will retry")
                    }
                    _ => error!(deployment = %key, error = %e, "Failed to update Deployment"),
                }
                Err(Error::UpdateChildFailed { name, source: e })
            }
        }
    }

    async fn create_child(
        &self,
        app: &MyAppResource,
        role: ChildRole,
        mut child: Deployment,
    ) -> Result<(), Error> {
        let name = child.metadata.name.clone().unwrap_or_default();
        // Ownership only matters for garbage collection, so the child is created anyway.
        if let Err(e) = self.control_plane.link_ownership(app, &mut child) {
            warn!(deployment = %name, error = %e, "Failed to set owner reference on Deployment");
        }
        info!(deployment = %name, %role, "Creating a new Deployment");
        match self.control_plane.create_child(&child).await {
            Ok(_) => Ok(()),
            Err(e) => {
                match e {
                    GatewayError::AlreadyExists => {
                        info!(deployment = %name, "Deployment was created concurrently, will retry")
                    }
                    _ => error!(deployment = %name, error = %e, "Failed to create new Deployment"),
                }
                Err(Error::CreateChildFailed { name, source: e })
            }
        }
    }

    // The pod list is observed but not written anywhere until the status carries it.
    async fn observe_pods(&self, namespace: &str, parent_name: &str) -> Result<(), Error> {
        let labels = ChildLabels::new(ChildRole::Podinfo, parent_name);
        labels.selector().map_err(Error::InvalidSelector)?;
        let pods = self
            .control_plane
            .list_pods(namespace, &labels)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list pods");
                Error::ListPodsFailed(e)
            })?;
        let pod_names: Vec<&str> = pods.iter().map(|p| p.name.as_str()).collect();
        debug!(pods = ?pod_names, "Observed podinfo pods");
        Ok(())
    }
}
