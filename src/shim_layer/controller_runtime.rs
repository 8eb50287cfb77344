// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::Api,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
    Client, Resource,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::*;

use crate::common::ObjectKey;
use crate::config::ControllerConfig;
use crate::error::{Error, ErrorClass};
use crate::myappresource_types::MyAppResource;
use crate::reconciler::{Outcome, Reconciler};
use crate::shim_layer::kube_control_plane::KubeControlPlane;
use crate::shim_layer::ControlPlane;

// The runtime connects the reconciler to kube-rs. kube-rs owns the watch, the work queue
// and the guarantee that one object is never reconciled twice at the same time; this
// module only translates between its callbacks and the reconciler.

/// Consecutive transient failures of one object.
#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last: Instant,
}

/// Shared by every reconcile and error_policy call of one controller.
pub struct Data<C> {
    pub reconciler: Reconciler<C>,
    pub config: ControllerConfig,
    failures: Mutex<HashMap<ObjectKey, FailureRecord>>,
}

impl<C: ControlPlane> Data<C> {
    pub fn new(reconciler: Reconciler<C>, config: ControllerConfig) -> Data<C> {
        Data {
            reconciler,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one more consecutive failure for `key` and returns the new count.
    ///
    /// An object that keeps failing is retried within `max_error_requeue`, so records
    /// untouched for twice that long belong to objects kube-rs stopped reconciling
    /// (deleted while failing) and are dropped.
    pub fn record_failure(&self, key: &ObjectKey) -> u32 {
        let now = Instant::now();
        let stale_after = self.config.max_error_requeue.saturating_mul(2);
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.retain(|k, r| k == key || now.duration_since(r.last) <= stale_after);
        let record = failures
            .entry(key.clone())
            .or_insert(FailureRecord { count: 0, last: now });
        record.count = record.count.saturating_add(1);
        record.last = now;
        record.count
    }

    pub fn reset_failures(&self, key: &ObjectKey) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn failure_count(&self, key: &ObjectKey) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    pub fn tracked_failures(&self) -> usize {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub fn object_key(cr: &MyAppResource) -> Result<ObjectKey, Error> {
    let name = cr
        .meta()
        .name
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = cr
        .meta()
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    Ok(ObjectKey::new(namespace.clone(), name.clone()))
}

/// Requeue delay for a converged or requeued pass; `None` means wait for the next change.
pub fn outcome_delay(outcome: Outcome, config: &ControllerConfig) -> Option<Duration> {
    match outcome {
        Outcome::Done => config.resync_period,
        Outcome::Requeue => Some(Duration::ZERO),
    }
}

/// Retry delay after the `failures`-th consecutive failure; `None` means do not retry.
pub fn retry_delay(class: ErrorClass, failures: u32, config: &ControllerConfig) -> Option<Duration> {
    match class {
        ErrorClass::Conflict => Some(config.conflict_requeue),
        ErrorClass::Transient => {
            let exponent = failures.saturating_sub(1).min(16);
            let delay = config.error_requeue.saturating_mul(1u32 << exponent);
            Some(delay.min(config.max_error_requeue))
        }
        ErrorClass::Fatal => None,
    }
}

fn to_action(delay: Option<Duration>) -> Action {
    match delay {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// kube-rs calls this whenever a MyAppResource or one of its Deployments changes.
pub async fn reconcile<C: ControlPlane>(
    cr: Arc<MyAppResource>,
    ctx: Arc<Data<C>>,
) -> Result<Action, Error> {
    let key = object_key(&cr)?;
    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.reset_failures(&key);
    Ok(to_action(outcome_delay(outcome, &ctx.config)))
}

/// kube-rs calls this when reconcile returns an error.
pub fn error_policy<C: ControlPlane>(
    cr: Arc<MyAppResource>,
    error: &Error,
    ctx: Arc<Data<C>>,
) -> Action {
    let class = error.class();
    // Only transient failures grow the backoff.
    let failures = match (class, object_key(&cr)) {
        (ErrorClass::Transient, Ok(key)) => ctx.record_failure(&key),
        (ErrorClass::Conflict, Ok(key)) => {
            ctx.reset_failures(&key);
            1
        }
        _ => 1,
    };
    let delay = retry_delay(class, failures, &ctx.config);
    match class {
        ErrorClass::Conflict => {
            info!(error = %error, ?delay, "Reconcile lost a write race, will retry")
        }
        ErrorClass::Transient => {
            warn!(error = %error, failures, ?delay, "Reconcile failed, will retry")
        }
        ErrorClass::Fatal => error!(error = %error, "Reconcile failed and will not be retried"),
    }
    to_action(delay)
}

/// Whether a controller error is a reconcile that lost a write race rather than a failure.
pub fn lost_write_race<QueueErr>(err: &controller::Error<Error, QueueErr>) -> bool
where
    QueueErr: std::error::Error,
{
    matches!(err, controller::Error::ReconcilerFailed(e, _) if e.class() == ErrorClass::Conflict)
}

pub fn report_controller_reconciled<K, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<Error, QueueErr>>,
) where
    K: Resource,
    QueueErr: std::error::Error,
{
    match result {
        Ok((obj, _)) => {
            info!(
                controller.name = controller_name,
                object = %obj,
                "Reconciled object"
            );
        }
        Err(err) if lost_write_race(err) => {
            info!(
                controller.name = controller_name,
                error = err as &dyn std::error::Error,
                "Object changed concurrently, requeued"
            );
        }
        Err(err) => {
            warn!(
                controller.name = controller_name,
                error = err as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}

/// Watches MyAppResources and the Deployments they own until a shutdown signal arrives.
pub async fn run_controller(config: ControllerConfig) -> Result<()> {
    let client = Client::try_default().await?;
    let (crs, deployments) = match config.namespace.as_deref() {
        Some(ns) => (
            Api::<MyAppResource>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<MyAppResource>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
        ),
    };

    let control_plane = KubeControlPlane::new(client, config.call_timeout);
    let data = Arc::new(Data::new(Reconciler::new(control_plane), config));

    info!("starting myapp-controller");
    Controller::new(crs, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .shutdown_on_signal()
        .run(
            reconcile::<KubeControlPlane>,
            error_policy::<KubeControlPlane>,
            data,
        )
        .for_each(|res| async move { report_controller_reconciled("myapp-controller", &res) })
        .await;
    info!("controller terminated");
    Ok(())
}
