use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, Patch, PatchParams},
    discovery::Discovery,
    Client,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::*;

use crate::common::*;

pub fn myapp_resource() -> String {
    "
    apiVersion: app.example.com/v1alpha1
    kind: MyAppResource
    metadata:
      name: whatever
      namespace: default
    spec:
      replicaCount: 2
      resources:
        memoryLimit: 64Mi
        cpuRequest: 100m
      image:
        repository: ghcr.io/stefanprodan/podinfo
        tag: latest
      ui:
        color: '#34577c'
        message: some string
      redis:
        enabled: false
      cacheServer:
        enabled: true
        host: cache
        port: 6379
      env:
      - name: FOO
        value: '1'
    "
    .to_string()
}

fn container_env(deployment: &Deployment) -> BTreeMap<String, String> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.iter().find(|c| c.name == "podinfo"))
        .and_then(|c| c.env.as_ref())
        .map(|env| {
            env.iter()
                .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default()
}

fn replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|spec| spec.replicas)
}

/// Polls the deployment until `check` accepts it or the timeout expires.
async fn wait_for_deployment(
    client: Client,
    name: &str,
    timeout: Duration,
    check: impl Fn(&Deployment) -> Result<(), String>,
) -> Result<Deployment, Error> {
    let deploy_api: Api<Deployment> = Api::default_namespaced(client);
    let start = Instant::now();
    loop {
        sleep(Duration::from_secs(5)).await;
        if start.elapsed() > timeout {
            error!("Time out waiting for deployment {}", name);
            return Err(Error::Timeout);
        }
        match deploy_api.get(name).await {
            Err(e) => {
                info!("Get deployment {} failed with error {}.", name, e);
                continue;
            }
            Ok(deployment) => match check(&deployment) {
                Err(reason) => {
                    info!("Deployment {} is not ready yet: {}", name, reason);
                    continue;
                }
                Ok(()) => return Ok(deployment),
            },
        }
    }
}

async fn check_crd(client: Client) -> Result<(), Error> {
    let crd_api: Api<CustomResourceDefinition> = Api::all(client);
    match crd_api.get("myappresources.app.example.com").await {
        Err(e) => {
            println!("No CRD found, create one before run the e2e test.");
            Err(Error::CRDGetFailed(e))
        }
        Ok(_) => {
            println!("CRD found, continue to run the e2e test.");
            Ok(())
        }
    }
}

pub async fn desired_state_test(client: Client, name: String) -> Result<(), Error> {
    let deployment = wait_for_deployment(
        client,
        &format!("{}-podinfo", name),
        Duration::from_secs(300),
        |d| {
            if replicas(d) != Some(2) {
                return Err(format!("replicas are {:?}", replicas(d)));
            }
            Ok(())
        },
    )
    .await?;

    let env = container_env(&deployment);
    let expected = BTreeMap::from([
        ("FOO".to_string(), "1".to_string()),
        ("PODINFO_UI_COLOR".to_string(), "#34577c".to_string()),
        ("PODINFO_UI_MESSAGE".to_string(), "some string".to_string()),
        ("PODINFO_CACHE_SERVER".to_string(), "tcp://cache:6379".to_string()),
    ]);
    if env != expected {
        return Err(Error::DeploymentInconsistent(format!(
            "env is {:?}, expected {:?}",
            env, expected
        )));
    }
    let owners = deployment.metadata.owner_references.unwrap_or_default();
    if !owners.iter().any(|o| o.kind == "MyAppResource" && o.name == name) {
        return Err(Error::DeploymentInconsistent(
            "deployment is not owned by the MyAppResource".to_string(),
        ));
    }
    info!("Desired state test passed.");
    Ok(())
}

pub async fn scaling_test(client: Client, name: String) -> Result<(), Error> {
    run_command(
        "kubectl",
        vec![
            "patch",
            "myapp",
            &name,
            "--type=json",
            "-p",
            "[{\"op\": \"replace\", \"path\": \"/spec/replicaCount\", \"value\": 4}]",
        ],
    )?;
    wait_for_deployment(
        client,
        &format!("{}-podinfo", name),
        Duration::from_secs(300),
        |d| match replicas(d) {
            Some(4) => Ok(()),
            other => Err(format!("replicas are {:?}", other)),
        },
    )
    .await?;
    info!("Scaling test passed.");
    Ok(())
}

pub async fn env_update_test(client: Client, name: String) -> Result<(), Error> {
    run_command(
        "kubectl",
        vec![
            "patch",
            "myapp",
            &name,
            "--type=merge",
            "-p",
            "{\"spec\": {\"ui\": {\"message\": \"updated\"}}}",
        ],
    )?;
    wait_for_deployment(
        client,
        &format!("{}-podinfo", name),
        Duration::from_secs(300),
        |d| match container_env(d).get("PODINFO_UI_MESSAGE").map(String::as_str) {
            Some("updated") => Ok(()),
            other => Err(format!("PODINFO_UI_MESSAGE is {:?}", other)),
        },
    )
    .await?;
    info!("Env update test passed.");
    Ok(())
}

// Someone scales the deployment behind the controller's back; it must be scaled back.
pub async fn drift_test(client: Client, name: String) -> Result<(), Error> {
    let deploy_name = format!("{}-podinfo", name);
    let deploy_api: Api<Deployment> = Api::default_namespaced(client.clone());
    deploy_api
        .patch(
            &deploy_name,
            &PatchParams::default(),
            &Patch::Merge(json!({"spec": {"replicas": 5}})),
        )
        .await?;
    wait_for_deployment(client, &deploy_name, Duration::from_secs(300), |d| {
        match replicas(d) {
            Some(2) => Ok(()),
            other => Err(format!("replicas are {:?}", other)),
        }
    })
    .await?;
    info!("Drift test passed.");
    Ok(())
}

pub async fn redis_test(client: Client, name: String) -> Result<(), Error> {
    run_command(
        "kubectl",
        vec![
            "patch",
            "myapp",
            &name,
            "--type=merge",
            "-p",
            "{\"spec\": {\"redis\": {\"enabled\": true}}}",
        ],
    )?;
    let deployment = wait_for_deployment(
        client,
        &format!("{}-redis", name),
        Duration::from_secs(300),
        |d| match replicas(d) {
            Some(2) => Ok(()),
            other => Err(format!("replicas are {:?}", other)),
        },
    )
    .await?;
    let labels = deployment.metadata.labels.unwrap_or_default();
    if labels.get("app").map(String::as_str) != Some("redis")
        || labels.get("redis_cr") != Some(&name)
    {
        return Err(Error::DeploymentInconsistent(format!(
            "redis labels are {:?}",
            labels
        )));
    }
    info!("Redis test passed.");
    Ok(())
}

async fn setup() -> Result<(Client, String), Error> {
    let client = Client::try_default().await?;
    check_crd(client.clone()).await?;
    let discovery = Discovery::new(client.clone()).run().await?;
    let name = apply(myapp_resource(), client.clone(), &discovery).await?;
    Ok((client, name))
}

pub async fn myapp_e2e_test() -> Result<(), Error> {
    let (client, name) = setup().await?;

    desired_state_test(client.clone(), name.clone()).await?;
    scaling_test(client.clone(), name.clone()).await?;
    env_update_test(client.clone(), name.clone()).await?;

    println!("E2e test passed.");
    Ok(())
}

pub async fn myapp_drift_e2e_test() -> Result<(), Error> {
    let (client, name) = setup().await?;

    desired_state_test(client.clone(), name.clone()).await?;
    drift_test(client.clone(), name.clone()).await?;

    println!("E2e test passed.");
    Ok(())
}

pub async fn myapp_redis_e2e_test() -> Result<(), Error> {
    let (client, name) = setup().await?;

    desired_state_test(client.clone(), name.clone()).await?;
    redis_test(client.clone(), name.clone()).await?;

    println!("E2e test passed.");
    Ok(())
}
