use kube::{
    api::{Api, DynamicObject, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client,
};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to get kube client: {0}")]
    ClientGetFailed(#[from] kube::Error),

    #[error("Failed to apply yaml file!")]
    ApplyFailed,

    #[error("Failed to parse the yaml file!")]
    ParseYamlFailed(#[from] serde_yaml::Error),

    #[error("Failed to parse the json format!")]
    ParseJsonFailed(#[from] serde_json::Error),

    #[error("Failed to get CRD: {0}")]
    CRDGetFailed(#[source] kube::Error),

    #[error("Failed to run {0}")]
    CommandFailed(String),

    #[error("Timeout, e2e test failed!")]
    Timeout,

    #[error("Deployment is not consistent with the MyAppResource spec: {0}")]
    DeploymentInconsistent(String),
}

pub async fn apply(yaml: String, client: Client, discovery: &Discovery) -> Result<String, Error> {
    let ssapply = PatchParams::apply("kubectl-light").force();
    let doc = serde_yaml::from_str(&yaml)?;

    let obj: DynamicObject = serde_yaml::from_value(doc)?;
    let namespace = obj.metadata.namespace.as_deref();
    let gvk = match obj.types.as_ref().map(|tm| GroupVersionKind::try_from(tm)) {
        Some(Ok(gvk)) => gvk,
        _ => {
            println!("cannot apply object without valid TypeMeta {:?}", obj);
            return Err(Error::ApplyFailed);
        }
    };
    let name = obj.name_any();
    if let Some((ar, caps)) = discovery.resolve_gvk(&gvk) {
        let api = dynamic_api(ar, caps, client.clone(), namespace);
        println!("Applying {}: \n{}", gvk.kind, serde_yaml::to_string(&obj)?);
        let data: serde_json::Value = serde_json::to_value(&obj)?;
        let _r = api.patch(&name, &ssapply, &Patch::Apply(data)).await?;
        println!("applied {} {}", gvk.kind, name);
    } else {
        println!("Cannot apply document for unknown {:?}", gvk);
        return Err(Error::ApplyFailed);
    }

    Ok(name)
}

fn dynamic_api(
    ar: ApiResource,
    caps: ApiCapabilities,
    client: Client,
    ns: Option<&str>,
) -> Api<DynamicObject> {
    if caps.scope == Scope::Cluster {
        Api::all_with(client, &ar)
    } else if let Some(namespace) = ns {
        Api::namespaced_with(client, namespace, &ar)
    } else {
        Api::default_namespaced_with(client, &ar)
    }
}

pub fn run_command(program: &str, args: Vec<&str>) -> Result<(String, String), Error> {
    println!("{} {}", program, args.join(" "));
    let cmd = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| Error::CommandFailed(format!("{} {}: {}", program, args.join(" "), e)))?;
    let out = String::from_utf8_lossy(&cmd.stdout).to_string();
    let err = String::from_utf8_lossy(&cmd.stderr).to_string();
    println!("cmd output: {}", out);
    println!("cmd error: {}", err);
    if !cmd.status.success() {
        return Err(Error::CommandFailed(format!("{} {}", program, args.join(" "))));
    }
    Ok((out, err))
}
