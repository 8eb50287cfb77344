// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::myappresource_types::*;
use std::collections::BTreeMap;
use std::fmt;

pub const PODINFO_IMAGE: &str = "ghcr.io/stefanprodan/podinfo:latest";
pub const REDIS_IMAGE: &str = "redis:latest";

pub const PODINFO_UI_COLOR: &str = "PODINFO_UI_COLOR";
pub const PODINFO_UI_MESSAGE: &str = "PODINFO_UI_MESSAGE";
pub const PODINFO_CACHE_SERVER: &str = "PODINFO_CACHE_SERVER";

// Kubernetes limits label values to 63 characters.
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Namespace and name of an object, the unit the controller is triggered with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> ObjectKey {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The role a managed child plays for its MyAppResource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRole {
    Podinfo,
    Redis,
}

impl ChildRole {
    pub fn app(&self) -> &'static str {
        match self {
            ChildRole::Podinfo => "podinfo",
            ChildRole::Redis => "redis",
        }
    }

    /// Label key carrying the back-reference to the parent's name.
    pub fn owner_label_key(&self) -> &'static str {
        match self {
            ChildRole::Podinfo => "podinfo_cr",
            ChildRole::Redis => "redis_cr",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            ChildRole::Podinfo => PODINFO_IMAGE,
            ChildRole::Redis => REDIS_IMAGE,
        }
    }

    pub fn child_name(&self, parent_name: &str) -> String {
        format!("{}-{}", parent_name, self.app())
    }
}

impl fmt::Display for ChildRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.app())
    }
}

/// Label identity of a managed child: `{app: <role>, <role>_cr: <parent>}`.
///
/// Both the child's own labels and the pod selector are derived from this value,
/// so they never depend on anything observed in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLabels {
    pub role: ChildRole,
    pub parent_name: String,
}

impl ChildLabels {
    pub fn new(role: ChildRole, parent_name: impl Into<String>) -> ChildLabels {
        ChildLabels {
            role,
            parent_name: parent_name.into(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.role.app().to_string()),
            (
                self.role.owner_label_key().to_string(),
                self.parent_name.clone(),
            ),
        ])
    }

    /// Renders the exact-match selector string, e.g. `app=podinfo,podinfo_cr=demo`.
    ///
    /// Fails when the parent name cannot be a label value.
    pub fn selector(&self) -> Result<String, String> {
        validate_label_value(&self.parent_name)?;
        Ok(self
            .to_map()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","))
    }
}

fn validate_label_value(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("label value must not be empty".to_string());
    }
    if value.len() > MAX_LABEL_VALUE_LEN {
        return Err(format!(
            "label value {:?} is longer than {} characters",
            value, MAX_LABEL_VALUE_LEN
        ));
    }
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_alphanumeric();
    if !alnum(&bytes[0]) || !alnum(&bytes[bytes.len() - 1]) {
        return Err(format!(
            "label value {:?} must start and end with an alphanumeric character",
            value
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
    {
        return Err(format!(
            "label value {:?} contains invalid character {:?}",
            value, c
        ));
    }
    Ok(())
}

pub fn podinfo_deployment_name(app: &MyAppResource) -> String {
    ChildRole::Podinfo.child_name(&parent_name(app))
}

pub fn redis_deployment_name(app: &MyAppResource) -> String {
    ChildRole::Redis.child_name(&parent_name(app))
}

pub fn cache_server_address(cache_server: &CacheServer) -> String {
    format!("tcp://{}:{}", cache_server.host, cache_server.port)
}

pub(crate) fn parent_name(app: &MyAppResource) -> String {
    app.metadata.name.clone().unwrap_or_default()
}
