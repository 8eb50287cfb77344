// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "app.example.com", version = "v1alpha1", kind = "MyAppResource")]
#[kube(shortname = "myapp", namespaced)]
#[kube(status = "MyAppResourceStatus")]
#[serde(rename_all = "camelCase")]
pub struct MyAppResourceSpec {
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub replica_count: i32,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub image: Image,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub redis: Redis,
    #[serde(default)]
    pub cache_server: CacheServer,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,
}

// Nothing populates the status yet; it only exists so the subresource is served.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct MyAppResourceStatus {}

/// Quantities are opaque here; the API server validates them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default)]
    pub memory_limit: String,
    #[serde(default)]
    pub cpu_request: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Image {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Ui {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Redis {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct CacheServer {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EnvEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> EnvEntry {
        EnvEntry {
            name: name.into(),
            value: value.into(),
        }
    }
}
