// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "myapp-controller")]
#[command(about = "Keeps podinfo deployments in sync with MyAppResource objects", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, env = "MYAPP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "MYAPP_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the MyAppResource custom resource definition as YAML
    Export,
    /// Run the controller
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "MYAPP_NAMESPACE")]
    pub namespace: Option<String>,

    /// Deadline for a single Kubernetes API call
    #[arg(
        long,
        env = "MYAPP_CALL_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub call_timeout_secs: u64,

    /// First retry delay after a failed reconcile
    #[arg(
        long,
        env = "MYAPP_ERROR_REQUEUE_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub error_requeue_secs: u64,

    /// Upper bound for the retry delay after repeated failures
    #[arg(
        long,
        env = "MYAPP_MAX_ERROR_REQUEUE_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_error_requeue_secs: u64,

    /// Retry delay after losing a write race
    #[arg(
        long,
        env = "MYAPP_CONFLICT_REQUEUE_SECS",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub conflict_requeue_secs: u64,

    /// Re-check converged objects this often; 0 waits for changes only
    #[arg(long, env = "MYAPP_RESYNC_SECS", default_value_t = 0)]
    pub resync_secs: u64,
}

impl RunArgs {
    pub fn to_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            max_error_requeue: Duration::from_secs(self.max_error_requeue_secs),
            conflict_requeue: Duration::from_secs(self.conflict_requeue_secs),
            resync_period: (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs)),
        }
    }
}

/// Settings for one controller process, built once at startup and handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub namespace: Option<String>,
    pub call_timeout: Duration,
    pub error_requeue: Duration,
    pub max_error_requeue: Duration,
    pub conflict_requeue: Duration,
    pub resync_period: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            namespace: None,
            call_timeout: Duration::from_secs(10),
            error_requeue: Duration::from_secs(5),
            max_error_requeue: Duration::from_secs(300),
            conflict_requeue: Duration::from_secs(1),
            resync_period: None,
        }
    }
}
