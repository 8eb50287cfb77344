// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::Parser;
use kube::CustomResourceExt;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use myapp_controller::config::{Cli, Command};
use myapp_controller::shim_layer::controller_runtime::run_controller;
use myapp_controller::MyAppResource;

// Logs go to stderr so `export` output stays valid YAML.
fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match &cli.command {
        Command::Export => {
            info!("exporting custom resource definition");
            println!("{}", serde_yaml::to_string(&MyAppResource::crd())?);
        }
        Command::Run(args) => {
            info!("running myapp-controller");
            run_controller(args.to_config()).await?;
        }
    }
    Ok(())
}
