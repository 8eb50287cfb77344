// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod common;
pub mod comparator;
pub mod config;
pub mod error;
pub mod myappresource_types;
pub mod reconciler;
pub mod resources;
pub mod shim_layer;


pub use error::{Error, ErrorClass};
pub use myappresource_types::*;
pub use reconciler::{Outcome, Reconciler};
