// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::shim_layer::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to get CR: {0}")]
    CRGetFailed(#[source] GatewayError),
    #[error("Failed to get Deployment {name}: {source}")]
    GetChildFailed {
        name: String,
        #[source]
        source: GatewayError,
    },
    #[error("Failed to create Deployment {name}: {source}")]
    CreateChildFailed {
        name: String,
        #[source]
        source: GatewayError,
    },
    #[error("Failed to update Deployment {name}: {source}")]
    UpdateChildFailed {
        name: String,
        #[source]
        source: GatewayError,
    },
    #[error("Failed to list pods: {0}")]
    ListPodsFailed(#[source] GatewayError),
    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
}

/// How the delivery mechanism should treat a failed reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Lost an optimistic-concurrency race; retry soon.
    Conflict,
    /// The control plane could not serve the call; retry with backoff.
    Transient,
    /// Retrying cannot help until the inputs change.
    Fatal,
}

impl Error {
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Error::CRGetFailed(e) | Error::ListPodsFailed(e) => Some(e),
            Error::GetChildFailed { source, .. }
            | Error::CreateChildFailed { source, .. }
            | Error::UpdateChildFailed { source, .. } => Some(source),
            Error::InvalidSelector(_) | Error::MissingObjectKey(_) => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.gateway_error() {
            Some(GatewayError::Conflict(_)) => ErrorClass::Conflict,
            // A create racing with another writer is resolved like any other conflict.
            Some(GatewayError::AlreadyExists) => ErrorClass::Conflict,
            Some(GatewayError::Invalid(_)) => ErrorClass::Fatal,
            Some(_) => ErrorClass::Transient,
            None => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() != ErrorClass::Fatal
    }
}
