//! Publish ReplicationController and Service manifests to a Kubernetes
//! cluster, replacing whatever resource of the same name is already there,
//! then tell a webhook about it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use k8_rollout::{HttpExecutor, Pipeline, RolloutConfig, RolloutError};
//! # async fn example() -> Result<(), RolloutError> {
//! let config = RolloutConfig::from_file("rollout.yaml")?;
//! let executor = HttpExecutor::new(config.debug, config.timeout)?;
//! let report = Pipeline::from_config(&config, Arc::new(executor))?.run().await?;
//! println!("deployed {:?}", report.images);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod http;
pub mod manifest;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
mod error;

pub use config::{RolloutConfig, SecretString};
pub use endpoint::{ResourceLocator, resolve};
pub use error::{Result, RolloutError};
pub use crate::http::{ApiRequest, ApiResponse, HttpExecutor, Operation, RequestExecutor, StatusPolicy};
pub use manifest::{Manifest, ResourceKind};
pub use notify::{DeploymentEvent, WebhookNotifier};
pub use pipeline::{ArtifactReport, NotifyStatus, Pipeline, PipelineReport};
pub use reconcile::{
    DrainWait, ReconcileState, ReconcilerConfig, ReconcilerConfigBuilder, Reconciler,
    ReconciliationOutcome,
};
