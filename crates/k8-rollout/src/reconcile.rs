//! Replace one named cluster resource with the content of a manifest.
//!
//! The sequence per artifact is
//!
//! ```text
//! Start -> CheckExists -> [Drain ->] Delete -> Create -> Done
//!               \________________________/
//!                  resource not found
//! ```
//!
//! with `Failed` reachable from every state. The API server does not remove
//! the pods of a ReplicationController that is deleted directly, so existing
//! controllers are first scaled to zero replicas and given time to settle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use http::{Method, StatusCode};
use serde::Deserialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument};

use crate::config::SecretString;
use crate::endpoint::ResourceLocator;
use crate::error::{Result, RolloutError};
use crate::http::{
    ApiRequest, JSON_CONTENT_TYPE, Operation, RequestExecutor, STRATEGIC_MERGE_PATCH_CONTENT_TYPE,
    StatusPolicy,
};
use crate::manifest::Manifest;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_DRAIN_SETTLE: Duration = Duration::from_secs(5);
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DRAIN_POLL_TIMEOUT: Duration = Duration::from_secs(60);

fn default_settle() -> Duration {
    DEFAULT_DRAIN_SETTLE
}

fn default_poll_interval() -> Duration {
    DEFAULT_DRAIN_POLL_INTERVAL
}

fn default_poll_timeout() -> Duration {
    DEFAULT_DRAIN_POLL_TIMEOUT
}

/// How to wait for pods to terminate after scaling a controller to zero
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DrainWait {
    /// Sleep for a fixed time
    Fixed {
        #[serde(with = "humantime_serde", default = "default_settle")]
        settle: Duration,
    },
    /// Re-read the controller until `status.replicas` is zero
    Poll {
        #[serde(with = "humantime_serde", default = "default_poll_interval")]
        interval: Duration,
        #[serde(with = "humantime_serde", default = "default_poll_timeout")]
        timeout: Duration,
    },
}

impl Default for DrainWait {
    fn default() -> Self {
        Self::Fixed {
            settle: DEFAULT_DRAIN_SETTLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Start,
    CheckExists,
    Drain,
    Delete,
    Create,
    Done,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happened to one artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// A resource with the same name was found
    pub existed: bool,
    /// The found resource was deleted
    pub replaced: bool,
    /// The manifest was posted
    pub created: bool,
}

/// Where and how to reconcile
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", error = "RolloutError"))]
pub struct ReconcilerConfig {
    /// API server base URL, e.g. `https://10.0.0.1:6443`
    #[builder(setter(into))]
    api_server: String,

    #[builder(setter(into), default = "DEFAULT_NAMESPACE.to_string()")]
    namespace: String,

    #[builder(setter(into))]
    token: SecretString,

    #[builder(default)]
    drain: DrainWait,

    #[builder(default)]
    status_policy: StatusPolicy,
}

impl ReconcilerConfigBuilder {
    fn validate(&self) -> Result<()> {
        if let Some(api_server) = &self.api_server {
            if api_server.trim().is_empty() {
                return Err(RolloutError::config("api server must not be empty"));
            }
        }
        if let Some(namespace) = &self.namespace {
            if namespace.trim().is_empty() {
                return Err(RolloutError::config("namespace must not be empty"));
            }
        }
        Ok(())
    }
}

impl ReconcilerConfig {
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn status_policy(&self) -> &StatusPolicy {
        &self.status_policy
    }
}

/// Drives one manifest through the replace sequence
pub struct Reconciler {
    config: ReconcilerConfig,
    executor: Arc<dyn RequestExecutor>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, executor: Arc<dyn RequestExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[instrument(
        skip(self, manifest),
        fields(kind = %manifest.kind(), name = %manifest.name())
    )]
    pub async fn reconcile(&self, manifest: &Manifest) -> Result<ReconciliationOutcome> {
        let mut state = ReconcileState::Start;
        let result = async {
            let locator = ResourceLocator::for_manifest(
                manifest,
                &self.config.api_server,
                &self.config.namespace,
            )?;
            let mut outcome = ReconciliationOutcome::default();

            state = ReconcileState::CheckExists;
            outcome.existed = self.exists(&locator).await?;

            if outcome.existed {
                if manifest.kind().runs_pods() {
                    state = ReconcileState::Drain;
                    self.drain(&locator, manifest.name()).await?;
                }
                state = ReconcileState::Delete;
                self.delete(&locator).await?;
                outcome.replaced = true;
            }

            state = ReconcileState::Create;
            self.create(&locator, manifest).await?;
            outcome.created = true;

            Ok::<_, RolloutError>(outcome)
        }
        .await;

        match &result {
            Ok(outcome) => info!(state = %ReconcileState::Done, ?outcome, "artifact reconciled"),
            Err(err) => error!(
                state = %ReconcileState::Failed,
                failed_in = %state,
                %err,
                "artifact reconciliation failed"
            ),
        }
        result
    }

    fn request(&self, method: Method, url: &str) -> ApiRequest {
        ApiRequest::new(method, url, self.config.token.clone())
    }

    async fn exists(&self, locator: &ResourceLocator) -> Result<bool> {
        let request = self.request(Method::GET, &locator.resource_url);
        let response = self.executor.execute(request).await?;
        let exists = self
            .config
            .status_policy
            .accepts(Operation::Exists, response.status);
        debug!(status = %response.status, exists, "checked resource");
        Ok(exists)
    }

    async fn drain(&self, locator: &ResourceLocator, name: &str) -> Result<()> {
        let patch = serde_json::to_vec(&serde_json::json!({ "spec": { "replicas": 0 } }))?;
        let request = self
            .request(Method::PATCH, &locator.resource_url)
            .with_body(patch, STRATEGIC_MERGE_PATCH_CONTENT_TYPE);
        let response = self.executor.execute(request.clone()).await?;
        self.config
            .status_policy
            .ensure(Operation::Drain, &request, response)?;

        match &self.config.drain {
            DrainWait::Fixed { settle } => {
                debug!(?settle, "waiting for pods to terminate");
                sleep(*settle).await;
                Ok(())
            }
            DrainWait::Poll { interval, timeout } => {
                self.wait_scaled_down(locator, name, *interval, *timeout)
                    .await
            }
        }
    }

    async fn wait_scaled_down(
        &self,
        locator: &ResourceLocator,
        name: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            sleep(interval).await;

            let request = self.request(Method::GET, &locator.resource_url);
            let response = self.executor.execute(request.clone()).await?;
            if response.status == StatusCode::NOT_FOUND {
                debug!("controller gone while draining");
                return Ok(());
            }
            let response = self
                .config
                .status_policy
                .ensure(Operation::Exists, &request, response)?;

            match observed_replicas(&response.body) {
                Some(0) => return Ok(()),
                Some(replicas) => debug!(replicas, "polled controller"),
                None => debug!("unreadable controller status, polling again"),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(RolloutError::DrainTimeout {
                    name: name.to_string(),
                    waited,
                });
            }
        }
    }

    async fn delete(&self, locator: &ResourceLocator) -> Result<()> {
        let request = self.request(Method::DELETE, &locator.resource_url);
        let response = self.executor.execute(request.clone()).await?;
        self.config
            .status_policy
            .ensure(Operation::Delete, &request, response)?;
        Ok(())
    }

    async fn create(&self, locator: &ResourceLocator, manifest: &Manifest) -> Result<()> {
        let request = self
            .request(Method::POST, &locator.collection_url)
            .with_body(manifest.raw_body().to_vec(), JSON_CONTENT_TYPE);
        let response = self.executor.execute(request.clone()).await?;
        self.config
            .status_policy
            .ensure(Operation::Create, &request, response)?;
        Ok(())
    }
}

/// `status.replicas` of a controller body. The API server omits the field
/// at zero; a body that is not JSON yields `None`.
fn observed_replicas(body: &[u8]) -> Option<u64> {
    let value = serde_json::from_slice::<serde_json::Value>(body).ok()?;
    match value.pointer("/status/replicas") {
        Some(replicas) => replicas.as_u64(),
        None => Some(0),
    }
}
