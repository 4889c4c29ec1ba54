use std::convert::Infallible;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, RolloutError};
use crate::http::{DEFAULT_REQUEST_TIMEOUT, StatusPolicy};
use crate::reconcile::{DEFAULT_NAMESPACE, DrainWait, ReconcilerConfig};

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// Everything one rollout run needs.
///
/// Read from a YAML (or JSON) file; the command line fills in or overrides
/// individual fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RolloutConfig {
    /// API server base URL
    #[serde(rename = "apiserver", default)]
    pub api_server: String,

    #[serde(default)]
    pub token: SecretString,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// ReplicationController manifest files, relative to the workspace
    #[serde(rename = "replicationcontrollers", default)]
    pub replication_controllers: Vec<String>,

    /// Service manifest files, relative to the workspace
    #[serde(default)]
    pub services: Vec<String>,

    #[serde(default)]
    pub webhook: Option<String>,

    #[serde(default)]
    pub webhook_token: SecretString,

    /// Reported as `source` in the deployment event
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub drain: DrainWait,

    #[serde(default)]
    pub status_policy: StatusPolicy,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            api_server: String::new(),
            token: SecretString::default(),
            namespace: default_namespace(),
            replication_controllers: Vec::new(),
            services: Vec::new(),
            webhook: None,
            webhook_token: SecretString::default(),
            source: String::new(),
            debug: false,
            workspace: None,
            drain: DrainWait::default(),
            status_policy: StatusPolicy::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RolloutConfig {
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let mut file = File::open(path.into())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Self = serde_yaml::from_str(&contents)?;

        debug!("Using rollout config {config:#?}");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_server.trim().is_empty() {
            return Err(RolloutError::config("apiserver is required"));
        }
        if self.namespace.trim().is_empty() {
            return Err(RolloutError::config("namespace must not be empty"));
        }
        if let Some(webhook) = &self.webhook {
            if webhook.trim().is_empty() {
                return Err(RolloutError::config("webhook url must not be empty"));
            }
        }
        Ok(())
    }

    /// Directory manifests are resolved against; defaults to the current one
    pub fn workspace(&self) -> &Path {
        self.workspace.as_deref().unwrap_or_else(|| Path::new("."))
    }

    pub fn reconciler_config(&self) -> Result<ReconcilerConfig> {
        ReconcilerConfig::builder()
            .api_server(self.api_server.clone())
            .namespace(self.namespace.clone())
            .token(self.token.clone())
            .drain(self.drain.clone())
            .status_policy(self.status_policy.clone())
            .build()
    }
}

#[derive(Default, Clone, PartialEq, Eq, Deserialize)]
/// Wrapper for string that does not reveal its internal
/// content in its display and debug implementation
pub struct SecretString(String);

impl SecretString {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl FromStr for SecretString {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.into()))
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Deref for SecretString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
