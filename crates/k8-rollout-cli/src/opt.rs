use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::FalseyValueParser;

use k8_rollout::{DrainWait, RolloutConfig, SecretString, StatusPolicy};
use k8_rollout::reconcile::{DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_DRAIN_POLL_TIMEOUT};

/// Replace ReplicationControllers and Services on a Kubernetes cluster,
/// then announce the rollout to a webhook
#[derive(Debug, Parser)]
#[command(name = "k8-rollout", max_term_width = 100)]
pub struct RolloutOpt {
    /// YAML or JSON file with the rollout settings; flags override it
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Kubernetes API server base URL
    #[arg(long = "apiserver", env = "PLUGIN_APISERVER", value_name = "URL")]
    pub api_server: Option<String>,

    /// Bearer token for the API server
    #[arg(long, env = "PLUGIN_TOKEN", hide_env_values = true)]
    pub token: Option<SecretString>,

    #[arg(long, env = "PLUGIN_NAMESPACE")]
    pub namespace: Option<String>,

    /// ReplicationController manifests, comma separated
    #[arg(
        long = "replicationcontrollers",
        env = "PLUGIN_REPLICATIONCONTROLLERS",
        value_delimiter = ',',
        value_name = "FILES"
    )]
    pub replication_controllers: Vec<String>,

    /// Service manifests, comma separated
    #[arg(long, env = "PLUGIN_SERVICES", value_delimiter = ',', value_name = "FILES")]
    pub services: Vec<String>,

    /// URL that receives the deployment event
    #[arg(long, env = "PLUGIN_WEBHOOK", value_name = "URL")]
    pub webhook: Option<String>,

    #[arg(long, env = "PLUGIN_WEBHOOK_TOKEN", hide_env_values = true)]
    pub webhook_token: Option<SecretString>,

    /// Reported as the event source, usually the repository
    #[arg(long, env = "PLUGIN_SOURCE")]
    pub source: Option<String>,

    /// Directory manifest paths are relative to
    #[arg(long, env = "DRONE_WORKSPACE", value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Log request and response details
    #[arg(long, env = "PLUGIN_DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Fixed wait after scaling a controller to zero, e.g. "5s"
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with_all = ["poll_interval", "poll_timeout"])]
    pub settle: Option<Duration>,

    /// Poll the controller after scaling it down instead of sleeping
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up polling a draining controller after this long
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_timeout: Option<Duration>,

    /// Also accept 201/202 and other statuses a real API server returns
    #[arg(long)]
    pub kubernetes_status: bool,

    /// Timeout for each HTTP request
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl RolloutOpt {
    /// Loads the config file, if any, and lays the command line over it
    pub fn into_config(self) -> anyhow::Result<RolloutConfig> {
        let config = match &self.config {
            Some(path) => RolloutConfig::from_file(path.clone())?,
            None => RolloutConfig::default(),
        };
        Ok(self.merge(config))
    }

    fn merge(self, mut config: RolloutConfig) -> RolloutConfig {
        if let Some(api_server) = self.api_server {
            config.api_server = api_server;
        }
        if let Some(token) = self.token {
            config.token = token;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if !self.replication_controllers.is_empty() {
            config.replication_controllers = without_blanks(self.replication_controllers);
        }
        if !self.services.is_empty() {
            config.services = without_blanks(self.services);
        }
        if let Some(webhook) = self.webhook.filter(|url| !url.trim().is_empty()) {
            config.webhook = Some(webhook);
        }
        if let Some(token) = self.webhook_token {
            config.webhook_token = token;
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(workspace) = self.workspace {
            config.workspace = Some(workspace);
        }
        config.debug |= self.debug;

        if let Some(settle) = self.settle {
            config.drain = DrainWait::Fixed { settle };
        } else if self.poll_interval.is_some() || self.poll_timeout.is_some() {
            let (interval, timeout) = match config.drain {
                DrainWait::Poll { interval, timeout } => (interval, timeout),
                DrainWait::Fixed { .. } => (DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_DRAIN_POLL_TIMEOUT),
            };
            config.drain = DrainWait::Poll {
                interval: self.poll_interval.unwrap_or(interval),
                timeout: self.poll_timeout.unwrap_or(timeout),
            };
        }

        if self.kubernetes_status {
            config.status_policy = StatusPolicy::kubernetes();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        config
    }
}

// "a.json,,b.json" and a trailing comma come from sloppy CI settings
fn without_blanks(files: Vec<String>) -> Vec<String> {
    files
        .into_iter()
        .map(|file| file.trim().to_string())
        .filter(|file| !file.is_empty())
        .collect()
}
