use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::RolloutConfig;
use crate::error::{Result, RolloutError};
use crate::http::RequestExecutor;
use crate::manifest::{Manifest, ResourceKind};
use crate::notify::{DeploymentEvent, WebhookNotifier};
use crate::reconcile::{ReconciliationOutcome, Reconciler};

/// Result of reconciling one manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub file: String,
    pub name: String,
    pub kind: ResourceKind,
    pub outcome: ReconciliationOutcome,
}

#[derive(Debug)]
pub enum NotifyStatus {
    Sent,
    /// no webhook configured
    Skipped,
    Failed(RolloutError),
}

#[derive(Debug)]
pub struct PipelineReport {
    pub artifacts: Vec<ArtifactReport>,
    pub images: Vec<String>,
    pub notify: NotifyStatus,
}

/// Applies every configured manifest in order, then announces the rollout.
///
/// The first artifact that fails stops the run; nothing is notified for a
/// partial rollout. A webhook failure does not fail the run.
pub struct Pipeline {
    workspace: PathBuf,
    files: Vec<String>,
    namespace: String,
    source: String,
    target: String,
    reconciler: Reconciler,
    notifier: Option<WebhookNotifier>,
}

impl Pipeline {
    pub fn from_config(config: &RolloutConfig, executor: Arc<dyn RequestExecutor>) -> Result<Self> {
        config.validate()?;

        let notifier = config.webhook.as_ref().map(|url| {
            WebhookNotifier::new(
                url.as_str(),
                config.webhook_token.clone(),
                config.status_policy.clone(),
                executor.clone(),
            )
        });

        // controllers first, then services, each in the order given
        let files = config
            .replication_controllers
            .iter()
            .chain(config.services.iter())
            .cloned()
            .collect();

        Ok(Self {
            workspace: config.workspace().to_path_buf(),
            files,
            namespace: config.namespace.clone(),
            source: config.source.clone(),
            target: config.api_server.clone(),
            reconciler: Reconciler::new(config.reconciler_config()?, executor),
            notifier,
        })
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, artifacts = self.files.len()))]
    pub async fn run(&self) -> Result<PipelineReport> {
        let mut artifacts = Vec::with_capacity(self.files.len());
        let mut images = Vec::with_capacity(self.files.len());

        for file in &self.files {
            let manifest = Manifest::from_workspace(&self.workspace, file)?;
            let outcome = self.reconciler.reconcile(&manifest).await?;
            info!(
                %file,
                name = manifest.name(),
                existed = outcome.existed,
                "artifact deployed"
            );

            images.push(manifest.name().to_string());
            artifacts.push(ArtifactReport {
                file: file.clone(),
                name: manifest.name().to_string(),
                kind: manifest.kind().clone(),
                outcome,
            });
        }

        let notify = match &self.notifier {
            Some(notifier) => {
                let event = DeploymentEvent::new(
                    images.clone(),
                    self.namespace.as_str(),
                    self.source.as_str(),
                    self.target.as_str(),
                );
                match notifier.notify(&event).await {
                    Ok(()) => {
                        info!(url = notifier.url(), "deployment webhook sent");
                        NotifyStatus::Sent
                    }
                    Err(err) => {
                        warn!(
                            url = notifier.url(),
                            %err,
                            body = err.response_body().unwrap_or_default(),
                            "deployment webhook failed"
                        );
                        NotifyStatus::Failed(err)
                    }
                }
            }
            None => NotifyStatus::Skipped,
        };

        Ok(PipelineReport {
            artifacts,
            images,
            notify,
        })
    }
}
