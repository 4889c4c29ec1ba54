use std::sync::Arc;

use chrono::Utc;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SecretString;
use crate::error::{Result, RolloutError};
use crate::http::{ApiRequest, JSON_CONTENT_TYPE, Operation, RequestExecutor, StatusPolicy};

/// Webhook payload describing a finished rollout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeploymentEvent {
    /// milliseconds since the unix epoch
    pub timestamp: i64,
    pub images: Vec<String>,
    pub namespace: String,
    pub source: String,
    pub target: String,
}

impl DeploymentEvent {
    pub fn new(
        images: Vec<String>,
        namespace: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            images,
            namespace: namespace.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

pub struct WebhookNotifier {
    url: String,
    token: SecretString,
    policy: StatusPolicy,
    executor: Arc<dyn RequestExecutor>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        token: SecretString,
        policy: StatusPolicy,
        executor: Arc<dyn RequestExecutor>,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            policy,
            executor,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs the event once. Every failure comes back wrapped in `Notify`.
    #[instrument(skip(self, event), fields(url = %self.url, images = event.images.len()))]
    pub async fn notify(&self, event: &DeploymentEvent) -> Result<()> {
        self.send(event)
            .await
            .map_err(|err| RolloutError::Notify(Box::new(err)))
    }

    async fn send(&self, event: &DeploymentEvent) -> Result<()> {
        let body = serde_json::to_vec(event)?;
        let request = ApiRequest::new(Method::POST, self.url.as_str(), self.token.clone())
            .with_body(body, JSON_CONTENT_TYPE);
        let response = self.executor.execute(request.clone()).await?;
        let response = self.policy.ensure(Operation::Notify, &request, response)?;
        debug!(status = %response.status, "webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use pretty_assertions::assert_eq;

    use crate::http::{ApiResponse, MockRequestExecutor};

    use super::*;

    fn event() -> DeploymentEvent {
        DeploymentEvent {
            timestamp: 1_700_000_000_000,
            images: vec!["web".to_string(), "web-svc".to_string()],
            namespace: "prod".to_string(),
            source: "ci".to_string(),
            target: "https://k8s.local".to_string(),
        }
    }

    #[test]
    fn test_event_json_keys() {
        let json = serde_json::to_value(event()).expect("json");

        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": 1_700_000_000_000_i64,
                "images": ["web", "web-svc"],
                "namespace": "prod",
                "source": "ci",
                "target": "https://k8s.local",
            })
        );
    }

    #[test]
    fn test_new_event_is_stamped_now() {
        let before = Utc::now().timestamp_millis();

        let event = DeploymentEvent::new(vec![], "default", "", "https://k8s.local");

        assert!(event.timestamp >= before);
        assert!(event.timestamp <= Utc::now().timestamp_millis());
    }

    #[tokio::test]
    async fn test_notify_posts_event_with_bearer_token() {
        //given
        let mut mock = MockRequestExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|req| {
                assert_eq!(req.method, Method::POST);
                assert_eq!(req.url, "https://hooks.local/deploy");
                assert_eq!(&*req.token, "hook-token");
                assert_eq!(req.content_type, JSON_CONTENT_TYPE);
                let sent: DeploymentEvent =
                    serde_json::from_slice(req.body.as_deref().expect("body")).expect("json");
                assert_eq!(sent, event());
                Ok(ApiResponse::new(StatusCode::OK, ""))
            });
        let notifier = WebhookNotifier::new(
            "https://hooks.local/deploy",
            SecretString::from("hook-token".to_string()),
            StatusPolicy::default(),
            Arc::new(mock),
        );

        //when
        let result = notifier.notify(&event()).await;

        //then
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_notify_failure_is_wrapped() {
        let mut mock = MockRequestExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(StatusCode::BAD_GATEWAY, "upstream down")));
        let notifier = WebhookNotifier::new(
            "https://hooks.local/deploy",
            SecretString::default(),
            StatusPolicy::default(),
            Arc::new(mock),
        );

        let err = notifier.notify(&event()).await.unwrap_err();

        assert!(matches!(err, RolloutError::Notify(_)));
        assert_eq!(err.response_body(), Some("upstream down"));
    }
}
