use std::fs;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use k8_rollout::{
    DeploymentEvent, DrainWait, HttpExecutor, NotifyStatus, Pipeline, RolloutConfig,
    RolloutError, SecretString, StatusPolicy,
};

const RC_WEB: &str = r#"{
  "apiVersion": "v1",
  "kind": "ReplicationController",
  "metadata": { "name": "web" },
  "spec": { "replicas": 3 }
}"#;

const SVC_WEB: &str = r#"{
  "apiVersion": "v1",
  "kind": "Service",
  "metadata": { "name": "web-svc" },
  "spec": { "ports": [{ "port": 80 }] }
}"#;

const RC_PATH: &str = "/api/v1/namespaces/staging/replicationcontrollers";
const RC_WEB_PATH: &str = "/api/v1/namespaces/staging/replicationcontrollers/web";
const SVC_PATH: &str = "/api/v1/namespaces/staging/services";
const SVC_WEB_PATH: &str = "/api/v1/namespaces/staging/services/web-svc";

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("rc-web.json"), RC_WEB).expect("write rc");
    fs::write(dir.path().join("svc-web.json"), SVC_WEB).expect("write svc");
    dir
}

fn config(cluster: &MockServer, hooks: &MockServer, dir: &tempfile::TempDir) -> RolloutConfig {
    RolloutConfig {
        api_server: cluster.uri(),
        token: SecretString::from("cluster-token".to_string()),
        namespace: "staging".to_string(),
        replication_controllers: vec!["rc-web.json".to_string()],
        services: vec!["svc-web.json".to_string()],
        webhook: Some(format!("{}/deploy", hooks.uri())),
        webhook_token: SecretString::from("hook-token".to_string()),
        source: "github.com/acme/web".to_string(),
        workspace: Some(dir.path().to_path_buf()),
        drain: DrainWait::Fixed {
            settle: Duration::ZERO,
        },
        ..Default::default()
    }
}

fn executor() -> Arc<HttpExecutor> {
    Arc::new(HttpExecutor::new(true, Duration::from_secs(5)).expect("executor"))
}

async fn mount_webhook(hooks: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/deploy"))
        .and(header("authorization", "Bearer hook-token"))
        .respond_with(ResponseTemplate::new(200))
        .named("deployment webhook")
        .expect(times)
        .mount(hooks)
        .await;
}

#[tokio::test]
async fn test_rollout_against_http_cluster() {
    //given
    let cluster = MockServer::start().await;
    let hooks = MockServer::start().await;

    // the controller exists, the service does not
    Mock::given(method("GET"))
        .and(path(RC_WEB_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&cluster)
        .await;
    Mock::given(method("PATCH"))
        .and(path(RC_WEB_PATH))
        .and(header("content-type", "application/strategic-merge-patch+json"))
        .and(body_json(serde_json::json!({ "spec": { "replicas": 0 } })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cluster)
        .await;
    Mock::given(method("DELETE"))
        .and(path(RC_WEB_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cluster)
        .await;
    Mock::given(method("POST"))
        .and(path(RC_PATH))
        .and(body_string(RC_WEB))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cluster)
        .await;
    Mock::given(method("GET"))
        .and(path(SVC_WEB_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"reason":"NotFound"}"#))
        .expect(1)
        .mount(&cluster)
        .await;
    Mock::given(method("POST"))
        .and(path(SVC_PATH))
        .and(body_string(SVC_WEB))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cluster)
        .await;
    mount_webhook(&hooks, 1).await;

    let dir = workspace();
    let pipeline =
        Pipeline::from_config(&config(&cluster, &hooks, &dir), executor()).expect("pipeline");

    //when
    let report = pipeline.run().await.expect("rollout");

    //then
    assert_eq!(report.images, vec!["web", "web-svc"]);
    assert!(matches!(report.notify, NotifyStatus::Sent));

    let requests = cluster.received_requests().await.expect("recording enabled");
    let calls: Vec<_> = requests
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect();
    assert_eq!(
        calls,
        vec![
            format!("GET {RC_WEB_PATH}"),
            format!("PATCH {RC_WEB_PATH}"),
            format!("DELETE {RC_WEB_PATH}"),
            format!("POST {RC_PATH}"),
            format!("GET {SVC_WEB_PATH}"),
            format!("POST {SVC_PATH}"),
        ]
    );
    for request in &requests {
        assert_eq!(
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok()),
            Some("Bearer cluster-token")
        );
    }

    let webhooks = hooks.received_requests().await.expect("recording enabled");
    let event: DeploymentEvent = serde_json::from_slice(&webhooks[0].body).expect("event");
    assert_eq!(event.images, vec!["web", "web-svc"]);
    assert_eq!(event.namespace, "staging");
    assert_eq!(event.source, "github.com/acme/web");
    assert_eq!(event.target, cluster.uri());
}

#[tokio::test]
async fn test_created_status_fails_with_default_policy() {
    //given
    let cluster = MockServer::start().await;
    let hooks = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&cluster)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"kind":"Status"}"#))
        .expect(1)
        .mount(&cluster)
        .await;
    mount_webhook(&hooks, 0).await;

    let dir = workspace();
    let pipeline =
        Pipeline::from_config(&config(&cluster, &hooks, &dir), executor()).expect("pipeline");

    //when
    let err = pipeline.run().await.unwrap_err();

    //then
    assert!(matches!(err, RolloutError::UnexpectedStatus { .. }));
    assert_eq!(err.response_body(), Some(r#"{"kind":"Status"}"#));
}

#[tokio::test]
async fn test_created_status_accepted_with_kubernetes_policy() {
    let cluster = MockServer::start().await;
    let hooks = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&cluster)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(2)
        .mount(&cluster)
        .await;
    mount_webhook(&hooks, 1).await;

    let dir = workspace();
    let config = RolloutConfig {
        status_policy: StatusPolicy::kubernetes(),
        ..config(&cluster, &hooks, &dir)
    };
    let pipeline = Pipeline::from_config(&config, executor()).expect("pipeline");

    let report = pipeline.run().await.expect("rollout");

    assert_eq!(report.artifacts.len(), 2);
    assert!(report.artifacts.iter().all(|artifact| artifact.outcome.created));
}
