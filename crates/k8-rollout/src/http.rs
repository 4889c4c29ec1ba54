//! Single authenticated HTTP exchanges with the API server and webhook.
//!
//! Requests go through the [`RequestExecutor`] trait so the reconciler can
//! be driven against a scripted executor. Whether a response counts as a
//! success is not decided here: callers check it against a [`StatusPolicy`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use crate::config::SecretString;
use crate::error::{Result, RolloutError};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const STRATEGIC_MERGE_PATCH_CONTENT_TYPE: &str = "application/strategic-merge-patch+json";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Step of the rollout a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Drain,
    Delete,
    Create,
    Notify,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Exists => "exists",
            Self::Drain => "drain",
            Self::Delete => "delete",
            Self::Create => "create",
            Self::Notify => "notify",
        };
        f.write_str(name)
    }
}

fn only_ok() -> Vec<u16> {
    vec![StatusCode::OK.as_u16()]
}

/// Status codes accepted as success, per operation.
///
/// The default accepts only `200 OK` everywhere, which is stricter than what
/// a real API server answers for creates (`201`) and some deletes (`202`).
/// Use [`StatusPolicy::kubernetes`] or the config file to widen it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusPolicy {
    #[serde(default = "only_ok")]
    pub exists: Vec<u16>,
    #[serde(default = "only_ok")]
    pub drain: Vec<u16>,
    #[serde(default = "only_ok")]
    pub delete: Vec<u16>,
    #[serde(default = "only_ok")]
    pub create: Vec<u16>,
    #[serde(default = "only_ok")]
    pub notify: Vec<u16>,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            exists: only_ok(),
            drain: only_ok(),
            delete: only_ok(),
            create: only_ok(),
            notify: only_ok(),
        }
    }
}

impl StatusPolicy {
    /// Codes the Kubernetes API server actually uses for each verb
    pub fn kubernetes() -> Self {
        Self {
            exists: vec![200],
            drain: vec![200],
            delete: vec![200, 202],
            create: vec![200, 201, 202],
            notify: (200..300).collect(),
        }
    }

    pub fn codes(&self, operation: Operation) -> &[u16] {
        match operation {
            Operation::Exists => &self.exists,
            Operation::Drain => &self.drain,
            Operation::Delete => &self.delete,
            Operation::Create => &self.create,
            Operation::Notify => &self.notify,
        }
    }

    pub fn accepts(&self, operation: Operation, status: StatusCode) -> bool {
        self.codes(operation).contains(&status.as_u16())
    }

    /// Turns a response outside the accepted set into `UnexpectedStatus`.
    pub fn ensure(
        &self,
        operation: Operation,
        request: &ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse> {
        if self.accepts(operation, response.status) {
            Ok(response)
        } else {
            Err(RolloutError::UnexpectedStatus {
                operation,
                method: request.method.clone(),
                url: request.url.clone(),
                status: response.status,
                body: response.body_text(),
            })
        }
    }
}

/// One request envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub token: SecretString,
    pub body: Option<Vec<u8>>,
    pub content_type: &'static str,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>, token: SecretString) -> Self {
        Self {
            method,
            url: url.into(),
            token,
            body: None,
            content_type: JSON_CONTENT_TYPE,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: &'static str) -> Self {
        self.body = Some(body);
        self.content_type = content_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues a single request and returns whatever status the server answered.
///
/// Only transport failures are errors at this level.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// reqwest backed executor.
///
/// Certificate validation is turned off: the API server is expected to be an
/// internal endpoint with a self-signed certificate. Anyone able to
/// intercept traffic to it can read the bearer token.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    debug: bool,
}

impl HttpExecutor {
    pub fn new(debug: bool, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(RolloutError::HttpClient)?;
        Ok(Self { client, debug })
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    #[instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url)
    )]
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        if self.debug {
            let body = request
                .body
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            debug!(%body, "HTTP request");
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .bearer_auth(&*request.token);
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, request.content_type).body(body);
        }

        let transport = |source| RolloutError::Transport {
            method: request.method.clone(),
            url: request.url.clone(),
            source,
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        // drain the body so the connection goes back to the pool
        let body = response.bytes().await.map_err(transport)?.to_vec();

        trace!(%status, len = body.len(), "HTTP response");
        if self.debug {
            debug!(%status, body = %String::from_utf8_lossy(&body), "HTTP response");
        }

        Ok(ApiResponse { status, body })
    }
}
