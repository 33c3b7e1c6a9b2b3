use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use swarmr_http::{HttpClient, HttpRequest, HttpTransportErrorKind, join_url};
use tokio::time::Instant;

use crate::record::{Action, Method, OutcomeRecord};

/// A fully resolved request, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub action: Action,
    pub method: Method,
    /// Route template used for grouping, e.g. `/todos/{id}`.
    pub endpoint: String,
    /// Concrete path sent on the wire, e.g. `/todos/42`.
    pub path: String,
    pub resource_id: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl PlannedRequest {
    pub fn new(action: Action, method: Method, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            action,
            method,
            path: endpoint.clone(),
            endpoint,
            resource_id: None,
            body: None,
        }
    }

    /// Fill `{id}` with `id`, encoded as a single path segment.
    #[must_use]
    pub fn with_resource(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.path = self.endpoint.replace("{id}", &urlencoding::encode(&id));
        self.resource_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Result of one exchange. Transport failures are data here, not errors.
#[derive(Debug, Clone)]
pub struct Executed {
    /// HTTP status, or 0 when no response arrived.
    pub status: u16,
    pub latency: Duration,
    pub error: Option<String>,
    pub error_kind: Option<HttpTransportErrorKind>,
    pub body: Bytes,
}

impl Executed {
    pub fn response(status: u16, latency: Duration, body: Bytes) -> Self {
        Self {
            status,
            latency,
            error: None,
            error_kind: None,
            body,
        }
    }

    pub fn failure(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            status: 0,
            latency,
            error: Some(error.into()),
            error_kind: None,
            body: Bytes::new(),
        }
    }

    /// A failure raised by the HTTP client, classified by its transport kind.
    pub fn transport(latency: Duration, err: &swarmr_http::Error) -> Self {
        Self {
            error_kind: Some(err.transport_error_kind()),
            ..Self::failure(latency, err.to_string())
        }
    }

    pub fn to_record(&self, worker_id: u64, req: &PlannedRequest) -> OutcomeRecord {
        let record = match &self.error {
            Some(err) => OutcomeRecord::transport_failure(
                req.action,
                req.method,
                req.endpoint.clone(),
                self.latency,
                err.clone(),
            )
            .with_error_kind(self.error_kind),
            None => OutcomeRecord::new(
                req.action,
                req.method,
                req.endpoint.clone(),
                self.status,
                self.latency,
            ),
        };
        record
            .with_worker(worker_id)
            .with_resource(req.resource_id.clone())
    }
}

/// Performs exactly one request. Implementations must never panic on transport problems.
pub trait Executor: Send + Sync + 'static {
    fn execute(
        &self,
        req: &PlannedRequest,
        timeout: Duration,
    ) -> impl Future<Output = Executed> + Send;
}

/// Production executor backed by the hyper client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: HttpClient,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(HttpClient::default(), base_url)
    }

    pub fn with_client(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn build(&self, req: &PlannedRequest, timeout: Duration) -> swarmr_http::Result<HttpRequest> {
        let url = join_url(&self.base_url, &req.path);
        let http_req =
            HttpRequest::new(req.method.as_http(), url).with_timeout(Some(timeout));
        match &req.body {
            Some(body) => http_req.with_json(body),
            None => Ok(http_req),
        }
    }
}

impl Executor for HttpExecutor {
    async fn execute(&self, req: &PlannedRequest, timeout: Duration) -> Executed {
        let http_req = match self.build(req, timeout) {
            Ok(r) => r,
            Err(err) => return Executed::transport(Duration::ZERO, &err),
        };

        let started = Instant::now();
        let res = self.client.request(http_req).await;
        let latency = started.elapsed();

        match res {
            Ok(res) => Executed::response(res.status, latency, res.body),
            Err(err) => Executed::transport(latency, &err),
        }
    }
}
