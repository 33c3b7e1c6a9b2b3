use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http_body_util::{BodyExt as _, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::util::{has_header, host_header_value};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Bound on TCP connect so a dead target fails every worker quickly.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

type Connector = HttpsConnector<HttpConnector>;

/// Pooled HTTP/1.1 client shared by all workers of a run. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<Connector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_nodelay(true);
        tcp.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(tcp);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    /// Send one request and read the whole response body.
    ///
    /// `req.timeout` bounds the full exchange, body read included.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let Some(limit) = req.timeout else {
            return self.exchange(req).await;
        };
        tokio::time::timeout(limit, self.exchange(req))
            .await
            .unwrap_or(Err(Error::Timeout(limit)))
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let outgoing = build_request(req)?;
        let (parts, body) = self.inner.request(outgoing).await?.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
        })
    }
}

/// Turn an [`HttpRequest`] into a hyper request, filling `host` and `content-length`
/// unless the caller set them.
fn build_request(req: HttpRequest) -> Result<http::Request<Full<Bytes>>> {
    let url = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(req.url));
    }
    let uri: http::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let mut builder = http::Request::builder().method(req.method).uri(uri);
    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(&url)
    {
        builder = builder.header(HOST, host);
    }
    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        builder = builder.header(CONTENT_LENGTH, req.body.len());
    }
    for (name, value) in &req.headers {
        builder = builder.header(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    Ok(builder.body(Full::new(req.body))?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::HttpTransportErrorKind;
    use std::time::Instant;

    #[test]
    fn build_request_fills_host_and_length() {
        let req = HttpRequest::post("http://127.0.0.1:8080/todos", Bytes::from_static(b"{}"))
            .with_header("x-run", "7");
        let built = build_request(req).unwrap();

        assert_eq!(built.method(), &http::Method::POST);
        assert_eq!(built.uri().path(), "/todos");
        assert_eq!(built.headers()[HOST], "127.0.0.1:8080");
        assert_eq!(built.headers()[CONTENT_LENGTH], "2");
        assert_eq!(built.headers()["x-run"], "7");
    }

    #[test]
    fn build_request_keeps_caller_host() {
        let req = HttpRequest::get("http://127.0.0.1:8080/").with_header("Host", "api.local");
        let built = build_request(req).unwrap();
        let hosts: Vec<_> = built
            .headers()
            .get_all(HOST)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(hosts, vec!["api.local"]);
        assert!(built.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn build_request_rejects_bad_header_name() {
        let req = HttpRequest::get("http://127.0.0.1/").with_header("bad name", "x");
        let Err(err) = build_request(req) else {
            panic!("expected header name error");
        };
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::HeaderName);
    }

    #[tokio::test]
    async fn reads_status_and_body() {
        let server = swarmr_testserver::TestServer::start().await.unwrap();
        let client = HttpClient::default();
        let res = client
            .request(HttpRequest::get(format!("{}/health", server.base_url())))
            .await
            .unwrap();
        assert_eq!(res.status, 200);
        assert!(!res.body.is_empty());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("ftp://example.com/"))
            .await
            .unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            HttpTransportErrorKind::UnsupportedScheme
        );
    }

    #[tokio::test]
    async fn rejects_garbage_url() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::InvalidUrl);
    }
}
