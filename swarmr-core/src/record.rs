use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use swarmr_http::HttpTransportErrorKind;

/// What a single request was meant to do against the target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[strum(to_string = "health_check", serialize = "health")]
    HealthCheck,
    #[strum(to_string = "list_items", serialize = "list")]
    ListItems,
    #[strum(to_string = "create_item", serialize = "create")]
    CreateItem,
    #[strum(to_string = "update_item", serialize = "update")]
    UpdateItem,
    #[strum(to_string = "delete_item", serialize = "delete")]
    DeleteItem,
    #[strum(to_string = "stats")]
    Stats,
    #[strum(to_string = "custom")]
    Custom,
}

impl Action {
    /// Actions that address an existing resource by identifier.
    pub fn needs_resource(self) -> bool {
        matches!(self, Self::UpdateItem | Self::DeleteItem)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Patch => http::Method::PATCH,
            Self::Delete => http::Method::DELETE,
        }
    }
}

/// Status code used when the exchange failed below HTTP (refused, timed out, bad URL).
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// One completed request attempt.
///
/// Success is never stored; it is derived from `status_code` and `error` every time it is
/// read, including for records loaded back from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct OutcomeRecord {
    pub action: Action,
    pub method: Method,
    /// Route template, e.g. `/todos/{id}`.
    pub endpoint: String,
    pub resource_id: Option<String>,
    pub status_code: u16,
    pub latency_ms: f64,
    pub error: Option<String>,
    /// Class of the transport failure, when the client reported one.
    pub error_kind: Option<HttpTransportErrorKind>,
    /// Completion time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub worker_id: u64,
}

impl OutcomeRecord {
    pub fn new(
        action: Action,
        method: Method,
        endpoint: impl Into<String>,
        status_code: u16,
        latency: Duration,
    ) -> Self {
        Self {
            action,
            method,
            endpoint: endpoint.into(),
            resource_id: None,
            status_code,
            latency_ms: latency.as_nanos() as f64 / 1_000_000.0,
            error: None,
            error_kind: None,
            timestamp_ms: unix_millis(),
            worker_id: 0,
        }
    }

    pub fn transport_failure(
        action: Action,
        method: Method,
        endpoint: impl Into<String>,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(action, method, endpoint, TRANSPORT_FAILURE_STATUS, latency);
        record.error = Some(error.into());
        record
    }

    #[must_use]
    pub fn with_worker(mut self, worker_id: u64) -> Self {
        self.worker_id = worker_id;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    #[must_use]
    pub fn with_error_kind(mut self, kind: Option<HttpTransportErrorKind>) -> Self {
        self.error_kind = kind;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (200..=399).contains(&self.status_code)
    }

    pub fn is_transport_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Serialize, Deserialize)]
struct RecordRepr {
    action: Action,
    method: Method,
    endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_id: Option<String>,
    status_code: u16,
    latency_ms: f64,
    // Written for readers of the file; ignored on load.
    #[serde(default)]
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<HttpTransportErrorKind>,
    timestamp_ms: u64,
    worker_id: u64,
}

impl From<RecordRepr> for OutcomeRecord {
    fn from(r: RecordRepr) -> Self {
        Self {
            action: r.action,
            method: r.method,
            endpoint: r.endpoint,
            resource_id: r.resource_id,
            status_code: r.status_code,
            latency_ms: r.latency_ms,
            error: r.error,
            error_kind: r.error_kind,
            timestamp_ms: r.timestamp_ms,
            worker_id: r.worker_id,
        }
    }
}

impl From<OutcomeRecord> for RecordRepr {
    fn from(r: OutcomeRecord) -> Self {
        Self {
            succeeded: r.succeeded(),
            action: r.action,
            method: r.method,
            endpoint: r.endpoint,
            resource_id: r.resource_id,
            status_code: r.status_code,
            latency_ms: r.latency_ms,
            error: r.error,
            error_kind: r.error_kind,
            timestamp_ms: r.timestamp_ms,
            worker_id: r.worker_id,
        }
    }
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ok(status: u16) -> OutcomeRecord {
        OutcomeRecord::new(
            Action::ListItems,
            Method::Get,
            "/todos",
            status,
            Duration::from_millis(5),
        )
    }

    #[test]
    fn success_follows_status_class() {
        assert!(ok(200).succeeded());
        assert!(ok(201).succeeded());
        assert!(ok(302).succeeded());
        assert!(ok(399).succeeded());
        assert!(!ok(400).succeeded());
        assert!(!ok(500).succeeded());
        assert!(!ok(199).succeeded());
    }

    #[test]
    fn transport_failure_is_never_success() {
        let r = OutcomeRecord::transport_failure(
            Action::HealthCheck,
            Method::Get,
            "/health",
            Duration::from_millis(3),
            "connection refused",
        );
        assert_eq!(r.status_code, TRANSPORT_FAILURE_STATUS);
        assert!(!r.succeeded());
        assert!(r.is_transport_failure());

        let r = r.with_error_kind(Some(HttpTransportErrorKind::Connect));
        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out["error_kind"], "connect");
        let back: OutcomeRecord = serde_json::from_value(out).unwrap();
        assert_eq!(back.error_kind, Some(HttpTransportErrorKind::Connect));
    }

    #[test]
    fn loading_recomputes_success() {
        let json = r#"{
            "action": "create_item",
            "method": "POST",
            "endpoint": "/todos",
            "status_code": 500,
            "latency_ms": 12.5,
            "succeeded": true,
            "timestamp_ms": 1,
            "worker_id": 4
        }"#;
        let r: OutcomeRecord = serde_json::from_str(json).unwrap();
        assert!(!r.succeeded());
        assert_eq!(r.method, Method::Post);
        assert_eq!(r.worker_id, 4);

        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out["succeeded"], false);
    }

    #[test]
    fn action_names_parse_short_and_long() {
        assert_eq!("create".parse::<Action>().unwrap(), Action::CreateItem);
        assert_eq!("create_item".parse::<Action>().unwrap(), Action::CreateItem);
        assert_eq!("health".parse::<Action>().unwrap(), Action::HealthCheck);
        assert_eq!(Action::UpdateItem.to_string(), "update_item");
        assert!("nope".parse::<Action>().is_err());
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
