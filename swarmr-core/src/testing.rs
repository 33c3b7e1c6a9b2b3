use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::executor::{Executed, Executor, PlannedRequest};
use crate::record::Action;

/// Synthetic executor for engine tests.
///
/// Creates answer 201 with `{"data":{"id":N}}` using a running counter, health checks answer
/// `health_status`, everything else answers 200.
#[derive(Debug)]
pub(crate) struct StubExecutor {
    latency: Duration,
    health_status: u16,
    create_body: Option<Bytes>,
    panic_on_call: Option<u64>,
    calls: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
    next_id: AtomicU64,
}

impl Default for StubExecutor {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            health_status: 200,
            create_body: None,
            panic_on_call: None,
            calls: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        }
    }
}

impl StubExecutor {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_health_status(mut self, status: u16) -> Self {
        self.health_status = status;
        self
    }

    /// Body returned by every create instead of the generated `{"data":{"id":N}}`.
    #[must_use]
    pub fn with_create_body(mut self, body: Bytes) -> Self {
        self.create_body = Some(body);
        self
    }

    /// Panic inside the `n`th call (1-based), counting every call including health checks.
    #[must_use]
    pub fn panicking_on_call(mut self, n: u64) -> Self {
        self.panic_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Executor for StubExecutor {
    async fn execute(&self, req: &PlannedRequest, _timeout: Duration) -> Executed {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_call == Some(call) {
            panic!("stub executor failed on call {call}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match req.action {
            Action::HealthCheck => Executed::response(self.health_status, self.latency, Bytes::new()),
            Action::CreateItem => {
                let body = self.create_body.clone().unwrap_or_else(|| {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    Bytes::from(format!(r#"{{"data":{{"id":{id}}}}}"#))
                });
                Executed::response(201, self.latency, body)
            }
            _ => Executed::response(200, self.latency, Bytes::new()),
        }
    }
}

/// Replays a fixed queue of outcomes in call order, then answers 200 with zero latency.
#[derive(Debug, Default)]
pub(crate) struct ScriptedExecutor {
    script: Mutex<VecDeque<Executed>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = Executed>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

impl Executor for ScriptedExecutor {
    async fn execute(&self, _req: &PlannedRequest, _timeout: Duration) -> Executed {
        let next = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Executed::response(200, Duration::ZERO, Bytes::new()))
    }
}
