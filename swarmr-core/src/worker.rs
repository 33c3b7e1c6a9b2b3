use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionSelector, ActionSet, BuildContext};
use crate::config::RunConfig;
use crate::executor::{Executed, Executor, PlannedRequest};
use crate::gate::RequestGate;
use crate::record::Action;
use crate::recorder::RecordSink;

/// Identifiers a worker remembers for later update/delete actions.
const MAX_OWNED_RESOURCES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    /// The stop condition fired; an in-flight request may still be completing.
    Stopping = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of one worker's [`WorkerState`], readable while the worker runs.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    worker_id: u64,
    state: Arc<AtomicU8>,
}

impl WorkerStatus {
    fn new(worker_id: u64) -> Self {
        Self {
            worker_id,
            state: Arc::new(AtomicU8::new(WorkerState::Running as u8)),
        }
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    // Never moves backwards.
    fn advance(&self, next: WorkerState) {
        self.state.fetch_max(next as u8, Ordering::AcqRel);
    }
}

// Marks the worker stopped however `run` exits, unwinding and abort included.
struct StoppedOnDrop(WorkerStatus);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        self.0.advance(WorkerState::Stopped);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    Deadline,
    Budget,
    SinkClosed,
    Unbuildable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: u64,
    /// Requests sent, follow-ups included.
    pub requests: u64,
    pub follow_ups: u64,
    pub stop_reason: StopReason,
}

/// Number of workers currently inside their loop.
#[derive(Debug, Clone, Default)]
pub struct ActiveWorkers(Arc<AtomicU64>);

impl ActiveWorkers {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn enter(&self) -> ActiveGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(self.0.clone())
    }
}

// Decrements on drop so aborted workers are accounted for too.
struct ActiveGuard(Arc<AtomicU64>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Everything a worker shares with its siblings.
#[derive(Debug)]
pub struct WorkerShared<E> {
    pub config: Arc<RunConfig>,
    pub actions: Arc<ActionSet>,
    pub executor: Arc<E>,
    pub gate: Arc<RequestGate>,
    pub cancel: CancellationToken,
    pub active: ActiveWorkers,
}

impl<E> Clone for WorkerShared<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            actions: self.actions.clone(),
            executor: self.executor.clone(),
            gate: self.gate.clone(),
            cancel: self.cancel.clone(),
            active: self.active.clone(),
        }
    }
}

/// One simulated client. Requests of a single worker are strictly sequential.
pub struct Worker<E> {
    id: u64,
    shared: WorkerShared<E>,
    sink: RecordSink,
    selector: ActionSelector,
    rng: StdRng,
    status: WorkerStatus,
    seq: u64,
    owned: VecDeque<String>,
    requests: u64,
    follow_ups: u64,
}

impl<E: Executor> Worker<E> {
    pub fn new(id: u64, shared: WorkerShared<E>, selector: ActionSelector, sink: RecordSink) -> Self {
        Self::with_rng(id, shared, selector, sink, StdRng::from_rng(&mut rand::rng()))
    }

    pub fn with_rng(
        id: u64,
        shared: WorkerShared<E>,
        selector: ActionSelector,
        sink: RecordSink,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            shared,
            sink,
            selector,
            rng,
            status: WorkerStatus::new(id),
            seq: 0,
            owned: VecDeque::new(),
            requests: 0,
            follow_ups: 0,
        }
    }

    /// Handle that keeps reporting this worker's state after [`Worker::run`] takes it.
    pub fn status(&self) -> WorkerStatus {
        self.status.clone()
    }

    pub async fn run(mut self) -> WorkerReport {
        let _active = self.shared.active.enter();
        let _stopped = StoppedOnDrop(self.status.clone());
        let started = Instant::now();
        let deadline = self.shared.config.stop.duration().map(|d| started + d);
        tracing::debug!(worker = self.id, "worker started");

        let stop_reason = loop {
            if let Some(reason) = self.should_stop(deadline) {
                break reason;
            }
            if !self.shared.gate.try_acquire() {
                break StopReason::Budget;
            }

            let action = self.next_action();
            let Some(planned) = self.plan(action) else {
                tracing::warn!(worker = self.id, %action, "no request builder for action");
                break StopReason::Unbuildable;
            };

            let executed = self.execute(&planned).await;
            if !self.sink.record(executed.to_record(self.id, &planned)) {
                break StopReason::SinkClosed;
            }
            self.track(&planned, &executed);

            if action == Action::CreateItem
                && (200..300).contains(&executed.status)
                && executed.error.is_none()
                && !self.follow_up(&executed).await
            {
                break StopReason::SinkClosed;
            }

            if !self.pace(deadline).await {
                break StopReason::Cancelled;
            }
        };

        self.status.advance(WorkerState::Stopping);
        tracing::debug!(
            worker = self.id,
            requests = self.requests,
            reason = %stop_reason,
            "worker stopping"
        );

        WorkerReport {
            worker_id: self.id,
            requests: self.requests,
            follow_ups: self.follow_ups,
            stop_reason,
        }
    }

    fn should_stop(&self, deadline: Option<Instant>) -> Option<StopReason> {
        if self.shared.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::Deadline);
        }
        None
    }

    fn next_action(&mut self) -> Action {
        let action = self.selector.next_action(&mut self.rng);
        if action.needs_resource() && self.owned.is_empty() {
            return Action::CreateItem;
        }
        action
    }

    fn plan(&mut self, action: Action) -> Option<PlannedRequest> {
        let resource_id = match action {
            Action::UpdateItem => self
                .owned
                .get(self.rng.random_range(0..self.owned.len().max(1)))
                .cloned(),
            // A delete consumes the id whatever the outcome.
            Action::DeleteItem => self.owned.pop_front(),
            _ => None,
        };
        self.build(action, resource_id.as_deref())
    }

    fn build(&mut self, action: Action, resource_id: Option<&str>) -> Option<PlannedRequest> {
        self.seq += 1;
        let mut ctx = BuildContext {
            worker_id: self.id,
            seq: self.seq,
            resource_id,
            rng: &mut self.rng,
        };
        self.shared.actions.build(action, &mut ctx)
    }

    /// The request always runs to completion; a stop signal seen meanwhile only marks the
    /// worker as stopping.
    async fn execute(&mut self, planned: &PlannedRequest) -> Executed {
        self.requests += 1;
        let exchange = self
            .shared
            .executor
            .execute(planned, self.shared.config.timeout);
        tokio::pin!(exchange);

        tokio::select! {
            biased;
            executed = &mut exchange => return executed,
            _ = self.shared.cancel.cancelled() => self.status.advance(WorkerState::Stopping),
        }
        exchange.await
    }

    fn track(&mut self, planned: &PlannedRequest, executed: &Executed) {
        if planned.action != Action::CreateItem || executed.error.is_some() {
            return;
        }
        if !(200..300).contains(&executed.status) {
            return;
        }
        if let Some(id) = self.shared.config.follow_up.extractor.extract(&executed.body) {
            if self.owned.len() >= MAX_OWNED_RESOURCES {
                self.owned.pop_front();
            }
            self.owned.push_back(id);
        }
    }

    /// Returns `false` only when the recorder refused the follow-up record.
    async fn follow_up(&mut self, created: &Executed) -> bool {
        let policy = &self.shared.config.follow_up;
        if policy.probability <= 0.0 || !self.rng.random_bool(policy.probability) {
            return true;
        }
        let Some(id) = policy.extractor.extract(&created.body) else {
            tracing::debug!(worker = self.id, "follow-up skipped: no identifier in response");
            return true;
        };
        let action = policy.action;

        if self.shared.cancel.is_cancelled() || !self.shared.gate.try_acquire() {
            return true;
        }
        let Some(planned) = self.build(action, Some(&id)) else {
            return true;
        };
        if action == Action::DeleteItem {
            self.owned.retain(|owned| owned != &id);
        }

        let executed = self.execute(&planned).await;
        self.follow_ups += 1;
        self.sink.record(executed.to_record(self.id, &planned))
    }

    /// Sleep for the pacing delay, clipped to the deadline. Returns `false` when cancelled.
    async fn pace(&mut self, deadline: Option<Instant>) -> bool {
        let delay = self.shared.config.delay.sample(&mut self.rng);
        if delay.is_zero() {
            // Still yield so a zero-delay worker cannot starve the runtime.
            tokio::task::yield_now().await;
            return !self.shared.cancel.is_cancelled();
        }

        let mut wake = Instant::now() + delay;
        if let Some(deadline) = deadline {
            wake = wake.min(deadline);
        }
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => true,
            _ = self.shared.cancel.cancelled() => false,
        }
    }
}
