use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionSet, BuildContext};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::gate::RequestGate;
use crate::progress::{LiveMetrics, ProgressFn, ProgressUpdate};
use crate::record::{Action, OutcomeRecord, unix_millis};
use crate::recorder::{RecordLog, Recorder};
use crate::summary::{SummaryReport, aggregate};
use crate::worker::{ActiveWorkers, Worker, WorkerReport, WorkerShared, WorkerState, WorkerStatus};

/// Frozen result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: SummaryReport,
    pub records: Vec<OutcomeRecord>,
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    /// An external cancellation ended the run early.
    pub cancelled: bool,
    /// Workers aborted after the shutdown grace ran out.
    pub stragglers: u64,
    /// Workers that panicked. Their earlier records are kept; the in-flight one is lost.
    pub panicked: u64,
}

/// Worker counts `start, start + step, ...` up to and including `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPlan {
    pub start: u64,
    pub step: u64,
    pub max: u64,
    pub pause: Duration,
}

impl SweepPlan {
    pub fn validate(&self) -> Result<()> {
        if self.start == 0 {
            return Err(Error::InvalidSweep("start"));
        }
        if self.step == 0 {
            return Err(Error::InvalidSweep("step"));
        }
        if self.max < self.start {
            return Err(Error::InvalidSweep("max"));
        }
        Ok(())
    }

    pub fn worker_counts(&self) -> Vec<u64> {
        if self.step == 0 || self.start > self.max {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut n = self.start;
        while n <= self.max {
            out.push(n);
            let Some(next) = n.checked_add(self.step) else {
                break;
            };
            n = next;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct SweepStep {
    pub workers: u64,
    pub outcome: RunOutcome,
}

/// Owns the worker pool for a run: spawns, stops and joins it.
pub struct RunController<E> {
    executor: Arc<E>,
    actions: Arc<ActionSet>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl<E: Executor> RunController<E> {
    pub fn new(executor: E, actions: ActionSet) -> Self {
        Self {
            executor: Arc::new(executor),
            actions: Arc::new(actions),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Runs stop early (with partial results) once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn executor(&self) -> Arc<E> {
        self.executor.clone()
    }

    /// Single health request; anything but a 200 refuses the run.
    pub async fn preflight(&self, cfg: &RunConfig) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = BuildContext {
            worker_id: 0,
            seq: 0,
            resource_id: None,
            rng: &mut rng,
        };
        let req = self
            .actions
            .build(Action::HealthCheck, &mut ctx)
            .ok_or(Error::UnsupportedAction(Action::HealthCheck))?;

        let out = self.executor.execute(&req, cfg.timeout).await;
        match (out.error, out.status) {
            (Some(err), _) => Err(Error::TargetUnhealthy(err)),
            (None, 200) => {
                tracing::info!(url = %cfg.target, latency = ?out.latency, "target is healthy");
                Ok(())
            }
            (None, status) => Err(Error::TargetUnhealthy(format!(
                "health check {} returned status {status}",
                req.path
            ))),
        }
    }

    pub async fn run(&self, cfg: &RunConfig) -> Result<RunOutcome> {
        cfg.validate()?;
        self.actions.validate_plan(&cfg.plan)?;
        if cfg.health_check {
            self.preflight(cfg).await?;
        }
        self.execute(cfg).await
    }

    /// Repeat the run for every worker count of `plan`, each with fresh state.
    ///
    /// A cancellation ends the sweep after the current step; finished steps are kept.
    pub async fn sweep(&self, cfg: &RunConfig, plan: &SweepPlan) -> Result<Vec<SweepStep>> {
        plan.validate()?;
        cfg.validate()?;
        self.actions.validate_plan(&cfg.plan)?;
        if cfg.health_check {
            self.preflight(cfg).await?;
        }

        let counts = plan.worker_counts();
        let mut steps = Vec::with_capacity(counts.len());
        for (i, workers) in counts.iter().copied().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if i > 0 && !plan.pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(plan.pause) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }

            tracing::info!(step = i + 1, steps = counts.len(), workers, "sweep step starting");
            let step_cfg = cfg.clone().with_workers(workers);
            let outcome = self.execute(&step_cfg).await?;
            let cancelled = outcome.cancelled;
            steps.push(SweepStep { workers, outcome });
            if cancelled {
                break;
            }
        }
        Ok(steps)
    }

    async fn execute(&self, cfg: &RunConfig) -> Result<RunOutcome> {
        let selectors = (1..=cfg.workers)
            .map(|id| cfg.plan.selector_for(id, cfg.workers).map(|sel| (id, sel)))
            .collect::<Result<Vec<_>>>()?;
        let cancel = self.cancel.child_token();
        let recorder = Recorder::start();
        let shared = WorkerShared {
            config: Arc::new(cfg.clone()),
            actions: self.actions.clone(),
            executor: self.executor.clone(),
            gate: Arc::new(RequestGate::new(cfg.stop.requests())),
            cancel: cancel.clone(),
            active: ActiveWorkers::default(),
        };

        tracing::info!(
            url = %cfg.target,
            workers = cfg.workers,
            stop = ?cfg.stop,
            "run starting"
        );

        let started = Instant::now();
        let started_at_ms = unix_millis();

        let mut set = JoinSet::new();
        let mut statuses: Vec<WorkerStatus> = Vec::with_capacity(selectors.len());
        for (id, selector) in selectors {
            let worker = Worker::new(id, shared.clone(), selector, recorder.sink());
            statuses.push(worker.status());
            set.spawn(worker.run());
        }

        let ticker = self.progress.clone().map(|progress| {
            ProgressTicker::spawn(progress, recorder.log(), shared.active.clone(), cfg, started)
        });

        let mut reports = Vec::with_capacity(set.len());
        let mut panicked = 0u64;
        let deadline = cfg.stop.duration().map(|d| started + d);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until_opt(deadline) => break,
                joined = set.join_next() => match joined {
                    Some(res) => collect(res, &mut reports, &mut panicked),
                    None => break,
                },
            }
        }

        let cancelled = self.cancel.is_cancelled();
        cancel.cancel();

        let drained = tokio::time::timeout(cfg.grace, async {
            while let Some(res) = set.join_next().await {
                collect(res, &mut reports, &mut panicked);
            }
        })
        .await;

        let mut stragglers = 0u64;
        if drained.is_err() {
            stragglers = set.len() as u64;
            let stuck: Vec<String> = statuses
                .iter()
                .filter(|s| s.get() != WorkerState::Stopped)
                .map(|s| format!("{}:{}", s.worker_id(), s.get()))
                .collect();
            tracing::warn!(
                stragglers,
                grace = ?cfg.grace,
                workers = ?stuck,
                "workers did not stop within the shutdown grace; aborting them"
            );
            set.abort_all();
            while let Some(res) = set.join_next().await {
                collect(res, &mut reports, &mut panicked);
            }
        }

        let elapsed = started.elapsed();
        let finished_at_ms = unix_millis();
        if let Some(ticker) = ticker {
            ticker.stop().await;
        }
        let records = recorder.finish().await;

        reports.sort_by_key(|r| r.worker_id);
        let report = aggregate(&records, elapsed);
        tracing::info!(
            requests = report.total_requests,
            success_rate = report.success_rate,
            elapsed = ?elapsed,
            cancelled,
            panicked,
            "run finished"
        );

        Ok(RunOutcome {
            report,
            records,
            workers: reports,
            elapsed,
            started_at_ms,
            finished_at_ms,
            cancelled,
            stragglers,
            panicked,
        })
    }
}

fn collect(
    res: std::result::Result<WorkerReport, JoinError>,
    reports: &mut Vec<WorkerReport>,
    panicked: &mut u64,
) {
    match res {
        Ok(report) => reports.push(report),
        Err(err) if err.is_panic() => {
            tracing::warn!(error = %err, "worker panicked; keeping its earlier records");
            *panicked += 1;
        }
        // Aborted stragglers.
        Err(_) => {}
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct ProgressTicker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    fn spawn(
        progress: ProgressFn,
        log: RecordLog,
        active: ActiveWorkers,
        cfg: &RunConfig,
        started: Instant,
    ) -> Self {
        let stop = CancellationToken::new();
        let stop_ticker = stop.clone();
        let every = cfg.progress_interval.max(Duration::from_millis(10));
        let duration = cfg.stop.duration();
        let budget = cfg.stop.requests();
        let workers = cfg.workers;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut tick: u64 = 0;
            let mut last_at = started;
            let mut seen = 0usize;
            let mut metrics = LiveMetrics::default();

            loop {
                tokio::select! {
                    _ = stop_ticker.cancelled() => return,
                    _ = interval.tick() => {}
                }

                tick = tick.saturating_add(1);
                let now = Instant::now();
                let dt = now.duration_since(last_at);
                last_at = now;

                let fresh = log.since(seen);
                seen += fresh.len();
                metrics.advance(&fresh, dt);

                progress(ProgressUpdate {
                    tick,
                    elapsed: now.duration_since(started),
                    duration,
                    budget,
                    workers,
                    active_workers: active.get(),
                    metrics: metrics.clone(),
                });
            }
        });

        Self { stop, handle }
    }

    async fn stop(self) {
        self.stop.cancel();
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            tracing::warn!(error = %err, "progress callback panicked");
        }
    }
}
