use anyhow::Context as _;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use swarmr_core::{
    ActionPlan, ActionSet, Advisory, DelayRange, EndpointMap, FollowUpPolicy, HttpExecutor,
    JsonPointerExtractor, OutcomeRecord, ProcessProbe, ResourceMonitor, RunConfig, RunController,
    RunOutcome, StopBound, SummaryReport, SweepPlan, SweepStep,
};
use tokio_util::sync::CancellationToken;

use crate::cli::{RunArgs, SweepArgs, TargetArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

const DEFAULT_DURATION: std::time::Duration = std::time::Duration::from_secs(30);

/// Validated inputs of a run, assembled from CLI flags.
pub(crate) struct Prepared {
    pub config: RunConfig,
    pub actions: ActionSet,
}

pub(crate) fn prepare(args: &TargetArgs) -> Result<Prepared, RunError> {
    let endpoints = EndpointMap {
        health: args.health_path.clone(),
        list: args.list_path.clone(),
        create: args.create_path.clone(),
        item: args.item_path.clone(),
        stats: args.stats_path.clone(),
        custom: args.custom.clone(),
    };
    endpoints.validate()?;

    if !args.id_pointer.is_empty() && !args.id_pointer.starts_with('/') {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "invalid --id-pointer '{}' (a JSON pointer starts with '/')",
            args.id_pointer
        )));
    }

    let plan = if let Some(action) = args.action {
        ActionPlan::Fixed(action)
    } else if let Some(mix) = &args.mix {
        ActionPlan::Weighted(mix.0.clone())
    } else if let Some(split) = &args.split {
        ActionPlan::PerWorker(split.0.clone())
    } else if !args.sequence.is_empty() {
        ActionPlan::Sequence(args.sequence.clone())
    } else {
        ActionPlan::default()
    };

    let stop = match args.requests {
        Some(n) => StopBound::Requests(n),
        None => StopBound::Duration(args.duration.unwrap_or(DEFAULT_DURATION)),
    };

    let follow_up = FollowUpPolicy {
        probability: args.follow_up_probability,
        extractor: Arc::new(JsonPointerExtractor::new(args.id_pointer.clone())),
        ..FollowUpPolicy::default()
    };

    let config = RunConfig::new(args.target.trim_end_matches('/'))
        .with_workers(args.workers)
        .with_stop(stop)
        .with_plan(plan)
        .with_delay(DelayRange::new(args.delay.min, args.delay.max)?)
        .with_timeout(args.timeout)
        .with_follow_up(follow_up)
        .with_grace(args.grace)
        .with_health_check(!args.skip_health_check);
    config.validate()?;

    let actions = ActionSet::todo_api(endpoints);
    actions.validate_plan(&config.plan)?;

    Ok(Prepared { config, actions })
}

pub(crate) async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let Prepared { config, actions } = prepare(&args.target)?;
    let out = output::formatter(args.target.output);
    out.print_header(&config, None);

    let controller = controller(&config, actions, out.as_ref());
    let monitor = start_monitor(&args.target);

    let result = controller.run(&config).await;
    let samples = monitor.map(ResourceMonitor::stop).unwrap_or_default();
    let mut outcome = result?;

    annotate(&mut outcome, &samples, &args.target);
    out.print_summary(&outcome).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.target.out {
        let file = RunFile::new(&config, &outcome);
        write_json(path, &file)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    worker_faults(outcome.panicked)
}

pub(crate) async fn sweep(args: SweepArgs) -> Result<ExitCode, RunError> {
    let Prepared { config, actions } = prepare(&args.target)?;
    let plan = SweepPlan {
        start: args.start,
        step: args.step,
        max: args.max,
        pause: args.pause,
    };
    plan.validate()?;

    let out = output::formatter(args.target.output);
    out.print_header(&config, Some(&plan));

    let controller = controller(&config, actions, out.as_ref());
    let monitor = start_monitor(&args.target);

    let result = controller.sweep(&config, &plan).await;
    let samples = monitor.map(ResourceMonitor::stop).unwrap_or_default();
    let mut steps = result?;

    for step in &mut steps {
        annotate(&mut step.outcome, &samples, &args.target);
    }
    out.print_sweep(&steps).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.target.out {
        let file = SweepFile {
            config: &config,
            start: plan.start,
            step: plan.step,
            max: plan.max,
            steps: steps.iter().map(SweepFileStep::new).collect(),
        };
        write_json(path, &file)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    worker_faults(steps.iter().map(|s| s.outcome.panicked).sum())
}

/// Results are reported and persisted first; panicked workers then fail the invocation.
fn worker_faults(panicked: u64) -> Result<ExitCode, RunError> {
    if panicked == 0 {
        return Ok(ExitCode::Success);
    }
    Err(RunError::RuntimeError(anyhow::anyhow!(
        "{panicked} worker(s) panicked during the run; the reported results are partial"
    )))
}

fn controller(
    config: &RunConfig,
    actions: ActionSet,
    out: &dyn output::OutputFormatter,
) -> RunController<HttpExecutor> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut controller = RunController::new(HttpExecutor::new(config.target.clone()), actions)
        .with_cancel_token(cancel);
    if let Some(progress) = out.progress() {
        controller = controller.with_progress(progress);
    }
    controller
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    tracing::warn!("interrupt received; stopping workers");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });
}

fn start_monitor(args: &TargetArgs) -> Option<ResourceMonitor> {
    if args.monitor.is_empty() {
        return None;
    }
    tracing::info!(filters = ?args.monitor, interval = ?args.monitor_interval, "resource monitor starting");
    Some(ResourceMonitor::start(
        ProcessProbe::new(args.monitor.clone()),
        args.monitor_interval,
    ))
}

fn annotate(outcome: &mut RunOutcome, samples: &[swarmr_core::ResourceSample], args: &TargetArgs) {
    if args.monitor.is_empty() {
        return;
    }
    swarmr_core::annotate_resources(
        &mut outcome.report,
        samples,
        outcome.started_at_ms,
        outcome.finished_at_ms,
        args.monitor_interval,
    );
}

#[derive(Debug, Serialize)]
struct RunFile<'a> {
    config: &'a RunConfig,
    cancelled: bool,
    panicked: u64,
    summary: &'a SummaryReport,
    advisories: Vec<Advisory>,
    records: &'a [OutcomeRecord],
}

impl<'a> RunFile<'a> {
    fn new(config: &'a RunConfig, outcome: &'a RunOutcome) -> Self {
        Self {
            config,
            cancelled: outcome.cancelled,
            panicked: outcome.panicked,
            summary: &outcome.report,
            advisories: swarmr_core::advisories(&outcome.report),
            records: &outcome.records,
        }
    }
}

#[derive(Debug, Serialize)]
struct SweepFile<'a> {
    config: &'a RunConfig,
    start: u64,
    step: u64,
    max: u64,
    steps: Vec<SweepFileStep<'a>>,
}

#[derive(Debug, Serialize)]
struct SweepFileStep<'a> {
    workers: u64,
    cancelled: bool,
    panicked: u64,
    summary: &'a SummaryReport,
    advisories: Vec<Advisory>,
    records: &'a [OutcomeRecord],
}

impl<'a> SweepFileStep<'a> {
    fn new(step: &'a SweepStep) -> Self {
        Self {
            workers: step.workers,
            cancelled: step.outcome.cancelled,
            panicked: step.outcome.panicked,
            summary: &step.outcome.report,
            advisories: swarmr_core::advisories(&step.outcome.report),
            records: &step.outcome.records,
        }
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create output dir: {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value).context("failed to serialize results")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write results: {}", path.display()))?;
    Ok(())
}
