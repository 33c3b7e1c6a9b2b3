use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use swarmr_core::{Advisory, SummaryReport};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _cfg: &swarmr_core::RunConfig, _sweep: Option<&swarmr_core::SweepPlan>) {}

    fn progress(&self) -> Option<swarmr_core::ProgressFn> {
        Some(Arc::new(move |u: swarmr_core::ProgressUpdate| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, outcome: &swarmr_core::RunOutcome) -> anyhow::Result<()> {
        let workers = (outcome.workers.len() as u64)
            .saturating_add(outcome.stragglers)
            .saturating_add(outcome.panicked);
        emit_json_line(&build_summary_line(workers, outcome));
        Ok(())
    }

    fn print_sweep(&self, steps: &[swarmr_core::SweepStep]) -> anyhow::Result<()> {
        for step in steps {
            emit_json_line(&build_summary_line(step.workers, &step.outcome));
        }
        emit_json_line(&build_sweep_line(steps));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<u64>,
    pub workers: u64,
    pub active_workers: u64,

    pub requests_per_sec: f64,
    pub error_rate: f64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,

    pub total_requests: u64,
    pub failed_requests_total: u64,
}

fn build_progress_line(u: &swarmr_core::ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        duration_secs: u.duration.map(|d| d.as_secs_f64()),
        budget: u.budget,
        workers: u.workers,
        active_workers: u.active_workers,

        requests_per_sec: u.metrics.rps_now,
        error_rate: u.metrics.error_rate_now,
        latency_p50_ms: u.metrics.latency_p50_ms_now,
        latency_p95_ms: u.metrics.latency_p95_ms_now,

        total_requests: u.metrics.requests_total,
        failed_requests_total: u.metrics.failed_requests_total,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub workers: u64,
    pub cancelled: bool,
    pub stragglers: u64,
    pub panicked: u64,
    pub report: &'a SummaryReport,
    pub advisories: Vec<Advisory>,
}

fn build_summary_line(workers: u64, outcome: &swarmr_core::RunOutcome) -> JsonSummaryLine<'_> {
    JsonSummaryLine {
        kind: "summary",
        workers,
        cancelled: outcome.cancelled,
        stragglers: outcome.stragglers,
        panicked: outcome.panicked,
        report: &outcome.report,
        advisories: swarmr_core::advisories(&outcome.report),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSweepLine {
    pub kind: &'static str,
    pub steps: Vec<JsonSweepRow>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSweepRow {
    pub workers: u64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub latency_avg_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

fn build_sweep_line(steps: &[swarmr_core::SweepStep]) -> JsonSweepLine {
    let steps = steps
        .iter()
        .map(|s| {
            let r = &s.outcome.report;
            JsonSweepRow {
                workers: s.workers,
                total_requests: r.total_requests,
                success_rate: r.success_rate,
                requests_per_second: r.requests_per_second,
                latency_avg_ms: r.latency.avg,
                latency_p95_ms: r.latency.p95,
                latency_p99_ms: r.latency.p99,
            }
        })
        .collect();

    JsonSweepLine {
        kind: "sweep",
        steps,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
