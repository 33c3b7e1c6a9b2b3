use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_ms_opt, format_percent, format_rate};
use progress::{HumanProgress, Position};
use summary::{render, render_advisories, render_sweep_table};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, cfg: &swarmr_core::RunConfig, sweep: Option<&swarmr_core::SweepPlan>) {
        println!("target: {}", cfg.target);
        match sweep {
            Some(plan) => println!(
                "sweep: workers {}..={} step {} pause {}",
                plan.start,
                plan.max,
                plan.step,
                humantime::format_duration(plan.pause)
            ),
            None => println!("workers: {}", cfg.workers),
        }
        match cfg.stop {
            swarmr_core::StopBound::Duration(d) => {
                println!("duration: {}", humantime::format_duration(d));
            }
            swarmr_core::StopBound::Requests(n) => println!("requests: {n}"),
        }
        println!(
            "delay: {}..{} timeout: {}",
            humantime::format_duration(cfg.delay.min),
            humantime::format_duration(cfg.delay.max),
            humantime::format_duration(cfg.timeout)
        );
        println!();
    }

    fn progress(&self) -> Option<swarmr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: swarmr_core::ProgressUpdate| {
            let position = match (u.duration, u.budget) {
                (Some(d), _) => Some(Position {
                    current: u.elapsed.as_millis() as u64,
                    total: d.as_millis() as u64,
                }),
                (None, Some(budget)) => Some(Position {
                    current: u.metrics.requests_total,
                    total: budget,
                }),
                (None, None) => None,
            };

            let message = format!(
                "active={}/{} elapsed={} rps={} errors={} p50={} p95={} requests={} (failed {})",
                u.active_workers,
                u.workers,
                humantime::format_duration(std::time::Duration::from_secs(u.elapsed.as_secs())),
                format_rate(u.metrics.rps_now),
                format_percent(u.metrics.error_rate_now * 100.0),
                format_ms_opt(u.metrics.latency_p50_ms_now),
                format_ms_opt(u.metrics.latency_p95_ms_now),
                u.metrics.requests_total,
                u.metrics.failed_requests_total,
            );

            progress.update(&format!("{} workers", u.workers), position, message);
        }))
    }

    fn print_summary(&self, outcome: &swarmr_core::RunOutcome) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(outcome));

        let advisories = swarmr_core::advisories(&outcome.report);
        eprint!("{}", render_advisories(&advisories));
        Ok(())
    }

    fn print_sweep(&self, steps: &[swarmr_core::SweepStep]) -> anyhow::Result<()> {
        self.progress.finish();
        for step in steps {
            println!("step: {} workers", step.workers);
            print!("{}", render(&step.outcome));
            eprint!(
                "{}",
                render_advisories(&swarmr_core::advisories(&step.outcome.report))
            );
            println!();
        }
        print!("{}", render_sweep_table(steps));
        Ok(())
    }
}
