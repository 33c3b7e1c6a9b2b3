use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, cfg: &swarmr_core::RunConfig, sweep: Option<&swarmr_core::SweepPlan>);
    fn progress(&self) -> Option<swarmr_core::ProgressFn>;
    fn print_summary(&self, outcome: &swarmr_core::RunOutcome) -> anyhow::Result<()>;
    fn print_sweep(&self, steps: &[swarmr_core::SweepStep]) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
