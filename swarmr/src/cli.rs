use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use swarmr_core::{Action, Method};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

/// `100ms..500ms` draws uniformly from the range, a single value is a fixed pause.
fn parse_delay(input: &str) -> Result<DelayArg, String> {
    match input.split_once("..") {
        Some((min, max)) => {
            let min = parse_duration(min)?;
            let max = parse_duration(max)?;
            if min > max {
                return Err(format!("delay range '{input}' has min greater than max"));
            }
            Ok(DelayArg { min, max })
        }
        None => {
            let d = parse_duration(input)?;
            Ok(DelayArg { min: d, max: d })
        }
    }
}

fn parse_action(input: &str) -> Result<Action, String> {
    input.trim().parse().map_err(|_| {
        format!(
            "unknown action '{input}' (expected one of health, list, create, update, delete, stats, custom)"
        )
    })
}

/// `list=3,create=1` -> weighted mix.
fn parse_mix(input: &str) -> Result<MixArg, String> {
    let mut out = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, weight) = part
            .split_once('=')
            .ok_or_else(|| format!("invalid mix entry '{part}' (expected ACTION=WEIGHT)"))?;
        let action = parse_action(name)?;
        let weight: u32 = weight
            .trim()
            .parse()
            .map_err(|_| format!("invalid weight '{weight}' for action '{name}'"))?;
        out.push((action, weight));
    }
    if out.is_empty() {
        return Err("mix cannot be empty (expected e.g. list=3,create=1)".to_string());
    }
    Ok(MixArg(out))
}

fn parse_custom(input: &str) -> Result<(Method, String), String> {
    let (method, path) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid custom endpoint '{input}' (expected METHOD:/path)"))?;
    let method: Method = method
        .trim()
        .parse()
        .map_err(|_| format!("unsupported method '{method}' (expected GET, POST, PATCH or DELETE)"))?;
    Ok((method, path.trim().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixArg(pub Vec<(Action, u32)>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayArg {
    pub min: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary with a live progress bar on stderr.
    #[value(alias = "human")]
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "swarmr",
    version,
    about = "Concurrent HTTP load generator for todo-style REST services",
    long_about = "swarmr drives a target HTTP service with a pool of concurrent workers.\n\nEach worker repeatedly picks an action (health, list, create, update, delete, stats or a custom endpoint), sends the request, records the outcome and pauses for a random delay. The run ends after a duration or a total request budget and prints an aggregate report.",
    after_help = "Examples:\n  swarmr run --target http://localhost:8080 --workers 20 --duration 1m\n  swarmr run --target http://localhost:8080 --requests 1000 --mix list=3,create=1 --output json\n  swarmr sweep --target http://localhost:8080 --start 10 --step 10 --max 50 --duration 30s"
)]
pub struct Cli {
    /// Log run lifecycle events to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true, env = "SWARMR_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one load test
    Run(RunArgs),

    /// Repeat the load test with an increasing number of workers
    #[command(
        long_about = "Run the same load test once per worker count start, start+step, ... up to max and print a comparison table.\n\nEvery step starts with fresh state; a pause separates consecutive steps."
    )]
    Sweep(SweepArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Worker count of the first step
    #[arg(long, env = "SWARMR_SWEEP_START", default_value_t = 10)]
    pub start: u64,

    /// Workers added per step
    #[arg(long, env = "SWARMR_SWEEP_STEP", default_value_t = 10)]
    pub step: u64,

    /// Largest worker count (inclusive)
    #[arg(long, env = "SWARMR_SWEEP_MAX", default_value_t = 50)]
    pub max: u64,

    /// Pause between steps
    #[arg(long, env = "SWARMR_SWEEP_PAUSE", value_parser = parse_duration, default_value = "2s")]
    pub pause: Duration,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Base URL of the service under test
    #[arg(long, env = "SWARMR_TARGET", default_value = "http://localhost")]
    pub target: String,

    /// Number of concurrent workers
    #[arg(long, env = "SWARMR_WORKERS", default_value_t = 10)]
    pub workers: u64,

    /// Run length per worker (e.g. 30s, 2m); default 30s
    #[arg(long, env = "SWARMR_DURATION", value_parser = parse_duration, conflicts_with = "requests")]
    pub duration: Option<Duration>,

    /// Total request budget across all workers, follow-ups included
    #[arg(long, env = "SWARMR_REQUESTS")]
    pub requests: Option<u64>,

    /// Issue only this action
    #[arg(long, value_parser = parse_action, conflicts_with_all = ["mix", "sequence", "split"])]
    pub action: Option<Action>,

    /// Weighted action mix, e.g. list=3,create=1,stats=1
    #[arg(long, env = "SWARMR_MIX", value_parser = parse_mix, conflicts_with_all = ["sequence", "split"])]
    pub mix: Option<MixArg>,

    /// Fixed action sequence each worker cycles through, e.g. create,list,delete
    #[arg(long, value_parser = parse_action, value_delimiter = ',', conflicts_with = "split")]
    pub sequence: Vec<Action>,

    /// Pin each worker to one action, splitting the pool by weight, e.g. health=1,list=1,create=1
    #[arg(long, env = "SWARMR_SPLIT", value_parser = parse_mix)]
    pub split: Option<MixArg>,

    /// Pause between requests of one worker: a range (100ms..500ms) or a fixed value
    #[arg(long, env = "SWARMR_DELAY", value_parser = parse_delay, default_value = "100ms..500ms")]
    pub delay: DelayArg,

    /// Per-request timeout
    #[arg(long, env = "SWARMR_TIMEOUT", value_parser = parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// Chance of a follow-up update after a successful create (0.0..=1.0)
    #[arg(long, env = "SWARMR_FOLLOW_UP_PROBABILITY", default_value_t = 0.3)]
    pub follow_up_probability: f64,

    /// JSON pointer of the created resource's id in a create response
    #[arg(long, env = "SWARMR_ID_POINTER", default_value = "/data/id")]
    pub id_pointer: String,

    #[arg(long, env = "SWARMR_HEALTH_PATH", default_value = "/health")]
    pub health_path: String,

    #[arg(long, env = "SWARMR_LIST_PATH", default_value = "/todos")]
    pub list_path: String,

    #[arg(long, env = "SWARMR_CREATE_PATH", default_value = "/todos")]
    pub create_path: String,

    /// Path of a single resource; must contain `{id}`
    #[arg(long, env = "SWARMR_ITEM_PATH", default_value = "/todos/{id}")]
    pub item_path: String,

    #[arg(long, env = "SWARMR_STATS_PATH", default_value = "/stats")]
    pub stats_path: String,

    /// Endpoint of the `custom` action, e.g. GET:/metrics
    #[arg(long, env = "SWARMR_CUSTOM", value_name = "METHOD:PATH", value_parser = parse_custom)]
    pub custom: Option<(Method, String)>,

    /// Sample CPU/memory of local processes whose name contains NAME
    #[arg(long, env = "SWARMR_MONITOR", value_name = "NAME", value_delimiter = ',')]
    pub monitor: Vec<String>,

    /// Resource sampling interval
    #[arg(long, env = "SWARMR_MONITOR_INTERVAL", value_parser = parse_duration, default_value = "5s")]
    pub monitor_interval: Duration,

    /// Do not refuse to start when the health endpoint does not answer 200
    #[arg(long, env = "SWARMR_SKIP_HEALTH_CHECK")]
    pub skip_health_check: bool,

    /// How long stopped workers get to finish in-flight requests
    #[arg(long, env = "SWARMR_GRACE", value_parser = parse_duration, default_value = "10s")]
    pub grace: Duration,

    /// Output format
    #[arg(long, value_enum, env = "SWARMR_OUTPUT", default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write config, summary and raw records as JSON to this file
    #[arg(long, env = "SWARMR_OUT")]
    pub out: Option<PathBuf>,
}
