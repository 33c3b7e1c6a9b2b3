#![forbid(unsafe_code)]

mod actions;
mod config;
mod controller;
mod error;
mod executor;
mod extract;
mod gate;
mod monitor;
mod progress;
mod record;
mod recorder;
mod summary;
mod worker;

#[cfg(test)]
mod testing;

pub use actions::{
    ActionPlan, ActionSelector, ActionSet, BuildContext, EndpointMap, RequestBuilder,
};
pub use config::{
    DEFAULT_GRACE, DEFAULT_PROGRESS_INTERVAL, DEFAULT_TIMEOUT, DelayRange, RunConfig, StopBound,
};
pub use controller::{RunController, RunOutcome, SweepPlan, SweepStep};
pub use error::{Error, Result};
pub use executor::{Executed, Executor, HttpExecutor, PlannedRequest};
pub use extract::{
    DEFAULT_FOLLOW_UP_PROBABILITY, DEFAULT_ID_POINTER, FollowUpPolicy, IdExtractor,
    JsonPointerExtractor,
};
pub use gate::RequestGate;
pub use monitor::{
    DEFAULT_MONITOR_INTERVAL, ProcessProbe, ResourceMonitor, ResourceProbe, ResourceSample,
    annotate_resources,
};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate};
pub use record::{Action, Method, OutcomeRecord, TRANSPORT_FAILURE_STATUS, unix_millis};
pub use recorder::{RecordLog, RecordSink, Recorder};
pub use summary::{
    ActionStats, Advisory, EndpointStats, LatencyStats, ResourceUsage, RunningStats,
    SummaryReport, advisories, aggregate, percentile,
};
pub use swarmr_http::HttpTransportErrorKind;
pub use worker::{
    ActiveWorkers, StopReason, Worker, WorkerReport, WorkerShared, WorkerState, WorkerStatus,
};
