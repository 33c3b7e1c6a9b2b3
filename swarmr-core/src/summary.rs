use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::{Action, Method, OutcomeRecord};

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub method: Method,
    pub endpoint: String,
    pub count: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub action: Action,
    pub count: u64,
    pub successes: u64,
    pub avg_latency_ms: f64,
}

/// Per-service resource usage observed while the run was active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub service: String,
    pub samples: u64,
    pub cpu_avg_percent: f64,
    pub cpu_peak_percent: f64,
    pub memory_avg_mib: f64,
    pub memory_peak_mib: f64,
    pub memory_avg_percent: f64,
    pub memory_peak_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Percentage in `0..=100`.
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub elapsed_secs: f64,
    pub latency: LatencyStats,
    pub status_codes: BTreeMap<u16, u64>,
    /// Transport failures keyed by message.
    pub errors: BTreeMap<String, u64>,
    /// Transport failures keyed by client-reported kind (`connect`, `timeout`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_kinds: BTreeMap<String, u64>,
    pub endpoints: Vec<EndpointStats>,
    pub actions: Vec<ActionStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceUsage>,
}

impl SummaryReport {
    pub fn empty() -> Self {
        aggregate(&[], Duration::ZERO)
    }
}

/// Welford's online mean/variance.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n = self.n.saturating_add(1);
        let n_f = self.n as f64;

        let delta = x - self.mean;
        self.mean += delta / n_f;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / (self.n as f64 - 1.0)).sqrt()
    }
}

/// Nearest-rank percentile of an ascending slice. `p` is a fraction in `0..=1`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    let dt = dt_secs.max(1e-9);
    delta as f64 / dt
}

fn usable_latency(r: &OutcomeRecord) -> Option<f64> {
    (r.latency_ms.is_finite() && r.latency_ms >= 0.0).then_some(r.latency_ms)
}

pub fn latency_stats(records: &[OutcomeRecord]) -> LatencyStats {
    let mut sorted: Vec<f64> = records.iter().filter_map(usable_latency).collect();
    if sorted.is_empty() {
        return LatencyStats::default();
    }
    sorted.sort_by(f64::total_cmp);

    let mut stats = RunningStats::default();
    for &x in &sorted {
        stats.push(x);
    }

    LatencyStats {
        avg: stats.mean(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        stdev: stats.stdev(),
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

/// Summarize a record collection. Pure: the same input always yields an equal report.
pub fn aggregate(records: &[OutcomeRecord], elapsed: Duration) -> SummaryReport {
    let total = records.len() as u64;
    let success = records.iter().filter(|r| r.succeeded()).count() as u64;
    let failure = total - success;

    let success_rate = if total == 0 {
        0.0
    } else {
        success as f64 * 100.0 / total as f64
    };

    let elapsed_secs = elapsed.as_secs_f64();
    let requests_per_second = if elapsed_secs > 0.0 {
        total as f64 / elapsed_secs
    } else {
        0.0
    };

    let mut status_codes: BTreeMap<u16, u64> = BTreeMap::new();
    let mut errors: BTreeMap<String, u64> = BTreeMap::new();
    let mut error_kinds: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_endpoint: BTreeMap<(Method, &str), (u64, u64, RunningStats)> = BTreeMap::new();
    let mut by_action: BTreeMap<Action, (u64, u64, RunningStats)> = BTreeMap::new();

    for r in records {
        *status_codes.entry(r.status_code).or_insert(0) += 1;
        if let Some(err) = &r.error {
            *errors.entry(err.clone()).or_insert(0) += 1;
        }
        if let Some(kind) = r.error_kind {
            *error_kinds.entry(kind.to_string()).or_insert(0) += 1;
        }

        let ep = by_endpoint
            .entry((r.method, r.endpoint.as_str()))
            .or_default();
        ep.0 += 1;
        if !r.succeeded() {
            ep.1 += 1;
        }

        let act = by_action.entry(r.action).or_default();
        act.0 += 1;
        if r.succeeded() {
            act.1 += 1;
        }

        if let Some(lat) = usable_latency(r) {
            ep.2.push(lat);
            act.2.push(lat);
        }
    }

    let endpoints = by_endpoint
        .into_iter()
        .map(|((method, endpoint), (count, failures, lat))| EndpointStats {
            method,
            endpoint: endpoint.to_string(),
            count,
            failures,
            avg_latency_ms: lat.mean(),
        })
        .collect();

    let actions = by_action
        .into_iter()
        .map(|(action, (count, successes, lat))| ActionStats {
            action,
            count,
            successes,
            avg_latency_ms: lat.mean(),
        })
        .collect();

    SummaryReport {
        total_requests: total,
        success_count: success,
        failure_count: failure,
        success_rate,
        requests_per_second,
        elapsed_secs,
        latency: latency_stats(records),
        status_codes,
        errors,
        error_kinds,
        endpoints,
        actions,
        resources: Vec::new(),
    }
}

pub const LOW_SUCCESS_RATE_PERCENT: f64 = 95.0;
pub const HIGH_AVG_LATENCY_MS: f64 = 1000.0;
pub const HIGH_RESOURCE_PERCENT: f64 = 80.0;

/// A threshold crossed by a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    LowSuccessRate { success_rate: f64 },
    HighLatency { avg_ms: f64 },
    HighCpu { service: String, peak_percent: f64 },
    HighMemory { service: String, peak_percent: f64 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowSuccessRate { success_rate } => write!(
                f,
                "success rate {success_rate:.1}% is below {LOW_SUCCESS_RATE_PERCENT}%; check target errors or reduce concurrency"
            ),
            Self::HighLatency { avg_ms } => write!(
                f,
                "average latency {avg_ms:.0}ms exceeds {HIGH_AVG_LATENCY_MS}ms; the target may need more capacity"
            ),
            Self::HighCpu {
                service,
                peak_percent,
            } => write!(f, "{service}: CPU peaked at {peak_percent:.1}%"),
            Self::HighMemory {
                service,
                peak_percent,
            } => write!(f, "{service}: memory peaked at {peak_percent:.1}%"),
        }
    }
}

pub fn advisories(report: &SummaryReport) -> Vec<Advisory> {
    let mut out = Vec::new();
    if report.total_requests == 0 {
        return out;
    }
    if report.success_rate < LOW_SUCCESS_RATE_PERCENT {
        out.push(Advisory::LowSuccessRate {
            success_rate: report.success_rate,
        });
    }
    if report.latency.avg > HIGH_AVG_LATENCY_MS {
        out.push(Advisory::HighLatency {
            avg_ms: report.latency.avg,
        });
    }
    for r in &report.resources {
        if r.cpu_peak_percent > HIGH_RESOURCE_PERCENT {
            out.push(Advisory::HighCpu {
                service: r.service.clone(),
                peak_percent: r.cpu_peak_percent,
            });
        }
        if r.memory_peak_percent > HIGH_RESOURCE_PERCENT {
            out.push(Advisory::HighMemory {
                service: r.service.clone(),
                peak_percent: r.memory_peak_percent,
            });
        }
    }
    out
}
