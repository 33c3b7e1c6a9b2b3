use std::time::Duration;

use crate::record::OutcomeRecord;
use crate::summary::{latency_stats, per_sec};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Failed requests / requests during the last progress interval (0..=1).
    pub error_rate_now: f64,
    pub latency_p50_ms_now: Option<f64>,
    pub latency_p95_ms_now: Option<f64>,

    pub requests_total: u64,
    pub failed_requests_total: u64,
}

impl LiveMetrics {
    /// Fold the records that arrived during one interval into the running totals.
    pub fn advance(&mut self, fresh: &[OutcomeRecord], dt: Duration) {
        let n = fresh.len() as u64;
        let failed = fresh.iter().filter(|r| !r.succeeded()).count() as u64;

        self.requests_total = self.requests_total.saturating_add(n);
        self.failed_requests_total = self.failed_requests_total.saturating_add(failed);
        self.rps_now = per_sec(n, dt.as_secs_f64());
        self.error_rate_now = if n == 0 { 0.0 } else { failed as f64 / n as f64 };

        if n == 0 {
            self.latency_p50_ms_now = None;
            self.latency_p95_ms_now = None;
        } else {
            let lat = latency_stats(fresh);
            self.latency_p50_ms_now = Some(lat.p50);
            self.latency_p95_ms_now = Some(lat.p95);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    /// Planned run length in duration mode.
    pub duration: Option<Duration>,
    /// Request budget in request-count mode.
    pub budget: Option<u64>,
    pub workers: u64,
    pub active_workers: u64,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Action, Method};

    #[test]
    fn advance_tracks_interval_and_totals() {
        let ok = OutcomeRecord::new(Action::Stats, Method::Get, "/stats", 200, Duration::from_millis(10));
        let bad = OutcomeRecord::new(Action::Stats, Method::Get, "/stats", 503, Duration::from_millis(30));

        let mut m = LiveMetrics::default();
        m.advance(&[ok.clone(), ok.clone(), ok, bad], Duration::from_secs(2));
        assert_eq!(m.requests_total, 4);
        assert_eq!(m.failed_requests_total, 1);
        assert!((m.rps_now - 2.0).abs() < 1e-9);
        assert!((m.error_rate_now - 0.25).abs() < 1e-9);
        assert_eq!(m.latency_p50_ms_now, Some(10.0));

        m.advance(&[], Duration::from_secs(1));
        assert_eq!(m.requests_total, 4);
        assert_eq!(m.rps_now, 0.0);
        assert_eq!(m.latency_p95_ms_now, None);
    }
}
