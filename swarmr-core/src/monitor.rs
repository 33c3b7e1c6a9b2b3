use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use crate::record::unix_millis;
use crate::summary::{ResourceUsage, SummaryReport};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub service: String,
    pub timestamp_ms: u64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
}

/// Source of resource samples for the services under test.
pub trait ResourceProbe: Send + 'static {
    fn sample(&mut self) -> Vec<ResourceSample>;
}

/// Samples local processes whose name contains one of the filters.
///
/// Processes sharing a name are summed into one service entry.
pub struct ProcessProbe {
    filters: Vec<String>,
    sys: System,
}

impl ProcessProbe {
    pub fn new(filters: Vec<String>) -> Self {
        let refresh = RefreshKind::nothing()
            .with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            filters: filters
                .into_iter()
                .map(|f| f.to_ascii_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
            sys: System::new_with_specifics(refresh),
        }
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.filters.iter().any(|f| name.contains(f.as_str()))
    }
}

impl ResourceProbe for ProcessProbe {
    fn sample(&mut self) -> Vec<ResourceSample> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.sys.refresh_memory();
        let total_memory = self.sys.total_memory();
        let now = unix_millis();

        let mut by_name: BTreeMap<String, (f64, u64)> = BTreeMap::new();
        for process in self.sys.processes().values() {
            let name = process.name().to_string_lossy().to_string();
            if !self.matches(&name) {
                continue;
            }
            let entry = by_name.entry(name).or_default();
            entry.0 += f64::from(process.cpu_usage());
            entry.1 = entry.1.saturating_add(process.memory());
        }

        by_name
            .into_iter()
            .map(|(service, (cpu, mem))| ResourceSample {
                service,
                timestamp_ms: now,
                cpu_percent: cpu,
                memory_bytes: mem,
                memory_percent: if total_memory == 0 {
                    0.0
                } else {
                    mem as f64 * 100.0 / total_memory as f64
                },
            })
            .collect()
    }
}

/// Runs a probe on a background thread until stopped.
pub struct ResourceMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<Vec<ResourceSample>>>,
}

impl ResourceMonitor {
    pub fn start<P: ResourceProbe>(mut probe: P, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_sampler = Arc::clone(&stop);
        let tick = Duration::from_millis(50).min(interval.max(Duration::from_millis(1)));

        let handle = thread::spawn(move || {
            let mut samples = Vec::new();
            while !stop_sampler.load(Ordering::Relaxed) {
                samples.extend(probe.sample());

                let mut waited = Duration::ZERO;
                while waited < interval && !stop_sampler.load(Ordering::Relaxed) {
                    thread::sleep(tick);
                    waited += tick;
                }
            }
            samples
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) -> Vec<ResourceSample> {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.take().map(thread::JoinHandle::join) {
            Some(Ok(samples)) => samples,
            Some(Err(_)) => {
                tracing::warn!("resource monitor thread panicked; samples discarded");
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Attach per-service usage from samples taken inside `[start_ms, end_ms]`, widened by
/// `tolerance` on both sides.
pub fn annotate_resources(
    report: &mut SummaryReport,
    samples: &[ResourceSample],
    start_ms: u64,
    end_ms: u64,
    tolerance: Duration,
) {
    let tol = tolerance.as_millis().min(u128::from(u64::MAX)) as u64;
    let lo = start_ms.saturating_sub(tol);
    let hi = end_ms.saturating_add(tol);

    let mut by_service: BTreeMap<&str, Vec<&ResourceSample>> = BTreeMap::new();
    for s in samples {
        if (lo..=hi).contains(&s.timestamp_ms) {
            by_service.entry(s.service.as_str()).or_default().push(s);
        }
    }

    report.resources = by_service
        .into_iter()
        .map(|(service, samples)| {
            let n = samples.len() as f64;
            let mem_mib = |s: &&ResourceSample| s.memory_bytes as f64 / MIB;
            ResourceUsage {
                service: service.to_string(),
                samples: samples.len() as u64,
                cpu_avg_percent: samples.iter().map(|s| s.cpu_percent).sum::<f64>() / n,
                cpu_peak_percent: samples.iter().map(|s| s.cpu_percent).fold(0.0, f64::max),
                memory_avg_mib: samples.iter().map(mem_mib).sum::<f64>() / n,
                memory_peak_mib: samples.iter().map(mem_mib).fold(0.0, f64::max),
                memory_avg_percent: samples.iter().map(|s| s.memory_percent).sum::<f64>() / n,
                memory_peak_percent: samples
                    .iter()
                    .map(|s| s.memory_percent)
                    .fold(0.0, f64::max),
            }
        })
        .collect();
}
