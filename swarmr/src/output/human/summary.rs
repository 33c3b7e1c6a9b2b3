use std::fmt::Write as _;

use swarmr_core::{Advisory, RunOutcome, SummaryReport, SweepStep};

use super::format::*;

pub(crate) fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let r = &outcome.report;

    if r.total_requests == 0 {
        out.push_str("summary: no requests were issued\n");
        if outcome.cancelled {
            out.push_str("  (interrupted, partial results)\n");
        }
        render_worker_faults(outcome, &mut out);
        return out;
    }

    out.push_str("summary\n");
    if outcome.cancelled {
        out.push_str("  (interrupted, partial results)\n");
    }
    render_totals(r, &mut out);
    render_status_codes(r, &mut out);
    render_errors(r, &mut out);
    render_endpoints(r, &mut out);
    render_actions(r, &mut out);
    render_resources(r, &mut out);
    render_worker_faults(outcome, &mut out);

    out
}

fn render_worker_faults(outcome: &RunOutcome, out: &mut String) {
    if outcome.stragglers > 0 {
        writeln!(
            out,
            "\n{} worker(s) were aborted after the shutdown grace",
            outcome.stragglers
        )
        .ok();
    }
    if outcome.panicked > 0 {
        writeln!(
            out,
            "\n{} worker(s) panicked; their in-flight requests are missing",
            outcome.panicked
        )
        .ok();
    }
}

fn render_totals(r: &SummaryReport, out: &mut String) {
    writeln!(
        out,
        "  requests: {} (ok {}, failed {})",
        r.total_requests, r.success_count, r.failure_count
    )
    .ok();
    writeln!(out, "  success rate: {}", format_percent(r.success_rate)).ok();
    writeln!(
        out,
        "  elapsed: {:.2}s rps={}",
        r.elapsed_secs,
        format_rate(r.requests_per_second)
    )
    .ok();
    let l = &r.latency;
    writeln!(
        out,
        "  latency = avg={} min={} max={} stdev={}",
        format_ms(l.avg),
        format_ms(l.min),
        format_ms(l.max),
        format_ms(l.stdev)
    )
    .ok();
    writeln!(
        out,
        "            p50={} p95={} p99={}",
        format_ms(l.p50),
        format_ms(l.p95),
        format_ms(l.p99)
    )
    .ok();
}

fn render_status_codes(r: &SummaryReport, out: &mut String) {
    out.push_str("\nstatus codes\n");
    for (code, count) in &r.status_codes {
        writeln!(
            out,
            "  {}: {count} ({})",
            status_label(*code),
            format_percent(share(*count, r.total_requests))
        )
        .ok();
    }
}

fn render_errors(r: &SummaryReport, out: &mut String) {
    if r.errors.is_empty() {
        return;
    }

    let mut errors: Vec<_> = r.errors.iter().collect();
    errors.sort_by(|(a_msg, a_count), (b_msg, b_count)| {
        b_count.cmp(a_count).then_with(|| a_msg.cmp(b_msg))
    });

    out.push_str("\nerrors\n");
    for (msg, count) in errors {
        writeln!(out, "  {msg}: {count}").ok();
    }
    if !r.error_kinds.is_empty() {
        let kinds: Vec<String> = r
            .error_kinds
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect();
        writeln!(out, "  by kind: {}", kinds.join(" ")).ok();
    }
}

fn render_endpoints(r: &SummaryReport, out: &mut String) {
    if r.endpoints.is_empty() {
        return;
    }
    out.push_str("\nendpoints\n");
    for e in &r.endpoints {
        writeln!(
            out,
            "  {} {}: {} (failed {}) avg={}",
            e.method,
            e.endpoint,
            e.count,
            e.failures,
            format_ms(e.avg_latency_ms)
        )
        .ok();
    }
}

fn render_actions(r: &SummaryReport, out: &mut String) {
    if r.actions.is_empty() {
        return;
    }
    out.push_str("\nactions\n");
    for a in &r.actions {
        writeln!(
            out,
            "  {}: {} (ok {}, {}) avg={}",
            a.action,
            a.count,
            a.successes,
            format_percent(share(a.successes, a.count)),
            format_ms(a.avg_latency_ms)
        )
        .ok();
    }
}

fn render_resources(r: &SummaryReport, out: &mut String) {
    if r.resources.is_empty() {
        return;
    }
    out.push_str("\nresources\n");
    for u in &r.resources {
        writeln!(
            out,
            "  {} (n={}): cpu avg={} peak={} mem avg={:.1}MiB peak={:.1}MiB ({})",
            u.service,
            u.samples,
            format_percent(u.cpu_avg_percent),
            format_percent(u.cpu_peak_percent),
            u.memory_avg_mib,
            u.memory_peak_mib,
            format_percent(u.memory_peak_percent)
        )
        .ok();
    }
}

pub(crate) fn render_advisories(advisories: &[Advisory]) -> String {
    let mut out = String::new();
    if advisories.is_empty() {
        return out;
    }
    out.push_str("advisories:\n");
    for a in advisories {
        writeln!(&mut out, "  {a}").ok();
    }
    out
}

pub(crate) fn render_sweep_table(steps: &[SweepStep]) -> String {
    let mut out = String::new();
    out.push_str("sweep\n");
    writeln!(
        &mut out,
        "  {:>8} {:>10} {:>9} {:>10} {:>10} {:>10} {:>10}",
        "workers", "requests", "success", "rps", "avg", "p95", "p99"
    )
    .ok();
    for s in steps {
        let r = &s.outcome.report;
        writeln!(
            &mut out,
            "  {:>8} {:>10} {:>9} {:>10} {:>10} {:>10} {:>10}",
            s.workers,
            r.total_requests,
            format_percent(r.success_rate),
            format_rate(r.requests_per_second),
            format_ms(r.latency.avg),
            format_ms(r.latency.p95),
            format_ms(r.latency.p99)
        )
        .ok();
    }
    out
}
