use std::process::Command;

use anyhow::Context as _;
use serde::Deserialize;
use swarmr_testserver::TestServer;

#[derive(Debug, Deserialize)]
struct Report {
    total_requests: u64,
    success_count: u64,
    failure_count: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryLine {
    workers: u64,
    cancelled: bool,
    report: Report,
}

#[derive(Debug, Deserialize)]
struct SweepRow {
    workers: u64,
    total_requests: u64,
}

#[derive(Debug, Deserialize)]
struct SweepLine {
    steps: Vec<SweepRow>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum JsonLine {
    #[serde(rename = "progress")]
    Progress {},

    #[serde(rename = "summary")]
    Summary(SummaryLine),

    #[serde(rename = "sweep")]
    Sweep(SweepLine),
}

fn parse_lines(stdout: &[u8]) -> anyhow::Result<Vec<JsonLine>> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).with_context(|| format!("parse json line: {l}")))
        .collect()
}

async fn run_swarmr(args: Vec<String>) -> anyhow::Result<std::process::Output> {
    let exe = env!("CARGO_BIN_EXE_swarmr");
    let out = tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run swarmr binary")?;

    anyhow::ensure!(
        out.status.success(),
        "swarmr failed: {:?}\nstdout:\n{}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(out)
}

#[tokio::test]
async fn e2e_run_reports_budget_and_persists_records() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let out_path = dir.path().join("results/run.json");

    let args = vec![
        "run".to_string(),
        "--target".to_string(),
        server.base_url().to_string(),
        "--workers".to_string(),
        "3".to_string(),
        "--requests".to_string(),
        "12".to_string(),
        "--delay".to_string(),
        "0ms".to_string(),
        "--output".to_string(),
        "json".to_string(),
        "--out".to_string(),
        out_path.display().to_string(),
    ];
    let out = run_swarmr(args).await?;

    let server_total = server.stats().requests_total();
    server.shutdown().await;

    let summaries: Vec<SummaryLine> = parse_lines(&out.stdout)?
        .into_iter()
        .filter_map(|l| match l {
            JsonLine::Summary(s) => Some(s),
            _ => None,
        })
        .collect();
    anyhow::ensure!(summaries.len() == 1, "expected one summary line");
    let summary = &summaries[0];

    anyhow::ensure!(summary.workers == 3, "workers={}", summary.workers);
    anyhow::ensure!(!summary.cancelled);
    anyhow::ensure!(
        summary.report.total_requests == 12,
        "total_requests={}",
        summary.report.total_requests
    );
    anyhow::ensure!(
        summary.report.success_count + summary.report.failure_count == 12,
        "success and failure must add up to the total"
    );
    anyhow::ensure!(summary.report.failure_count == 0, "{:?}", summary.report);

    // One pre-run health check plus the budget.
    anyhow::ensure!(server_total == 13, "server saw {server_total} requests");

    let bytes = tokio::fs::read(&out_path)
        .await
        .with_context(|| format!("read {}", out_path.display()))?;
    let saved: serde_json::Value = serde_json::from_slice(&bytes).context("parse results file")?;
    let records = saved["records"]
        .as_array()
        .context("records must be an array")?;
    anyhow::ensure!(records.len() == 12, "persisted {} records", records.len());
    anyhow::ensure!(saved["summary"]["total_requests"] == 12);
    anyhow::ensure!(saved["config"]["workers"] == 3);
    anyhow::ensure!(saved["config"]["stop"]["requests"] == 12);
    anyhow::ensure!(
        records.iter().all(|r| r["succeeded"] == true),
        "all records should be successful"
    );

    Ok(())
}

#[tokio::test]
async fn e2e_sweep_runs_one_step_per_worker_count() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let args = vec![
        "sweep".to_string(),
        "--target".to_string(),
        server.base_url().to_string(),
        "--start".to_string(),
        "1".to_string(),
        "--step".to_string(),
        "2".to_string(),
        "--max".to_string(),
        "5".to_string(),
        "--pause".to_string(),
        "0s".to_string(),
        "--requests".to_string(),
        "6".to_string(),
        "--delay".to_string(),
        "0ms".to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    let out = run_swarmr(args).await?;
    server.shutdown().await;

    let lines = parse_lines(&out.stdout)?;
    let summaries = lines
        .iter()
        .filter(|l| matches!(l, JsonLine::Summary(_)))
        .count();
    anyhow::ensure!(summaries == 3, "expected 3 step summaries, got {summaries}");

    let sweep = lines
        .iter()
        .find_map(|l| match l {
            JsonLine::Sweep(s) => Some(s),
            _ => None,
        })
        .context("missing sweep line")?;
    let workers: Vec<u64> = sweep.steps.iter().map(|s| s.workers).collect();
    anyhow::ensure!(workers == vec![1, 3, 5], "steps={workers:?}");
    anyhow::ensure!(
        sweep.steps.iter().all(|s| s.total_requests == 6),
        "every step must spend the full budget"
    );

    Ok(())
}
