use std::process::{Command, Output};

use anyhow::Context as _;
use swarmr_testserver::{TestServer, TestServerOptions};

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn ensure_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

async fn run_swarmr(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_swarmr");
    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run swarmr binary")
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_swarmr");

    let out = Command::new(exe)
        .arg("run")
        .arg("--duration")
        .arg("10x")
        .output()
        .context("run swarmr binary")?;

    ensure_code(&out, 30)
}

#[test]
fn invalid_item_path_exits_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_swarmr");

    let out = Command::new(exe)
        .args(["run", "--item-path", "/todos/item", "--requests", "1"])
        .output()
        .context("run swarmr binary")?;

    ensure_code(&out, 30)
}

#[test]
fn help_exits_0() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_swarmr");
    let out = Command::new(exe)
        .arg("--help")
        .output()
        .context("run swarmr binary")?;
    ensure_code(&out, 0)
}

#[tokio::test]
async fn closed_port_exits_20() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").context("bind free port")?;
        listener.local_addr().context("free port addr")?.port()
    };
    let target = format!("http://127.0.0.1:{port}");

    let out = run_swarmr(args(&[
        "run",
        "--target",
        &target,
        "--requests",
        "5",
        "--timeout",
        "2s",
    ]))
    .await?;

    ensure_code(&out, 20)
}

#[tokio::test]
async fn unhealthy_target_exits_20() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        healthy: false,
        ..TestServerOptions::default()
    })
    .await
    .context("start test server")?;
    let target = server.base_url().to_string();

    let out = run_swarmr(args(&[
        "run",
        "--target",
        &target,
        "--requests",
        "5",
        "--output",
        "json",
    ]))
    .await?;

    let worker_requests = server
        .stats()
        .requests_total()
        .saturating_sub(server.stats().health());
    server.shutdown().await;

    ensure_code(&out, 20)?;
    anyhow::ensure!(
        worker_requests == 0,
        "no load must be generated against an unhealthy target, got {worker_requests} requests"
    );
    Ok(())
}

#[tokio::test]
async fn skipped_health_check_runs_against_unhealthy_target() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        healthy: false,
        ..TestServerOptions::default()
    })
    .await
    .context("start test server")?;
    let target = server.base_url().to_string();

    let out = run_swarmr(args(&[
        "run",
        "--target",
        &target,
        "--requests",
        "5",
        "--workers",
        "2",
        "--action",
        "health",
        "--delay",
        "0ms",
        "--skip-health-check",
        "--output",
        "json",
    ]))
    .await?;
    server.shutdown().await;

    ensure_code(&out, 0)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    let summary = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v["kind"] == "summary")
        .context("missing summary line")?;
    anyhow::ensure!(summary["report"]["total_requests"] == 5, "{summary}");
    anyhow::ensure!(summary["report"]["success_count"] == 0, "{summary}");
    anyhow::ensure!(summary["report"]["status_codes"]["503"] == 5, "{summary}");
    Ok(())
}
