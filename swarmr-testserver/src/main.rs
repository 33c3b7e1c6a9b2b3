use std::net::SocketAddr;
use std::time::Duration;

use swarmr_testserver::{TestServerOptions, TestServerStats};
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--latency-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--latency-ms requires a number"))?;
                options.latency = Duration::from_millis(ms.parse()?);
            }
            "--instance" => {
                options.instance = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--instance requires a name"))?;
            }
            "--unhealthy" => options.healthy = false,
            "-h" | "--help" => {
                eprintln!(
                    "swarmr-testserver\n\nUSAGE:\n  swarmr-testserver [--bind 127.0.0.1:0] [--latency-ms N] [--instance NAME] [--unhealthy]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = swarmr_testserver::router(options, TestServerStats::default());

    println!("HTTP_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
