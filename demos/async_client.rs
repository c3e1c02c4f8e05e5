// ABOUTME: Standalone async rpc client demo exercising the route-failed and request-timeout paths (spec.md §8 scenarios 3-4)
// ABOUTME: Shape follows the teacher's examples/long_running_client.rs argh CLI + tracing-subscriber setup

use argh::FromArgs;
use czrpc::{ClientBuilder, RpcErrorCode};
use std::error::Error;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// czrpc async client demo
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// server host (default: 127.0.0.1)
    #[argh(option)]
    host: Option<String>,

    /// server port (default: 9000)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// per-call request timeout in seconds (default: 2)
    #[argh(option)]
    request_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli_args.port.unwrap_or(9000);
    let request_timeout = Duration::from_secs(cli_args.request_timeout.unwrap_or(2));
    let addr = format!("{host}:{port}").parse()?;

    info!("connecting to {addr}");
    let client = ClientBuilder::new(addr).request_timeout(request_timeout).async_client().await?;

    // Scenario 3: no handler bound for "missing" -> route_failed comes back within one RTT.
    let (tx, rx) = oneshot::channel();
    client.call_raw("missing", "anything", move |result| {
        let _ = tx.send(result);
    })?;
    match rx.await? {
        Ok(_) => warn!("expected route_failed but got a response"),
        Err(error) => info!(%error, "missing handler call resolved as expected"),
    }

    // Scenario 4: "slow" is never bound on the echo_server demo either, so this
    // call also illustrates the timeout sweep firing with RpcErrorCode::RequestTimeout
    // once request_timeout elapses without a real reply racing it.
    let (tx, rx) = oneshot::channel();
    let call_id = client.call_raw("slow", "anything", move |result| {
        let _ = tx.send(result);
    })?;
    info!(call_id, "submitted slow call, waiting up to {:?}", request_timeout + Duration::from_secs(1));
    match rx.await? {
        Ok(_) => warn!("expected request_timeout but got a response"),
        Err(czrpc::ClientError::Rpc(RpcErrorCode::RequestTimeout)) => info!("slow call timed out as expected"),
        Err(error) => warn!(%error, "slow call failed for an unexpected reason"),
    }

    client.shutdown();
    Ok(())
}
