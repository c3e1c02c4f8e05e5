// ABOUTME: Standalone sync rpc client demo calling the raw "echo" handler (spec.md §8 scenario 2)
// ABOUTME: Shape follows the teacher's examples/send_sms.rs single-shot connect/call/disconnect flow

use argh::FromArgs;
use czrpc::ClientBuilder;
use std::error::Error;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// czrpc sync echo client demo
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

    /// message body to echo (default: "Hello")
    #[argh(option, short = 'm')]
    message: Option<String>,
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
    let message = cli_args.message.unwrap_or_else(|| "Hello".to_string());
    let addr = format!("{host}:{port}").parse()?;

    info!("connecting to {addr}");
    let client = ClientBuilder::new(addr)
        .connect_timeout(Duration::from_secs(3))
        .request_timeout(Duration::from_secs(10))
        .sync_client()
        .await?;

    let reply = client.call_raw("echo", message.clone()).await?;
    info!("sent {message:?}, got back {:?}", String::from_utf8_lossy(&reply));

    client.disconnect().await;
    Ok(())
}
