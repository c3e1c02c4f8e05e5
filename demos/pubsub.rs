// ABOUTME: Standalone publisher + subscriber demo exercising topic fanout (spec.md §8 scenario 5)
// ABOUTME: Runs a subscriber on "news" and a publisher that posts one raw message, reusing one process for demo purposes

use argh::FromArgs;
use czrpc::ClientBuilder;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// czrpc pub/sub demo: subscribes to a topic, then publishes one message to it
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

    /// topic to subscribe and publish to (default: "news")
    #[argh(option, short = 't')]
    topic: Option<String>,

    /// message body to publish (default: "Good")
    #[argh(option, short = 'm')]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber_log = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber_log).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli_args.port.unwrap_or(9000);
    let topic = cli_args.topic.unwrap_or_else(|| "news".to_string());
    let message = cli_args.message.unwrap_or_else(|| "Good".to_string());
    let addr = format!("{host}:{port}").parse()?;

    let subscriber = ClientBuilder::new(addr).subscriber(false).await?;
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    subscriber.subscribe(
        topic.clone(),
        Arc::new(move |_message_name, body| {
            info!(body = %String::from_utf8_lossy(&body), "received push");
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(body);
            }
        }),
    )?;

    // Give the subscribe control frame a moment to land before publishing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let publisher = ClientBuilder::new(addr).publisher().await?;
    info!(topic, message, "publishing");
    publisher.publish_raw(topic, message)?;

    match tokio::time::timeout(Duration::from_secs(5), rx).await {
        Ok(Ok(body)) => info!(received = %String::from_utf8_lossy(&body), "pub/sub round trip complete"),
        Ok(Err(_)) => info!("subscriber channel closed before a push arrived"),
        Err(_) => info!("no push arrived within 5s"),
    }

    publisher.disconnect();
    subscriber.shutdown();
    Ok(())
}
