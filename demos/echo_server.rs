// ABOUTME: Standalone czrpc echo server demo binding a raw "echo" handler and session notifiers
// ABOUTME: Shape follows the teacher's examples/long_running_client.rs argh CLI + tracing-subscriber setup

//! # czrpc echo server
//!
//! Binds a raw `"echo"` handler that returns its request body unchanged
//! (spec.md §8 scenario 2), plus the typed echo used by scenario 1 against
//! whatever protobuf message the caller encodes as `"echo"`'s body. Publish
//! and subscribe-control frames on any topic are handled automatically by
//! the router: a server never needs to bind anything for pub/sub to work.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin echo_server -- --port 9000
//! ```

use argh::FromArgs;
use czrpc::server::handler::Response;
use czrpc::ServerBuilder;
use std::error::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// czrpc echo server demo
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// port to listen on (default: 9000)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// number of io/acceptor threads (default: 1)
    #[argh(option)]
    ios_threads: Option<usize>,

    /// number of worker threads for handlers and fanout (default: 2)
    #[argh(option)]
    work_threads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let port = cli_args.port.unwrap_or(9000);
    let addr = format!("0.0.0.0:{port}");
    info!("starting czrpc echo server on {addr}");

    let server = ServerBuilder::new()
        .listen(addr.as_str())?
        .ios_threads(cli_args.ios_threads.unwrap_or(1))
        .work_threads(cli_args.work_threads.unwrap_or(2))
        .client_connect_notify(|session| info!(session, "client connected"))
        .client_disconnect_notify(|session| info!(session, "client disconnected"))
        .build();

    server.bind_raw("echo", |request| async move {
        let mut response = Response::default();
        response.set_raw(request.body);
        Ok(response)
    });

    server.run()?;
    Ok(())
}
