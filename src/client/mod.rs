// ABOUTME: Shared client configuration and module wiring for the four client kinds
// ABOUTME: ClientOptions mirrors the teacher's client/builder.rs ClientOptions defaults

pub mod builder;
pub mod publisher;
pub mod subscriber;
pub mod sync;

#[path = "async.rs"]
pub mod r#async;

pub use builder::ClientBuilder;
pub use publisher::PublisherClient;
pub use r#async::AsyncClient;
pub use subscriber::{PushHandler, SubscriberClient};
pub use sync::SyncClient;

use std::time::Duration;

/// Connect/request timeout and resend configuration shared by all client
/// kinds (spec.md §6 Configuration table defaults: 3s connect, 10s request).
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub resend: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            resend: false,
        }
    }
}
