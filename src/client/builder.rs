// ABOUTME: Convenience constructors shared by all four client kinds
// ABOUTME: Mirrors the teacher's client/builder.rs ClientBuilder/ClientOptions shape

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::r#async::AsyncClient;
use crate::client::publisher::PublisherClient;
use crate::client::subscriber::SubscriberClient;
use crate::client::sync::SyncClient;
use crate::client::ClientOptions;
use crate::error::ClientResult;

/// Builds any of the four client kinds against one endpoint with shared
/// connect/request timeout and resend configuration (spec.md §6's
/// Configuration table).
#[derive(Clone, Copy)]
pub struct ClientBuilder {
    endpoint: SocketAddr,
    options: ClientOptions,
}

impl ClientBuilder {
    pub fn new(endpoint: SocketAddr) -> Self {
        ClientBuilder {
            endpoint,
            options: ClientOptions::default(),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Async client only: keep buffered-but-unsent bytes across a write
    /// failure for retry after reconnect, instead of dropping them.
    pub fn resend(mut self, enabled: bool) -> Self {
        self.options.resend = enabled;
        self
    }

    pub async fn sync_client(self) -> ClientResult<SyncClient> {
        SyncClient::connect(self.endpoint, self.options.connect_timeout, self.options.request_timeout).await
    }

    pub async fn async_client(self) -> ClientResult<Arc<AsyncClient>> {
        AsyncClient::connect(self.endpoint, self.options).await
    }

    pub async fn publisher(self) -> ClientResult<PublisherClient> {
        PublisherClient::connect(self.endpoint, self.options.connect_timeout).await
    }

    pub async fn subscriber(self, heartbeat: bool) -> ClientResult<Arc<SubscriberClient>> {
        SubscriberClient::connect(self.endpoint, self.options.connect_timeout, heartbeat).await
    }

    /// One-shot convenience, mirroring the teacher's `quick_transmitter`.
    pub async fn quick_sync(endpoint: SocketAddr) -> ClientResult<SyncClient> {
        ClientBuilder::new(endpoint).sync_client().await
    }
}
