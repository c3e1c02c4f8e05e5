// ABOUTME: One-way publish client: fire-and-forget frames with call_id 0, no response expected
// ABOUTME: Grounded in client/default.rs's non-response-expecting send path (e.g. submit_sm minus the reply wait)

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::connection::Connection;
use crate::datatypes::{ClientKind, SerializeMode};
use crate::error::{ClientError, ClientResult};
use crate::frame::{RequestFrame, ResponseFrame};

/// Issues publish frames on the same send-queue discipline as any other
/// connection. Never expects a reply, so its read side (typed as
/// [`ResponseFrame`] purely to satisfy [`Connection`]'s `Decode` bound) never
/// completes a frame in practice.
pub struct PublisherClient {
    conn: Arc<Connection<ResponseFrame>>,
}

impl PublisherClient {
    pub async fn connect(endpoint: SocketAddr, connect_timeout: Duration) -> ClientResult<Self> {
        let socket = tokio::time::timeout(connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let conn = Connection::start(socket, |_frame: ResponseFrame, _conn| async move {}, |_conn| {})?;
        Ok(PublisherClient { conn })
    }

    pub fn publish_raw(&self, topic: impl Into<String>, body: impl Into<Bytes>) -> ClientResult<()> {
        let frame = RequestFrame {
            mode: SerializeMode::NonSerialize,
            kind: ClientKind::Pub,
            call_id: 0,
            protocol: topic.into(),
            message_name: String::new(),
            body: body.into(),
        };
        self.conn.async_write(&frame)
    }

    pub fn publish<M: prost::Message>(&self, topic: impl Into<String>, message_name: impl Into<String>, message: &M) -> ClientResult<()> {
        let frame = RequestFrame {
            mode: SerializeMode::Serialize,
            kind: ClientKind::Pub,
            call_id: 0,
            protocol: topic.into(),
            message_name: message_name.into(),
            body: Bytes::from(message.encode_to_vec()),
        };
        self.conn.async_write(&frame)
    }

    pub fn disconnect(&self) {
        self.conn.disconnect();
    }
}
