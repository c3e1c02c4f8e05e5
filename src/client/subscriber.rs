// ABOUTME: Maintains a local topic subscription table, sends subscribe/unsubscribe control frames, reconnects and re-subscribes
// ABOUTME: Grounded in the async client's reconnect loop plus client/keepalive.rs's KeepAliveManager for the optional heartbeat

use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::connection::Connection;
use crate::datatypes::HEARTBEAT_INTERVAL_MS;
use crate::error::{ClientError, ClientResult};
use crate::frame::{PushFrame, RequestFrame};
use crate::ticker::Ticker;

/// A subscriber's push handler: `(message_name, body)`, decoded by the
/// closure itself. Typed bindings close over `prost::Message::decode`, raw
/// bindings use the bytes verbatim (same type-erasure shape as
/// [`crate::server::handler::Handler`]).
pub type PushHandler = Arc<dyn Fn(String, Bytes) + Send + Sync>;

/// `disconnected -> reading -> backoff -> reading | disconnected` (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Reading,
    Backoff,
}

struct Inner {
    endpoint: SocketAddr,
    connect_timeout: Duration,
    handlers: DashMap<String, PushHandler>,
    conn: StdMutex<Option<Arc<Connection<PushFrame>>>>,
    heartbeat_ticker: StdMutex<Option<Ticker>>,
    state: StdMutex<ConnectionState>,
}

/// Topic subscriber client. `subscribe`/`unsubscribe` maintain a local table
/// that survives reconnects: on reconnect every known topic is re-subscribed
/// by replaying its control frame.
pub struct SubscriberClient {
    inner: Arc<Inner>,
}

impl SubscriberClient {
    pub async fn connect(endpoint: SocketAddr, connect_timeout: Duration, heartbeat: bool) -> ClientResult<Arc<Self>> {
        let inner = Arc::new(Inner {
            endpoint,
            connect_timeout,
            handlers: DashMap::new(),
            conn: StdMutex::new(None),
            heartbeat_ticker: StdMutex::new(None),
            state: StdMutex::new(ConnectionState::Disconnected),
        });
        reconnect(&inner).await?;
        if heartbeat {
            let heartbeat_inner = inner.clone();
            let ticker = Ticker::repeating(Duration::from_millis(HEARTBEAT_INTERVAL_MS), move || {
                let inner = heartbeat_inner.clone();
                async move {
                    if let Some(conn) = inner.conn.lock().unwrap().clone() {
                        if let Err(error) = conn.async_write(&RequestFrame::heartbeat(0)) {
                            tracing::debug!(%error, "heartbeat send failed");
                        }
                    }
                }
            });
            *inner.heartbeat_ticker.lock().unwrap() = Some(ticker);
        }
        Ok(SubscriberClient { inner })
    }

    /// Subscribe to `topic`, replacing any prior handler for it, and send the
    /// subscribe control frame.
    pub fn subscribe(&self, topic: impl Into<String>, handler: PushHandler) -> ClientResult<()> {
        let topic = topic.into();
        self.inner.handlers.insert(topic.clone(), handler);
        self.send_control(RequestFrame::subscribe(0, topic))
    }

    /// Subscribe with a typed decoder: `handler` receives the decoded
    /// message; decode failures are logged and discarded, matching the raw
    /// router handler contract's "decode failure is a handler exception" rule.
    pub fn subscribe_typed<M, F>(&self, topic: impl Into<String>, handler: F) -> ClientResult<()>
    where
        M: prost::Message + Default,
        F: Fn(M) + Send + Sync + 'static,
    {
        let wrapped: PushHandler = Arc::new(move |_message_name, body| match M::decode(body.as_ref()) {
            Ok(message) => handler(message),
            Err(error) => tracing::warn!(%error, "failed to decode push message"),
        });
        self.subscribe(topic, wrapped)
    }

    /// Drop the local binding and send the unsubscribe control frame.
    pub fn unsubscribe(&self, topic: impl Into<String>) -> ClientResult<()> {
        let topic = topic.into();
        self.inner.handlers.remove(&topic);
        self.send_control(RequestFrame::unsubscribe(0, topic))
    }

    fn send_control(&self, frame: RequestFrame) -> ClientResult<()> {
        let conn = self.inner.conn.lock().unwrap().clone();
        match conn {
            Some(conn) => conn.async_write(&frame),
            None => Err(ClientError::InvalidState("not connected".to_string())),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn shutdown(&self) {
        if let Some(mut ticker) = self.inner.heartbeat_ticker.lock().unwrap().take() {
            ticker.destroy();
        }
        if let Some(conn) = self.inner.conn.lock().unwrap().take() {
            conn.disconnect();
        }
        *self.inner.state.lock().unwrap() = ConnectionState::Disconnected;
    }
}

async fn reconnect(inner: &Arc<Inner>) -> ClientResult<()> {
    let socket = tokio::time::timeout(inner.connect_timeout, TcpStream::connect(inner.endpoint))
        .await
        .map_err(|_| ClientError::Timeout)??;

    let dispatch_inner = inner.clone();
    let disconnect_inner = inner.clone();
    let conn = Connection::start(
        socket,
        move |frame: PushFrame, _conn| {
            let inner = dispatch_inner.clone();
            async move { dispatch_push(&inner, frame) }
        },
        move |_conn| {
            let inner = disconnect_inner.clone();
            tokio::spawn(async move { on_disconnected(inner).await });
        },
    )?;
    *inner.conn.lock().unwrap() = Some(conn.clone());
    *inner.state.lock().unwrap() = ConnectionState::Reading;

    // Replay every known subscription so the server's table matches ours
    // exactly, with no duplicate entries (the server's `add` is idempotent).
    for entry in inner.handlers.iter() {
        let topic = entry.key().clone();
        if let Err(error) = conn.async_write(&RequestFrame::subscribe(0, topic.clone())) {
            tracing::warn!(topic = %topic, %error, "failed to re-subscribe after reconnect");
        }
    }
    Ok(())
}

fn dispatch_push(inner: &Arc<Inner>, frame: PushFrame) {
    match inner.handlers.get(&frame.topic) {
        Some(handler) => handler(frame.message_name, frame.body),
        None => tracing::debug!(topic = %frame.topic, "push for unknown topic discarded"),
    }
}

async fn on_disconnected(inner: Arc<Inner>) {
    *inner.conn.lock().unwrap() = None;
    *inner.state.lock().unwrap() = ConnectionState::Backoff;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match reconnect(&inner).await {
            Ok(()) => break,
            Err(error) => tracing::warn!(%error, "subscriber reconnect failed, retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn subscribe_sends_control_frame_and_push_dispatches_to_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = bytes::BytesMut::with_capacity(1024);
            // Read the subscribe control frame.
            loop {
                socket.read_buf(&mut buf).await.unwrap();
                if let Ok(crate::frame::FrameStatus::Ready { total_len }) = RequestFrame::check(&buf) {
                    let control = RequestFrame::parse(&buf[..total_len]).unwrap();
                    assert!(control.is_subscribe());
                    assert_eq!(control.protocol, "news");
                    break;
                }
            }
            let push = PushFrame {
                mode: crate::datatypes::SerializeMode::NonSerialize,
                topic: "news".to_string(),
                message_name: String::new(),
                body: Bytes::from_static(b"Good"),
            };
            let mut out = bytes::BytesMut::new();
            crate::frame::Encode::encode(&push, &mut out);
            socket.write_all(&out).await.unwrap();
        });

        let subscriber = SubscriberClient::connect(addr, Duration::from_secs(1), false).await.unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        subscriber
            .subscribe(
                "news",
                Arc::new(move |_message_name, body| {
                    assert_eq!(body.as_ref(), b"Good");
                    received_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), server).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
