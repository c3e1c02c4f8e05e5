// ABOUTME: Maps protocol name to handler, dispatches by frame.kind, runs handlers behind a worker-pool semaphore
// ABOUTME: New relative to the teacher (SMPP is client-only); grounded in the pack's per-connection-task RPC server shape

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::connection::Connection;
use crate::datatypes::{ClientKind, RpcErrorCode, SerializeMode};
use crate::frame::{PushFrame, RequestFrame, ResponseFrame};
use crate::server::handler::{Handler, Request};
use crate::topic::TopicManager;

/// Server-scoped dispatch table and work-pool gate. One `Router` per
/// `Server`; no process-wide singleton (spec.md §9's "singleton registries"
/// redesign note).
pub struct Router {
    typed: DashMap<String, Handler>,
    raw: DashMap<String, Handler>,
    topics: Arc<TopicManager>,
    work_permits: Arc<Semaphore>,
}

impl Router {
    pub fn new(work_threads: usize, topics: Arc<TopicManager>) -> Arc<Self> {
        Arc::new(Router {
            typed: DashMap::new(),
            raw: DashMap::new(),
            topics,
            work_permits: Arc::new(Semaphore::new(work_threads.max(1))),
        })
    }

    pub fn topics(&self) -> &Arc<TopicManager> {
        &self.topics
    }

    /// Bind `name` in the typed (protobuf-serialize) table. Re-binding the
    /// same name replaces the prior entry; the raw table is independent.
    pub fn bind(&self, name: impl Into<String>, handler: Handler) {
        self.typed.insert(name.into(), handler);
    }

    /// Bind `name` in the raw (non_serialize) table.
    pub fn bind_raw(&self, name: impl Into<String>, handler: Handler) {
        self.raw.insert(name.into(), handler);
    }

    /// Entry point passed as the `on_frame` callback to [`Connection::start`].
    pub async fn handle(self: Arc<Self>, frame: RequestFrame, conn: Arc<Connection<RequestFrame>>) {
        match frame.kind {
            ClientKind::Rpc | ClientKind::AsyncRpc => self.handle_call(frame, conn).await,
            ClientKind::Pub => self.handle_publish(frame).await,
            ClientKind::Sub => self.handle_subscribe_control(frame, conn),
        }
    }

    async fn handle_call(&self, frame: RequestFrame, conn: Arc<Connection<RequestFrame>>) {
        let table = match frame.mode {
            SerializeMode::Serialize => &self.typed,
            SerializeMode::NonSerialize => &self.raw,
        };
        let Some(handler) = table.get(&frame.protocol).map(|entry| entry.clone()) else {
            let response = ResponseFrame {
                code: RpcErrorCode::RouteFailed,
                call_id: frame.call_id,
                message_name: String::new(),
                body: bytes::Bytes::new(),
            };
            if let Err(error) = conn.async_write(&response) {
                tracing::warn!(session = conn.session_id(), %error, "failed to write route-failed response");
            }
            return;
        };

        let _permit = match self.work_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed at shutdown
        };

        let request = Request {
            session_id: conn.session_id().to_string(),
            message_name: frame.message_name.clone(),
            body: frame.body.clone(),
        };

        match handler(request).await {
            Ok(response) => {
                let frame = ResponseFrame {
                    code: RpcErrorCode::Ok,
                    call_id: frame.call_id,
                    message_name: response.message_name,
                    body: response.body,
                };
                if let Err(error) = conn.async_write(&frame) {
                    tracing::warn!(session = conn.session_id(), %error, "failed to write response");
                }
            }
            Err(error) => {
                tracing::error!(session = conn.session_id(), protocol = %frame.protocol, %error, "handler error");
                match frame.mode {
                    // Typed path: log and send no response; the caller times out.
                    SerializeMode::Serialize => {}
                    // Raw path: an exception disconnects the connection (spec.md §7).
                    SerializeMode::NonSerialize => conn.disconnect(),
                }
            }
        }
    }

    async fn handle_publish(&self, frame: RequestFrame) {
        let subscribers = self.topics.subscribers(&frame.protocol);
        let push = PushFrame {
            mode: frame.mode,
            topic: frame.protocol,
            message_name: frame.message_name,
            body: frame.body,
        };
        for subscriber in subscribers {
            if let Err(error) = subscriber.async_write(&push) {
                tracing::warn!(session = subscriber.session_id(), %error, "push send failed, disconnecting subscriber");
                subscriber.disconnect();
            }
        }
    }

    /// Subscribe/unsubscribe/heartbeat control frames are idempotent and
    /// never produce a response (spec.md §7).
    fn handle_subscribe_control(&self, frame: RequestFrame, conn: Arc<Connection<RequestFrame>>) {
        if frame.is_heartbeat() {
            return;
        }
        if frame.is_subscribe() {
            self.topics.add(&frame.protocol, &conn);
        } else if frame.is_unsubscribe() {
            self.topics.remove(&frame.protocol, &conn);
        } else {
            tracing::warn!(session = conn.session_id(), topic = %frame.protocol, "unrecognized sub control body");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler::into_handler;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (Arc<Connection<RequestFrame>>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let server_socket = accept.await.unwrap();
        // The "client" half here is a raw TcpStream we read replies off of
        // directly, so we never actually construct a second Connection for it.
        let router = Router::new(1, Arc::new(TopicManager::new()));
        router.bind_raw(
            "echo",
            into_handler(|request: Request| async move {
                let mut response = crate::server::handler::Response::default();
                response.set_raw(request.body);
                Ok(response)
            }),
        );
        let router_conn = router.clone();
        let conn = Connection::start(
            server_socket,
            move |frame, conn| {
                let router = router_conn.clone();
                async move { router.handle(frame, conn).await }
            },
            |_conn| {},
        )
        .unwrap();
        (conn, client)
    }

    #[tokio::test]
    async fn unbound_protocol_gets_route_failed() {
        use tokio::io::AsyncReadExt;

        let (_conn, mut client) = connected_pair().await;
        let request = RequestFrame {
            mode: SerializeMode::NonSerialize,
            kind: ClientKind::Rpc,
            call_id: 9,
            protocol: "missing".to_string(),
            message_name: String::new(),
            body: Bytes::new(),
        };
        let mut buf = bytes::BytesMut::new();
        crate::frame::Encode::encode(&request, &mut buf);
        tokio::io::AsyncWriteExt::write_all(&mut client, &buf).await.unwrap();

        let mut response_buf = vec![0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut response_buf))
            .await
            .unwrap()
            .unwrap();
        let response = ResponseFrame::parse(&response_buf[..n]).unwrap();
        assert_eq!(response.code, RpcErrorCode::RouteFailed);
        assert_eq!(response.call_id, 9);
    }

    #[tokio::test]
    async fn bound_raw_handler_echoes_body() {
        use tokio::io::AsyncReadExt;

        let (_conn, mut client) = connected_pair().await;
        let request = RequestFrame {
            mode: SerializeMode::NonSerialize,
            kind: ClientKind::Rpc,
            call_id: 3,
            protocol: "echo".to_string(),
            message_name: String::new(),
            body: Bytes::from_static(b"Hello"),
        };
        let mut buf = bytes::BytesMut::new();
        crate::frame::Encode::encode(&request, &mut buf);
        tokio::io::AsyncWriteExt::write_all(&mut client, &buf).await.unwrap();

        let mut response_buf = vec![0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut response_buf))
            .await
            .unwrap()
            .unwrap();
        let response = ResponseFrame::parse(&response_buf[..n]).unwrap();
        assert_eq!(response.code, RpcErrorCode::Ok);
        assert_eq!(response.body.as_ref(), b"Hello");
    }

    #[tokio::test]
    async fn publish_fans_out_to_subscribers_and_skips_other_topics() {
        let topics = Arc::new(TopicManager::new());
        let router = Router::new(1, topics.clone());

        let make_subscriber_conn = |received: Arc<std::sync::Mutex<Vec<PushFrame>>>| async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
            let client = TcpStream::connect(addr).await.unwrap();
            let server_socket = accept.await.unwrap();
            std::mem::forget(client);
            Connection::<PushFrame>::start(
                server_socket,
                move |frame, _conn| {
                    let received = received.clone();
                    async move {
                        received.lock().unwrap().push(frame);
                    }
                },
                |_conn| {},
            )
            .unwrap()
        };

        let news_received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let news_conn = make_subscriber_conn(news_received.clone()).await;
        topics.add("news", &news_conn);

        let song_received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let song_conn = make_subscriber_conn(song_received.clone()).await;
        topics.add("song", &song_conn);

        router
            .handle_publish(RequestFrame {
                mode: SerializeMode::Serialize,
                kind: ClientKind::Pub,
                call_id: 0,
                protocol: "news".to_string(),
                message_name: "czrpc.News".to_string(),
                body: Bytes::from_static(b"Good"),
            })
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(news_received.lock().unwrap().len(), 1);
        assert_eq!(song_received.lock().unwrap().len(), 0);
    }
}
