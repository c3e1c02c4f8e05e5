// ABOUTME: Single in-flight, mutex-serialized rpc client bounded by a per-call deadline
// ABOUTME: Grounded in client/default.rs's request-then-blocking-read shape, generalized to any protocol name

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::connection::Connection;
use crate::datatypes::{CallId, ClientKind, RpcErrorCode, SerializeMode};
use crate::error::{ClientError, ClientResult};
use crate::frame::{RequestFrame, ResponseFrame};

type PendingSlot = Arc<StdMutex<Option<oneshot::Sender<ResponseFrame>>>>;

struct State {
    conn: Option<Arc<Connection<ResponseFrame>>>,
    pending: PendingSlot,
}

/// Keeps a single outstanding call under a mutex: every call is fully
/// serialized, armed with a deadline that force-disconnects the socket on
/// expiry to unblock the wait (spec.md §4.5). Reconnection on the next call
/// after an error is implicit.
pub struct SyncClient {
    endpoint: SocketAddr,
    connect_timeout: Duration,
    request_timeout: Duration,
    next_call_id: AtomicU32,
    state: Mutex<State>,
}

impl SyncClient {
    pub async fn connect(endpoint: SocketAddr, connect_timeout: Duration, request_timeout: Duration) -> ClientResult<Self> {
        let client = SyncClient {
            endpoint,
            connect_timeout,
            request_timeout,
            next_call_id: AtomicU32::new(1),
            state: Mutex::new(State {
                conn: None,
                pending: Arc::new(StdMutex::new(None)),
            }),
        };
        let mut state = client.state.lock().await;
        client.reconnect_locked(&mut state).await?;
        drop(state);
        Ok(client)
    }

    async fn reconnect_locked(&self, state: &mut State) -> ClientResult<()> {
        let socket = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.endpoint))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let pending: PendingSlot = Arc::new(StdMutex::new(None));
        let pending_for_frame = pending.clone();
        let conn = Connection::start(
            socket,
            move |frame: ResponseFrame, _conn| {
                let pending = pending_for_frame.clone();
                async move {
                    if let Some(tx) = pending.lock().unwrap().take() {
                        let _ = tx.send(frame);
                    }
                }
            },
            |_conn| {},
        )?;
        state.conn = Some(conn);
        state.pending = pending;
        Ok(())
    }

    async fn call_inner(
        &self,
        mode: SerializeMode,
        protocol: String,
        message_name: String,
        body: Bytes,
    ) -> ClientResult<ResponseFrame> {
        let mut state = self.state.lock().await;
        if state.conn.as_ref().map(|c| c.is_closed()).unwrap_or(true) {
            self.reconnect_locked(&mut state).await?;
        }
        let conn = state.conn.clone().expect("reconnect_locked establishes a connection");
        let pending = state.pending.clone();

        let call_id: CallId = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        *pending.lock().unwrap() = Some(tx);

        let frame = RequestFrame {
            mode,
            kind: ClientKind::Rpc,
            call_id,
            protocol,
            message_name,
            body,
        };
        conn.async_write(&frame)?;

        // The lock stays held across this wait: exactly one call in flight at a time.
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                conn.disconnect();
                Err(ClientError::ConnectionClosed)
            }
            Err(_) => {
                pending.lock().unwrap().take();
                conn.disconnect(); // force-disconnect to unblock; next call reconnects
                Err(ClientError::Timeout)
            }
        }
    }

    /// Call a raw (non_serialize) handler and return its raw response body.
    pub async fn call_raw(&self, protocol: impl Into<String>, body: impl Into<Bytes>) -> ClientResult<Bytes> {
        let response = self
            .call_inner(SerializeMode::NonSerialize, protocol.into(), String::new(), body.into())
            .await?;
        match response.code {
            RpcErrorCode::Ok => Ok(response.body),
            other => Err(ClientError::Rpc(other)),
        }
    }

    /// Call a typed handler, encoding `request` and decoding the reply as `Resp`.
    pub async fn call<Req, Resp>(
        &self,
        protocol: impl Into<String>,
        message_name: impl Into<String>,
        request: &Req,
    ) -> ClientResult<Resp>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let body = Bytes::from(request.encode_to_vec());
        let response = self
            .call_inner(SerializeMode::Serialize, protocol.into(), message_name.into(), body)
            .await?;
        match response.code {
            RpcErrorCode::Ok => Resp::decode(response.body.as_ref()).map_err(ClientError::from),
            other => Err(ClientError::Rpc(other)),
        }
    }

    pub async fn disconnect(&self) {
        if let Some(conn) = self.state.lock().await.conn.take() {
            conn.disconnect();
        }
    }
}
