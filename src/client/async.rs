// ABOUTME: Call-id-correlated async rpc client: outstanding-call map, periodic timeout sweep, automatic reconnect
// ABOUTME: Grounded in toy-rpc's pending-call map + reader/writer split, sweep timer from the teacher's KeepAliveManager shape

use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::client::ClientOptions;
use crate::connection::Connection;
use crate::datatypes::{CallId, ClientKind, RpcErrorCode, SerializeMode, TIMEOUT_SWEEP_INTERVAL_MS};
use crate::error::{ClientError, ClientResult};
use crate::frame::{RequestFrame, ResponseFrame};
use crate::ticker::Ticker;

type Callback = Box<dyn FnOnce(ResponseFrame) + Send>;

struct OutstandingCall {
    callback: Callback,
    submitted_at: Instant,
}

/// Monotonic call-id generator, outstanding-call map, timeout sweep and
/// reconnect-with-retransmit client (spec.md §4.6, the hard core of the
/// client side).
pub struct AsyncClient {
    endpoint: SocketAddr,
    connect_timeout: Duration,
    request_timeout: Duration,
    resend: bool,
    next_call_id: AtomicU32,
    outstanding: Arc<DashMap<CallId, OutstandingCall>>,
    resend_buffer: StdMutex<Vec<RequestFrame>>,
    conn: StdMutex<Option<Arc<Connection<ResponseFrame>>>>,
    sweep_ticker: StdMutex<Option<Ticker>>,
}

impl AsyncClient {
    pub async fn connect(endpoint: SocketAddr, options: ClientOptions) -> ClientResult<Arc<Self>> {
        let client = Arc::new(AsyncClient {
            endpoint,
            connect_timeout: options.connect_timeout,
            request_timeout: options.request_timeout,
            resend: options.resend,
            next_call_id: AtomicU32::new(1),
            outstanding: Arc::new(DashMap::new()),
            resend_buffer: StdMutex::new(Vec::new()),
            conn: StdMutex::new(None),
            sweep_ticker: StdMutex::new(None),
        });
        client.reconnect().await?;

        let sweep_client = client.clone();
        let ticker = Ticker::repeating(Duration::from_millis(TIMEOUT_SWEEP_INTERVAL_MS), move || {
            let client = sweep_client.clone();
            async move { client.sweep().await }
        });
        *client.sweep_ticker.lock().unwrap() = Some(ticker);

        Ok(client)
    }

    async fn reconnect(self: &Arc<Self>) -> ClientResult<()> {
        let socket = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.endpoint))
            .await
            .map_err(|_| ClientError::Timeout)??;

        let dispatch_client = self.clone();
        let disconnect_client = self.clone();
        let conn = Connection::start(
            socket,
            move |frame: ResponseFrame, _conn| {
                let client = dispatch_client.clone();
                async move { client.handle_response(frame).await }
            },
            move |_conn| {
                let client = disconnect_client.clone();
                tokio::spawn(async move { client.on_disconnected().await });
            },
        )?;
        *self.conn.lock().unwrap() = Some(conn.clone());
        tracing::info!(endpoint = %self.endpoint, "connect_success");

        let buffered: Vec<RequestFrame> = std::mem::take(&mut self.resend_buffer.lock().unwrap());
        for frame in buffered {
            if let Err(error) = conn.async_write(&frame) {
                tracing::warn!(%error, call_id = frame.call_id, "resend failed after reconnect");
            }
        }
        Ok(())
    }

    async fn on_disconnected(self: Arc<Self>) {
        *self.conn.lock().unwrap() = None;
        // The server has no memory of prior calls once the socket is gone.
        self.outstanding.clear();
        tokio::time::sleep(Duration::from_secs(1)).await;
        loop {
            match self.reconnect().await {
                Ok(()) => break,
                Err(error) => {
                    tracing::warn!(%error, "async client reconnect failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_response(&self, frame: ResponseFrame) {
        if let Some((_, outstanding)) = self.outstanding.remove(&frame.call_id) {
            (outstanding.callback)(frame);
        } else {
            tracing::debug!(call_id = frame.call_id, "late or unknown response discarded");
        }
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<CallId> = self
            .outstanding
            .iter()
            .filter(|entry| now.duration_since(entry.submitted_at) >= self.request_timeout)
            .map(|entry| *entry.key())
            .collect();
        for call_id in expired {
            if let Some((_, outstanding)) = self.outstanding.remove(&call_id) {
                let synthetic = ResponseFrame {
                    code: RpcErrorCode::RequestTimeout,
                    call_id,
                    message_name: String::new(),
                    body: Bytes::new(),
                };
                (outstanding.callback)(synthetic);
            }
        }
    }

    fn submit(
        &self,
        mode: SerializeMode,
        protocol: String,
        message_name: String,
        body: Bytes,
        callback: impl FnOnce(ResponseFrame) + Send + 'static,
    ) -> ClientResult<CallId> {
        let call_id: CallId = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            mode,
            kind: ClientKind::AsyncRpc,
            call_id,
            protocol,
            message_name,
            body,
        };
        self.outstanding.insert(
            call_id,
            OutstandingCall {
                callback: Box::new(callback),
                submitted_at: Instant::now(),
            },
        );

        let conn = self.conn.lock().unwrap().clone();
        let Some(conn) = conn else {
            if !self.resend {
                self.outstanding.remove(&call_id);
                return Err(ClientError::InvalidState("not connected".to_string()));
            }
            self.resend_buffer.lock().unwrap().push(frame);
            return Ok(call_id);
        };

        if let Err(error) = conn.async_write(&frame) {
            if self.resend {
                self.resend_buffer.lock().unwrap().push(frame);
            } else {
                self.outstanding.remove(&call_id);
                return Err(error);
            }
        }
        Ok(call_id)
    }

    /// Submit a raw async call; `callback` runs on whatever task observes the
    /// response or timeout (at most once, per call_id).
    pub fn call_raw<F>(&self, protocol: impl Into<String>, body: impl Into<Bytes>, callback: F) -> ClientResult<CallId>
    where
        F: FnOnce(ClientResult<Bytes>) + Send + 'static,
    {
        self.submit(SerializeMode::NonSerialize, protocol.into(), String::new(), body.into(), move |response| {
            match response.code {
                RpcErrorCode::Ok => callback(Ok(response.body)),
                other => callback(Err(ClientError::Rpc(other))),
            }
        })
    }

    /// Submit a typed async call.
    pub fn call<Req, Resp, F>(
        &self,
        protocol: impl Into<String>,
        message_name: impl Into<String>,
        request: &Req,
        callback: F,
    ) -> ClientResult<CallId>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
        F: FnOnce(ClientResult<Resp>) + Send + 'static,
    {
        let body = Bytes::from(request.encode_to_vec());
        self.submit(SerializeMode::Serialize, protocol.into(), message_name.into(), body, move |response| {
            match response.code {
                RpcErrorCode::Ok => callback(Resp::decode(response.body.as_ref()).map_err(ClientError::from)),
                other => callback(Err(ClientError::Rpc(other))),
            }
        })
    }

    /// Destroy the sweep timer, then the socket, in that order (spec.md §5 shutdown ordering).
    pub fn shutdown(&self) {
        if let Some(mut ticker) = self.sweep_ticker.lock().unwrap().take() {
            ticker.destroy();
        }
        if let Some(conn) = self.conn.lock().unwrap().take() {
            conn.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn at_most_once_callback_on_real_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = bytes::BytesMut::with_capacity(1024);
            loop {
                if socket.read_buf(&mut buf).await.unwrap() == 0 {
                    break;
                }
                if let Ok(crate::frame::FrameStatus::Ready { total_len }) = RequestFrame::check(&buf) {
                    let request = RequestFrame::parse(&buf[..total_len]).unwrap();
                    bytes::Buf::advance(&mut buf, total_len);
                    let response = ResponseFrame {
                        code: RpcErrorCode::Ok,
                        call_id: request.call_id,
                        message_name: String::new(),
                        body: request.body,
                    };
                    let mut out = bytes::BytesMut::new();
                    crate::frame::Encode::encode(&response, &mut out);
                    socket.write_all(&out).await.unwrap();
                }
            }
        });

        let client = AsyncClient::connect(addr, ClientOptions::default()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .call_raw("echo", Bytes::from_static(b"hi"), move |result| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(result);
            })
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(result.unwrap().as_ref(), b"hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unanswered_call_times_out_via_sweep() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            std::mem::forget(socket); // never respond
        });

        let mut options = ClientOptions::default();
        options.request_timeout = Duration::from_millis(50);
        let client = AsyncClient::connect(addr, options).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        client.call_raw("slow", Bytes::new(), move |result| { let _ = tx.send(result); }).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::Rpc(RpcErrorCode::RequestTimeout))));
    }
}
