// ABOUTME: Full-duplex framed TCP I/O: perpetual pipelined read loop plus a single-writer FIFO send queue
// ABOUTME: Generalizes the teacher's buffered Connection::read_frame/parse_frame split to any Decode frame type

use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::datatypes::MAX_BUFFER;
use crate::error::{ClientError, ClientResult};
use crate::frame::{Decode, Encode, FrameStatus};

/// One TCP socket's framed I/O: a perpetual read loop and a single-writer FIFO
/// send queue. Shared (via `Arc`) between the read loop, whoever dispatches on
/// its frames, and, on the server side, the topic manager.
///
/// `D` is the frame type this connection's peer sends *to* us: a server reads
/// [`crate::frame::RequestFrame`]s, an rpc/async client reads
/// [`crate::frame::ResponseFrame`]s, a subscriber reads
/// [`crate::frame::PushFrame`]s. What we write back can be any [`Encode`] type
/// via [`Connection::async_write`]. A server writes both responses and
/// pushes on the same connection.
pub struct Connection<D: Decode> {
    send_tx: mpsc::UnboundedSender<Bytes>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    session_id: String,
    closed: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    on_disconnect: Box<dyn Fn(&Arc<Connection<D>>) + Send + Sync>,
    _marker: PhantomData<D>,
}

impl<D: Decode + Send + 'static> Connection<D> {
    /// Enable `TCP_NODELAY`, spawn the reader and writer tasks, and return the
    /// shared handle. `on_frame` is invoked for each fully received frame;
    /// dispatch is spawned as its own task so that reads are pipelined ahead
    /// of handler execution (spec.md §4.2). `on_disconnect` fires exactly
    /// once, however the connection comes down (peer close, read/write error,
    /// oversized frame, or an explicit [`Connection::disconnect`] call).
    pub fn start<OnFrame, OnFrameFut>(
        socket: TcpStream,
        on_frame: OnFrame,
        on_disconnect: impl Fn(&Arc<Connection<D>>) + Send + Sync + 'static,
    ) -> std::io::Result<Arc<Connection<D>>>
    where
        OnFrame: Fn(D, Arc<Connection<D>>) -> OnFrameFut + Send + Sync + 'static,
        OnFrameFut: Future<Output = ()> + Send + 'static,
    {
        socket.set_nodelay(true)?;
        let local_addr = socket.local_addr()?;
        let peer_addr = socket.peer_addr()?;
        let session_id = format!("{local_addr}#{peer_addr}");
        let (read_half, write_half) = socket.into_split();
        let (send_tx, send_rx) = mpsc::unbounded_channel::<Bytes>();

        let conn = Arc::new(Connection {
            send_tx,
            local_addr,
            peer_addr,
            session_id,
            closed: AtomicBool::new(false),
            reader_task: Mutex::new(None),
            writer_task: Mutex::new(None),
            on_disconnect: Box::new(on_disconnect),
            _marker: PhantomData,
        });

        let writer_conn = conn.clone();
        let writer_task = tokio::spawn(writer_loop(write_half, send_rx, writer_conn));

        let reader_conn = conn.clone();
        let reader_task = tokio::spawn(reader_loop(read_half, reader_conn, on_frame));

        *conn.writer_task.lock().unwrap() = Some(writer_task);
        *conn.reader_task.lock().unwrap() = Some(reader_task);

        Ok(conn)
    }

    /// Non-blocking enqueue of an already-constructed frame. Fails with
    /// [`ClientError::SendTooBig`] when the frame's declared content exceeds
    /// [`MAX_BUFFER`], without touching the queue.
    pub fn async_write<F: Encode>(&self, frame: &F) -> ClientResult<()> {
        let declared = frame.declared_len();
        if declared > MAX_BUFFER {
            return Err(ClientError::SendTooBig(declared));
        }
        let mut buf = BytesMut::with_capacity(declared + 32);
        frame.encode(&mut buf);
        self.send_tx
            .send(buf.freeze())
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Idempotent shutdown: aborts the reader and writer tasks (dropping the
    /// socket halves they own) and fires `on_disconnect` exactly once. Safe to
    /// call from any site, including from within a frame or error callback.
    pub fn disconnect(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.reader_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.writer_task.lock().unwrap().take() {
            handle.abort();
        }
        (self.on_disconnect)(self);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// `"<local_ip>:<local_port>#<remote_ip>:<remote_port>"`, computed once at
    /// connection start and memoized (spec.md §4.2).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

async fn reader_loop<D, OnFrame, OnFrameFut>(
    mut read_half: OwnedReadHalf,
    conn: Arc<Connection<D>>,
    on_frame: OnFrame,
) where
    D: Decode + Send + 'static,
    OnFrame: Fn(D, Arc<Connection<D>>) -> OnFrameFut + Send + Sync + 'static,
    OnFrameFut: Future<Output = ()> + Send + 'static,
{
    let mut buffer = BytesMut::with_capacity(4 * 1024);
    loop {
        match D::check(&buffer) {
            Ok(FrameStatus::Ready { total_len }) => {
                match D::parse(&buffer[..total_len]) {
                    Ok(frame) => {
                        buffer.advance_discard(total_len);
                        let dispatch_conn = conn.clone();
                        tokio::spawn(on_frame(frame, dispatch_conn));
                        // Loop back around immediately: further frames may
                        // already be fully buffered, and a new socket read is
                        // issued before the spawned handler runs.
                    }
                    Err(error) => {
                        tracing::warn!(session = %conn.session_id, %error, "frame decode failed");
                        conn.disconnect();
                        return;
                    }
                }
            }
            Ok(FrameStatus::Oversized { total_len }) => {
                let declared_excess = total_len.saturating_sub(buffer.len());
                tracing::warn!(
                    session = %conn.session_id,
                    total_len,
                    "dropping oversized frame and resynchronizing"
                );
                buffer.clear();
                if let Err(error) = skip_bytes(&mut read_half, declared_excess).await {
                    tracing::warn!(session = %conn.session_id, %error, "read error while skipping oversized frame");
                    conn.disconnect();
                    return;
                }
            }
            Ok(FrameStatus::Incomplete) => match read_half.read_buf(&mut buffer).await {
                Ok(0) => {
                    // Clean close only if no partial frame is sitting in the buffer.
                    if !buffer.is_empty() {
                        tracing::warn!(session = %conn.session_id, "peer closed mid-frame");
                    }
                    conn.disconnect();
                    return;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(session = %conn.session_id, %error, "read error");
                    conn.disconnect();
                    return;
                }
            },
            Err(error) => {
                tracing::warn!(session = %conn.session_id, %error, "frame check failed");
                conn.disconnect();
                return;
            }
        }
    }
}

async fn skip_bytes(read_half: &mut OwnedReadHalf, mut remaining: usize) -> std::io::Result<()> {
    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let n = read_half.read(&mut scratch[..remaining.min(scratch.len())]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed while skipping oversized frame",
            ));
        }
        remaining -= n;
    }
    Ok(())
}

async fn writer_loop<D: Decode>(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    conn: Arc<Connection<D>>,
) {
    while let Some(buf) = rx.recv().await {
        if let Err(error) = write_half.write_all(&buf).await {
            tracing::warn!(session = %conn.session_id, %error, "write error");
            conn.disconnect();
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Small helper trait so the reader loop can discard a parsed frame's bytes
/// without pulling in `bytes::Buf` at every call site.
trait BytesMutExt {
    fn advance_discard(&mut self, n: usize);
}

impl BytesMutExt for BytesMut {
    fn advance_discard(&mut self, n: usize) {
        bytes::Buf::advance(self, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{ClientKind, SerializeMode};
    use crate::frame::RequestFrame;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn write_order_matches_enqueue_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            socket
        });

        let client_socket = TcpStream::connect(addr).await.unwrap();
        let server_socket = server_task.await.unwrap();

        let received: Arc<std::sync::Mutex<Vec<RequestFrame>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let disconnected = Arc::new(AtomicUsize::new(0));
        let disconnected_clone = disconnected.clone();

        let _server_conn = Connection::<RequestFrame>::start(
            server_socket,
            move |frame, _conn| {
                let received = received_clone.clone();
                async move {
                    received.lock().unwrap().push(frame);
                }
            },
            move |_conn| {
                disconnected_clone.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        let client_conn = Connection::<RequestFrame>::start(
            client_socket,
            |_frame: RequestFrame, _conn| async move {},
            |_conn| {},
        )
        .unwrap();

        for i in 0..5u32 {
            let frame = RequestFrame {
                mode: SerializeMode::NonSerialize,
                kind: ClientKind::Rpc,
                call_id: i,
                protocol: "echo".to_string(),
                message_name: String::new(),
                body: Bytes::from(i.to_string()),
            };
            client_conn.async_write(&frame).unwrap();
        }

        // Give the background tasks a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let got = received.lock().unwrap();
        let call_ids: Vec<u32> = got.iter().map(|f| f.call_id).collect();
        assert_eq!(call_ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_fires_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client_socket = TcpStream::connect(addr).await.unwrap();
        let server_socket = server_task.await.unwrap();
        drop(server_socket);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let conn = Connection::<RequestFrame>::start(
            client_socket,
            |_frame: RequestFrame, _conn| async move {},
            move |_conn| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        conn.disconnect();
        conn.disconnect();
        conn.disconnect();

        // The reader task may also observe the peer close concurrently with
        // our explicit calls; either way on_disconnect must fire exactly once.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
