// ABOUTME: Server configuration, typed/raw bind convenience wrappers, and the two ways to run it
// ABOUTME: Builder shape mirrors the teacher's client/builder.rs ClientBuilder

pub mod handler;
pub mod listener;
pub mod router;

use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::error::ServerResult;
use crate::topic::TopicManager;
use handler::{into_handler, Handler, HandlerError, Request, Response};
use listener::SessionNotify;
use router::Router;

/// Builder for a [`Server`]. Mirrors the teacher's `ClientBuilder`: consuming
/// `with_*`-style methods, a `build()` that produces the runnable type.
pub struct ServerBuilder {
    listen: Vec<SocketAddr>,
    ios_threads: usize,
    work_threads: usize,
    client_connect_notify: Option<SessionNotify>,
    client_disconnect_notify: Option<SessionNotify>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        ServerBuilder {
            listen: Vec::new(),
            ios_threads: 1,
            work_threads: 1,
            client_connect_notify: None,
            client_disconnect_notify: None,
        }
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listen endpoint. May be called more than once for multiple endpoints.
    pub fn listen(mut self, addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        self.listen.extend(addr.to_socket_addrs()?);
        Ok(self)
    }

    /// Size of the acceptor/IO runtime. Only meaningful when started via
    /// [`Server::run`], which builds its own dedicated multi-thread runtime;
    /// [`Server::serve`] runs on whatever runtime called it and ignores this.
    pub fn ios_threads(mut self, n: usize) -> Self {
        self.ios_threads = n;
        self
    }

    /// Degree of parallelism for handler execution and publish fanout,
    /// enforced by a semaphore in [`Router`] independent of socket readiness.
    pub fn work_threads(mut self, n: usize) -> Self {
        self.work_threads = n;
        self
    }

    pub fn client_connect_notify(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.client_connect_notify = Some(Arc::new(f));
        self
    }

    pub fn client_disconnect_notify(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.client_disconnect_notify = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Server {
        let topics = Arc::new(TopicManager::new());
        Server {
            router: Router::new(self.work_threads, topics),
            listen: self.listen,
            ios_threads: self.ios_threads,
            connect_notify: self.client_connect_notify,
            disconnect_notify: self.client_disconnect_notify,
        }
    }
}

/// A bound set of endpoints plus a [`Router`]. Construct via [`ServerBuilder`].
pub struct Server {
    router: Arc<Router>,
    listen: Vec<SocketAddr>,
    ios_threads: usize,
    connect_notify: Option<SessionNotify>,
    disconnect_notify: Option<SessionNotify>,
}

impl Server {
    /// Bind a raw (non_serialize) handler: body in, body out, no decoding.
    pub fn bind_raw<F, Fut>(&self, protocol: impl Into<String>, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        self.router.bind_raw(protocol, into_handler(handler));
    }

    /// Bind a typed (serialize) handler: decodes the request body as `Req`
    /// via `prost`, invokes `handler(message, session_id)`, and encodes the
    /// returned `Resp` under `response_message_name`.
    pub fn bind<Req, Resp, F, Fut>(
        &self,
        protocol: impl Into<String>,
        response_message_name: impl Into<String>,
        handler: F,
    ) where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(Req, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let response_message_name = response_message_name.into();
        let wrapped: Handler = into_handler(move |request: Request| {
            let handler_result = Req::decode(request.body.as_ref());
            let response_message_name = response_message_name.clone();
            let fut_slot = handler_result.map(|message| handler(message, request.session_id));
            async move {
                let resp: Resp = match fut_slot {
                    Ok(fut) => fut.await?,
                    Err(decode_error) => return Err(Box::new(decode_error) as HandlerError),
                };
                let mut response = Response::default();
                response.set(response_message_name, &resp);
                Ok(response)
            }
        });
        self.router.bind(protocol, wrapped);
    }

    /// Run the server on the current (ambient) tokio runtime. `ios_threads`
    /// is ignored here, since the calling runtime already pools I/O readiness.
    pub async fn serve(self: Arc<Self>) -> ServerResult<()> {
        listener::run(
            self.listen.clone(),
            self.router.clone(),
            self.connect_notify.clone(),
            self.disconnect_notify.clone(),
        )
        .await
    }

    /// Build a dedicated `ios_threads`-worker multi-thread runtime and run
    /// the server on it, blocking the calling thread until every listener
    /// task exits. Matches the teacher's `ClientBuilder::connect` pattern of
    /// owning its own runtime when not embedded in a larger application.
    pub fn run(self) -> ServerResult<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.ios_threads.max(1))
            .enable_all()
            .build()
            .expect("failed to build server runtime");
        runtime.block_on(Arc::new(self).serve())
    }
}
