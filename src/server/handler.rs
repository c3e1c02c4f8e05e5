// ABOUTME: Uniform (Request, Response) handler contract shared by typed and raw bindings
// ABOUTME: Replaces the original's compile-time-reflected handler signatures (spec.md §9 redesign note)

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a bound handler receives: the frame's payload plus the session id of
/// the connection it arrived on. A typed handler decodes `body` itself via
/// `prost::Message::decode` against whatever type it closed over; the router
/// never needs to know concrete message types.
pub struct Request {
    pub session_id: String,
    pub message_name: String,
    pub body: Bytes,
}

/// What a handler produces. `set` and `set_raw` mirror the typed/raw split on
/// the way in.
#[derive(Debug, Default, Clone)]
pub struct Response {
    pub(crate) message_name: String,
    pub(crate) body: Bytes,
}

impl Response {
    /// Encode `message` as this response's body and record its fully
    /// qualified type name.
    pub fn set<M: prost::Message>(&mut self, message_name: impl Into<String>, message: &M) {
        self.message_name = message_name.into();
        self.body = Bytes::from(message.encode_to_vec());
    }

    /// Use `body` verbatim, with an empty `message_name` (non_serialize reply).
    pub fn set_raw(&mut self, body: impl Into<Bytes>) {
        self.message_name = String::new();
        self.body = body.into();
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, HandlerError>> + Send>>;

/// A bound protocol handler. Stored type-erased in the router's typed and raw
/// tables; `bind`/`bind_raw` accept any `Fn(Request) -> impl Future<...>` and
/// box it here.
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// Wrap a plain async function into the boxed [`Handler`] shape the router's
/// tables store.
pub fn into_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}
