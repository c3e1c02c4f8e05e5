// ABOUTME: Crate-wide structured error types for czrpc client and server operations
// ABOUTME: Mirrors the teacher's split between boxed dyn errors at the outward API and thiserror enums on hot paths

use std::io;
use thiserror::Error;

use crate::datatypes::RpcErrorCode;

/// Errors surfaced by a [`crate::client`] call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error during connect, read or write.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The server responded with a non-`ok` [`RpcErrorCode`].
    #[error("rpc error: {0:?}")]
    Rpc(RpcErrorCode),

    /// The declared frame content length exceeded [`crate::datatypes::MAX_BUFFER`].
    #[error("send too big: {0} bytes exceeds max buffer size")]
    SendTooBig(usize),

    /// A response frame failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] crate::frame::FrameError),

    /// A response body failed to decode as the expected protobuf message type.
    #[error("message decode error: {0}")]
    MessageDecode(#[from] prost::DecodeError),

    /// The call or connect deadline elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// The connection was closed while a call was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The client is not in a state that permits this operation.
    #[error("invalid client state: {0}")]
    InvalidState(String),
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by [`crate::server`] setup and dispatch.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding one of the configured listen endpoints failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    /// No listen endpoints were configured.
    #[error("server has no configured listen endpoints")]
    NoEndpoints,
}

/// Result type alias for server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Error returned by most functions at the outer edge of the crate's public API.
///
/// When writing a real application, one might want to consider a specialized
/// error handling crate or defining an error type as an `enum` of causes.
/// However, for our purposes a boxed `std::error::Error` keeps the public
/// surface small. The hot paths (codec, dispatch) use the structured enums
/// above instead, since those are matched on in normal, non-exceptional flow
/// (e.g. a route-failed response is not an error, it is a documented outcome).
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for czrpc operations.
pub type Result<T> = std::result::Result<T, Error>;
