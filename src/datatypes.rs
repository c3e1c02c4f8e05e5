// ABOUTME: Shared wire-level enums and small value types used across frame, connection and client/server code
// ABOUTME: Mirrors the teacher's datatypes module, decoding fixed-width wire enums via num_enum

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Intent of the peer that originated a request frame.
///
/// Servers dispatch on this to choose whether a response is expected, whether
/// to run the handler on the typed or raw table, or whether the frame is a
/// publish/subscribe control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ClientKind {
    Rpc = 0,
    AsyncRpc = 1,
    Pub = 2,
    Sub = 3,
}

/// Whether a frame's body is a protobuf-encoded payload or opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SerializeMode {
    Serialize = 0,
    NonSerialize = 1,
}

/// Outcome code carried on a [`crate::frame::ResponseFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum RpcErrorCode {
    Ok = 0,
    RouteFailed = 1,
    RequestTimeout = 2,
}

/// 32-bit correlation token chosen by an async client, unique within its
/// outstanding-call window. `0` is reserved for frames that carry no call
/// (publish and subscribe-control frames).
pub type CallId = u32;

/// Maximum allowed size for the sum of a frame's declared length fields.
pub const MAX_BUFFER: usize = 20 * 1024 * 1024;

/// Interval at which the subscriber's optional heartbeat control frame is sent.
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Interval at which the async client sweeps its outstanding-call table for
/// expired entries.
pub const TIMEOUT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Reserved topic/body pair used for subscriber heartbeats (spec.md §6).
pub const HEARTBEAT_TOPIC: &str = "00";
pub const HEARTBEAT_BODY: &str = "00";

/// Control-frame body for a subscribe request.
pub const SUBSCRIBE_BODY: &str = "1";
/// Control-frame body for an unsubscribe request.
pub const UNSUBSCRIBE_BODY: &str = "0";
