// ABOUTME: Wire framing for the four czrpc frame kinds (request, response, push, subscribe-control)
// ABOUTME: Two-phase parse (check for completeness, then parse) mirrors the teacher's Frame::check/Frame::parse split

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

use crate::datatypes::{CallId, ClientKind, RpcErrorCode, SerializeMode, MAX_BUFFER};

/// Errors produced while checking or parsing a frame from a byte buffer.
///
/// `Incomplete` is not a fault: it is the expected result when a connection's
/// read buffer does not yet hold a full frame, and callers should read more
/// data and retry rather than treat it as a protocol violation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes have been buffered yet to determine the frame length.
    #[error("incomplete frame")]
    Incomplete,

    /// The frame's declared content length exceeds [`MAX_BUFFER`].
    ///
    /// `total_len` is the number of bytes (header + content) the caller must
    /// skip to resynchronize at the next frame boundary.
    #[error("frame declares {declared} bytes of content, exceeding the {MAX_BUFFER} byte limit")]
    Oversized { declared: usize, total_len: usize },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in frame field")]
    InvalidUtf8,

    /// A numeric enum field held a value with no known variant.
    #[error("unknown enum value {0}")]
    UnknownEnumValue(u32),
}

/// Outcome of [`check_header`] / the per-frame `check` functions: either the
/// buffer doesn't yet hold a whole frame, or it does and the total frame
/// length (header + content) is reported back so the caller can advance the
/// buffer by exactly that much after parsing (or skip it, if oversized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Incomplete,
    Oversized { total_len: usize },
    Ready { total_len: usize },
}

fn get_u32(cursor: &mut Cursor<&[u8]>) -> Option<u32> {
    if cursor.remaining() < 4 {
        return None;
    }
    Some(cursor.get_u32_le())
}

fn get_string(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String, FrameError> {
    if cursor.remaining() < len {
        return Err(FrameError::Incomplete);
    }
    let mut buf = vec![0u8; len];
    cursor.copy_to_slice(&mut buf);
    String::from_utf8(buf).map_err(|_| FrameError::InvalidUtf8)
}

fn get_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, FrameError> {
    if cursor.remaining() < len {
        return Err(FrameError::Incomplete);
    }
    let mut buf = vec![0u8; len];
    cursor.copy_to_slice(&mut buf);
    Ok(Bytes::from(buf))
}

/// A fully decoded client-to-server frame (spec.md §6, "Request frame").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub mode: SerializeMode,
    pub kind: ClientKind,
    pub call_id: CallId,
    pub protocol: String,
    pub message_name: String,
    pub body: Bytes,
}

impl RequestFrame {
    const FIXED_LEN: usize = 4 * 6;

    /// Check whether `buf` holds a complete request frame without allocating.
    pub fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        let mut cursor = Cursor::new(buf);
        let Some(protocol_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let Some(message_name_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let Some(body_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        // mode, kind, call_id are not needed to compute total length.
        let declared = protocol_len as usize + message_name_len as usize + body_len as usize;
        let total_len = Self::FIXED_LEN + declared;
        if declared > MAX_BUFFER {
            return Ok(FrameStatus::Oversized { total_len });
        }
        if buf.len() < total_len {
            return Ok(FrameStatus::Incomplete);
        }
        Ok(FrameStatus::Ready { total_len })
    }

    /// Parse a request frame. Callers must have already confirmed completeness via [`Self::check`].
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(buf);
        let protocol_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let message_name_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let body_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let mode_raw = get_u32(&mut cursor).ok_or(FrameError::Incomplete)?;
        let kind_raw = get_u32(&mut cursor).ok_or(FrameError::Incomplete)?;
        let call_id = get_u32(&mut cursor).ok_or(FrameError::Incomplete)?;

        let mode = SerializeMode::try_from(mode_raw).map_err(|_| FrameError::UnknownEnumValue(mode_raw))?;
        let kind = ClientKind::try_from(kind_raw).map_err(|_| FrameError::UnknownEnumValue(kind_raw))?;

        let protocol = get_string(&mut cursor, protocol_len)?;
        let message_name = get_string(&mut cursor, message_name_len)?;
        let body = get_bytes(&mut cursor, body_len)?;

        Ok(RequestFrame {
            mode,
            kind,
            call_id,
            protocol,
            message_name,
            body,
        })
    }

    /// Encode this frame onto the wire, per spec.md §6's field order.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.protocol.len() as u32);
        buf.put_u32_le(self.message_name.len() as u32);
        buf.put_u32_le(self.body.len() as u32);
        buf.put_u32_le(u32::from(self.mode));
        buf.put_u32_le(u32::from(self.kind));
        buf.put_u32_le(self.call_id);
        buf.put_slice(self.protocol.as_bytes());
        buf.put_slice(self.message_name.as_bytes());
        buf.put_slice(&self.body);
    }
}

/// A fully decoded server-to-client frame (spec.md §6, "Response frame").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub code: RpcErrorCode,
    pub call_id: CallId,
    pub message_name: String,
    pub body: Bytes,
}

impl ResponseFrame {
    const FIXED_LEN: usize = 4 * 4;

    pub fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        let mut cursor = Cursor::new(buf);
        let Some(message_name_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let Some(body_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let declared = message_name_len as usize + body_len as usize;
        let total_len = Self::FIXED_LEN + declared;
        if declared > MAX_BUFFER {
            return Ok(FrameStatus::Oversized { total_len });
        }
        if buf.len() < total_len {
            return Ok(FrameStatus::Incomplete);
        }
        Ok(FrameStatus::Ready { total_len })
    }

    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(buf);
        let message_name_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let body_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let code_raw = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as i32;
        let call_id = get_u32(&mut cursor).ok_or(FrameError::Incomplete)?;

        let code = RpcErrorCode::try_from(code_raw).map_err(|_| FrameError::UnknownEnumValue(code_raw as u32))?;

        let message_name = get_string(&mut cursor, message_name_len)?;
        let body = get_bytes(&mut cursor, body_len)?;

        Ok(ResponseFrame {
            code,
            call_id,
            message_name,
            body,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.message_name.len() as u32);
        buf.put_u32_le(self.body.len() as u32);
        buf.put_i32_le(i32::from(self.code));
        buf.put_u32_le(self.call_id);
        buf.put_slice(self.message_name.as_bytes());
        buf.put_slice(&self.body);
    }
}

/// A fully decoded server-to-subscriber push frame (spec.md §6, "Push frame").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    pub mode: SerializeMode,
    pub topic: String,
    pub message_name: String,
    pub body: Bytes,
}

impl PushFrame {
    const FIXED_LEN: usize = 4 * 4;

    pub fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        let mut cursor = Cursor::new(buf);
        let Some(topic_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let Some(message_name_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let Some(body_len) = get_u32(&mut cursor) else {
            return Ok(FrameStatus::Incomplete);
        };
        let declared = topic_len as usize + message_name_len as usize + body_len as usize;
        let total_len = Self::FIXED_LEN + declared;
        if declared > MAX_BUFFER {
            return Ok(FrameStatus::Oversized { total_len });
        }
        if buf.len() < total_len {
            return Ok(FrameStatus::Incomplete);
        }
        Ok(FrameStatus::Ready { total_len })
    }

    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(buf);
        let topic_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let message_name_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let body_len = get_u32(&mut cursor).ok_or(FrameError::Incomplete)? as usize;
        let mode_raw = get_u32(&mut cursor).ok_or(FrameError::Incomplete)?;
        let mode = SerializeMode::try_from(mode_raw).map_err(|_| FrameError::UnknownEnumValue(mode_raw))?;

        let topic = get_string(&mut cursor, topic_len)?;
        let message_name = get_string(&mut cursor, message_name_len)?;
        let body = get_bytes(&mut cursor, body_len)?;

        Ok(PushFrame {
            mode,
            topic,
            message_name,
            body,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.topic.len() as u32);
        buf.put_u32_le(self.message_name.len() as u32);
        buf.put_u32_le(self.body.len() as u32);
        buf.put_u32_le(u32::from(self.mode));
        buf.put_slice(self.topic.as_bytes());
        buf.put_slice(self.message_name.as_bytes());
        buf.put_slice(&self.body);
    }
}

/// Common interface the read loop uses to check and parse a connection's
/// inbound frame type without knowing which of the three kinds it is.
pub trait Decode: Sized {
    fn check(buf: &[u8]) -> Result<FrameStatus, FrameError>;
    fn parse(buf: &[u8]) -> Result<Self, FrameError>;
}

impl Decode for RequestFrame {
    fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        RequestFrame::check(buf)
    }
    fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        RequestFrame::parse(buf)
    }
}

impl Decode for ResponseFrame {
    fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        ResponseFrame::check(buf)
    }
    fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        ResponseFrame::parse(buf)
    }
}

impl Decode for PushFrame {
    fn check(buf: &[u8]) -> Result<FrameStatus, FrameError> {
        PushFrame::check(buf)
    }
    fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        PushFrame::parse(buf)
    }
}

/// Common interface for writing any of the three frame kinds onto a
/// connection's send queue (see [`crate::connection::Connection::async_write`]).
pub trait Encode {
    /// Sum of this frame's variable-length field lengths, checked against
    /// [`MAX_BUFFER`] before encoding.
    fn declared_len(&self) -> usize;
    fn encode(&self, buf: &mut BytesMut);
}

impl Encode for RequestFrame {
    fn declared_len(&self) -> usize {
        self.protocol.len() + self.message_name.len() + self.body.len()
    }
    fn encode(&self, buf: &mut BytesMut) {
        RequestFrame::encode(self, buf)
    }
}

impl Encode for ResponseFrame {
    fn declared_len(&self) -> usize {
        self.message_name.len() + self.body.len()
    }
    fn encode(&self, buf: &mut BytesMut) {
        ResponseFrame::encode(self, buf)
    }
}

impl Encode for PushFrame {
    fn declared_len(&self) -> usize {
        self.topic.len() + self.message_name.len() + self.body.len()
    }
    fn encode(&self, buf: &mut BytesMut) {
        PushFrame::encode(self, buf)
    }
}

impl RequestFrame {
    /// Build the subscribe-control frame for `topic` (spec.md §6).
    pub fn subscribe(call_id: CallId, topic: impl Into<String>) -> Self {
        RequestFrame {
            mode: SerializeMode::Serialize,
            kind: ClientKind::Sub,
            call_id,
            protocol: topic.into(),
            message_name: String::new(),
            body: Bytes::from_static(crate::datatypes::SUBSCRIBE_BODY.as_bytes()),
        }
    }

    /// Build the unsubscribe-control frame for `topic` (spec.md §6).
    pub fn unsubscribe(call_id: CallId, topic: impl Into<String>) -> Self {
        RequestFrame {
            mode: SerializeMode::Serialize,
            kind: ClientKind::Sub,
            call_id,
            protocol: topic.into(),
            message_name: String::new(),
            body: Bytes::from_static(crate::datatypes::UNSUBSCRIBE_BODY.as_bytes()),
        }
    }

    /// Build the heartbeat control frame (spec.md §6).
    pub fn heartbeat(call_id: CallId) -> Self {
        RequestFrame {
            mode: SerializeMode::Serialize,
            kind: ClientKind::Sub,
            call_id,
            protocol: crate::datatypes::HEARTBEAT_TOPIC.to_string(),
            message_name: String::new(),
            body: Bytes::from_static(crate::datatypes::HEARTBEAT_BODY.as_bytes()),
        }
    }

    /// `true` if this is a subscribe-control frame requesting subscription (body `"1"`).
    pub fn is_subscribe(&self) -> bool {
        self.kind == ClientKind::Sub && self.body.as_ref() == crate::datatypes::SUBSCRIBE_BODY.as_bytes()
    }

    /// `true` if this is a subscribe-control frame requesting unsubscription (body `"0"`).
    pub fn is_unsubscribe(&self) -> bool {
        self.kind == ClientKind::Sub && self.body.as_ref() == crate::datatypes::UNSUBSCRIBE_BODY.as_bytes()
    }

    /// `true` if this is a heartbeat control frame (topic and body both `"00"`).
    pub fn is_heartbeat(&self) -> bool {
        self.kind == ClientKind::Sub
            && self.protocol == crate::datatypes::HEARTBEAT_TOPIC
            && self.body.as_ref() == crate::datatypes::HEARTBEAT_BODY.as_bytes()
    }
}
