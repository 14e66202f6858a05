//! SPOP frame model and primitive codecs.
//!
//! ```text
//! FRAME    : <LENGTH:4 bytes> <TYPE:1 byte> <FLAGS:4 bytes> <STREAM-ID:varint> <FRAME-ID:varint> <PAYLOAD>
//! KV-LIST  : [ <NAME:string> <VALUE:typed-data> ... ]
//! ```
//!
//! Integers inside frames use the SPOP variable-length encoding: values below
//! 240 take one byte, larger values spill 4 bits into the first byte and then
//! 7 bits per continuation byte.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::spoe::handshake::DisconnectStatus;

/// Last fragment of a frame.
pub const FLAG_FIN: u32 = 0x0000_0001;
/// Processing of a fragmented frame was aborted.
pub const FLAG_ABORT: u32 = 0x0000_0002;

/// Length of the big-endian size prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Codec failures. Each one maps to the disconnect status sent to the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated")]
    Truncated,

    #[error("varint overflows 64 bits")]
    VarintOverflow,

    #[error("unknown typed data type {0}")]
    UnknownDataType(u8),

    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    TooBig { size: usize, max: usize },

    #[error("name is not valid UTF-8")]
    InvalidUtf8,

    #[error("fragmented frames are not supported")]
    Fragmented,

    #[error("unexpected {0} frame")]
    Unexpected(&'static str),
}

impl FrameError {
    pub fn status(&self) -> DisconnectStatus {
        match self {
            Self::TooBig { .. } => DisconnectStatus::TooBig,
            Self::Fragmented => DisconnectStatus::FragmentationNotSupported,
            _ => DisconnectStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    HaproxyHello,
    HaproxyDisconnect,
    Notify,
    AgentHello,
    AgentDisconnect,
    Ack,
}

impl FrameType {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::HaproxyHello => 1,
            Self::HaproxyDisconnect => 2,
            Self::Notify => 3,
            Self::AgentHello => 101,
            Self::AgentDisconnect => 102,
            Self::Ack => 103,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HaproxyHello => "haproxy_hello",
            Self::HaproxyDisconnect => "haproxy_disconnect",
            Self::Notify => "notify",
            Self::AgentHello => "agent_hello",
            Self::AgentDisconnect => "agent_disconnect",
            Self::Ack => "ack",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::HaproxyHello),
            2 => Ok(Self::HaproxyDisconnect),
            3 => Ok(Self::Notify),
            101 => Ok(Self::AgentHello),
            102 => Ok(Self::AgentDisconnect),
            103 => Ok(Self::Ack),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

/// One SPOP frame, without its length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: u32,
    pub stream_id: u64,
    pub frame_id: u64,
    pub payload: Bytes,
}

impl Frame {
    /// Unfragmented frame.
    pub fn new(frame_type: FrameType, stream_id: u64, frame_id: u64, payload: Bytes) -> Self {
        Self {
            frame_type,
            flags: FLAG_FIN,
            stream_id,
            frame_id,
            payload,
        }
    }

    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    pub fn is_abort(&self) -> bool {
        self.flags & FLAG_ABORT != 0
    }

    /// Decodes a frame body (the bytes after the length prefix).
    pub fn decode(mut buf: Bytes) -> Result<Self, FrameError> {
        if buf.remaining() < 5 {
            return Err(FrameError::Truncated);
        }
        let frame_type = FrameType::try_from(buf.get_u8())?;
        let flags = buf.get_u32();
        let stream_id = read_varint(&mut buf)?;
        let frame_id = read_varint(&mut buf)?;

        Ok(Self {
            frame_type,
            flags,
            stream_id,
            frame_id,
            payload: buf,
        })
    }

    /// Appends the length-prefixed frame to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::with_capacity(1 + 4 + 20 + self.payload.len());
        body.put_u8(self.frame_type.as_u8());
        body.put_u32(self.flags);
        write_varint(&mut body, self.stream_id);
        write_varint(&mut body, self.frame_id);
        body.extend_from_slice(&self.payload);

        out.reserve(LENGTH_PREFIX + body.len());
        out.put_u32(body.len() as u32);
        out.extend_from_slice(&body);
    }
}

pub fn read_varint(buf: &mut Bytes) -> Result<u64, FrameError> {
    if !buf.has_remaining() {
        return Err(FrameError::Truncated);
    }
    let mut value = u64::from(buf.get_u8());
    if value < 240 {
        return Ok(value);
    }

    let mut shift = 4u32;
    loop {
        if !buf.has_remaining() {
            return Err(FrameError::Truncated);
        }
        if shift > 63 {
            return Err(FrameError::VarintOverflow);
        }
        let byte = buf.get_u8();
        value = value
            .checked_add(u64::from(byte).checked_shl(shift).ok_or(FrameError::VarintOverflow)?)
            .ok_or(FrameError::VarintOverflow)?;
        shift += 7;
        if byte < 128 {
            return Ok(value);
        }
    }
}

pub fn write_varint(out: &mut BytesMut, mut value: u64) {
    if value < 240 {
        out.put_u8(value as u8);
        return;
    }
    out.put_u8((value as u8) | 240);
    value = (value - 240) >> 4;
    while value >= 128 {
        out.put_u8((value as u8) | 128);
        value = (value - 128) >> 7;
    }
    out.put_u8(value as u8);
}

fn read_bytes(buf: &mut Bytes) -> Result<Bytes, FrameError> {
    let len = usize::try_from(read_varint(buf)?).map_err(|_| FrameError::Truncated)?;
    if buf.remaining() < len {
        return Err(FrameError::Truncated);
    }
    Ok(buf.split_to(len))
}

/// Reads a length-prefixed string that must be valid UTF-8.
pub fn read_name(buf: &mut Bytes) -> Result<String, FrameError> {
    let raw = read_bytes(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

pub fn write_str(out: &mut BytesMut, value: &str) {
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

const TYPE_NULL: u8 = 0;
const TYPE_BOOL: u8 = 1;
const TYPE_INT32: u8 = 2;
const TYPE_UINT32: u8 = 3;
const TYPE_INT64: u8 = 4;
const TYPE_UINT64: u8 = 5;
const TYPE_IPV4: u8 = 6;
const TYPE_IPV6: u8 = 7;
const TYPE_STRING: u8 = 8;
const TYPE_BINARY: u8 = 9;
const FLAG_TRUE: u8 = 0x10;

/// SPOP typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedData {
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    String(String),
    Binary(Bytes),
}

impl TypedData {
    /// Text value; only `STRING` data qualifies.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any non-negative integer type.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Int32(v) => u64::try_from(v).ok(),
            Self::Uint32(v) => Some(u64::from(v)),
            Self::Int64(v) => u64::try_from(v).ok(),
            Self::Uint64(v) => Some(v),
            _ => None,
        }
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, FrameError> {
        if !buf.has_remaining() {
            return Err(FrameError::Truncated);
        }
        let type_byte = buf.get_u8();
        let value = match type_byte & 0x0f {
            TYPE_NULL => Self::Null,
            TYPE_BOOL => Self::Bool(type_byte & FLAG_TRUE != 0),
            TYPE_INT32 => Self::Int32(read_varint(buf)? as i32),
            TYPE_UINT32 => Self::Uint32(read_varint(buf)? as u32),
            TYPE_INT64 => Self::Int64(read_varint(buf)? as i64),
            TYPE_UINT64 => Self::Uint64(read_varint(buf)?),
            TYPE_IPV4 => {
                if buf.remaining() < 4 {
                    return Err(FrameError::Truncated);
                }
                Self::Ipv4(Ipv4Addr::from(buf.get_u32()))
            }
            TYPE_IPV6 => {
                if buf.remaining() < 16 {
                    return Err(FrameError::Truncated);
                }
                Self::Ipv6(Ipv6Addr::from(buf.get_u128()))
            }
            // header values may carry arbitrary bytes
            TYPE_STRING => Self::String(String::from_utf8_lossy(&read_bytes(buf)?).into_owned()),
            TYPE_BINARY => Self::Binary(read_bytes(buf)?),
            other => return Err(FrameError::UnknownDataType(other)),
        };
        Ok(value)
    }

    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::Null => out.put_u8(TYPE_NULL),
            Self::Bool(b) => out.put_u8(TYPE_BOOL | if *b { FLAG_TRUE } else { 0 }),
            Self::Int32(v) => {
                out.put_u8(TYPE_INT32);
                write_varint(out, *v as u64);
            }
            Self::Uint32(v) => {
                out.put_u8(TYPE_UINT32);
                write_varint(out, u64::from(*v));
            }
            Self::Int64(v) => {
                out.put_u8(TYPE_INT64);
                write_varint(out, *v as u64);
            }
            Self::Uint64(v) => {
                out.put_u8(TYPE_UINT64);
                write_varint(out, *v);
            }
            Self::Ipv4(addr) => {
                out.put_u8(TYPE_IPV4);
                out.extend_from_slice(&addr.octets());
            }
            Self::Ipv6(addr) => {
                out.put_u8(TYPE_IPV6);
                out.extend_from_slice(&addr.octets());
            }
            Self::String(s) => {
                out.put_u8(TYPE_STRING);
                write_str(out, s);
            }
            Self::Binary(b) => {
                out.put_u8(TYPE_BINARY);
                write_varint(out, b.len() as u64);
                out.extend_from_slice(b);
            }
        }
    }
}

impl From<bool> for TypedData {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for TypedData {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TypedData {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u32> for TypedData {
    fn from(value: u32) -> Self {
        Self::Uint32(value)
    }
}

/// Reads `<NAME><VALUE>` pairs until the buffer is exhausted.
pub fn read_kv_list(buf: &mut Bytes) -> Result<Vec<(String, TypedData)>, FrameError> {
    let mut items = Vec::new();
    while buf.has_remaining() {
        let name = read_name(buf)?;
        let value = TypedData::decode(buf)?;
        items.push((name, value));
    }
    Ok(items)
}

pub fn write_kv(out: &mut BytesMut, name: &str, value: &TypedData) {
    write_str(out, name);
    value.encode(out);
}
